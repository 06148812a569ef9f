//! Scoring Pipeline Tests
//! Test File: pipeline_tests.rs
//! Covers: retry with backoff, abort vs skip, cancellation, timeouts,
//! sliding context window

use async_trait::async_trait;
use recut_common::{Segment, SegmentScore};
use recut_engine::{
    BatchStatus, FailurePolicy, OracleError, QualityOracle, ScoringPipeline, ScoringPolicy,
    ScoringRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Helper: policy with no pacing and millisecond backoffs
fn fast_policy() -> ScoringPolicy {
    ScoringPolicy {
        min_interval: Duration::ZERO,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        call_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn segments(n: usize) -> Vec<Segment> {
    (0..n)
        .map(|i| {
            let start = i as f64 * 10.0;
            Segment::with_id(format!("s{}", i), start, start + 10.0, format!("Segment number {}.", i))
        })
        .collect()
}

fn score_for(segment: &Segment) -> SegmentScore {
    SegmentScore {
        topic: format!("topic-{}", segment.id),
        interest_score: 70.0,
        clarity_score: 70.0,
        standalone: true,
        ..Default::default()
    }
}

/// Fails with a network error a fixed number of times per segment
struct FlakyOracle {
    failures_per_segment: u32,
    calls: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl QualityOracle for FlakyOracle {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(request.segment.id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt <= self.failures_per_segment {
            Err(OracleError::Network("connection reset".to_string()))
        } else {
            Ok(score_for(request.segment))
        }
    }
}

/// Fails one segment with a fixed error, scores the rest
struct FailingOracle {
    failing_id: &'static str,
    error: fn() -> OracleError,
    calls: AtomicU32,
}

#[async_trait]
impl QualityOracle for FailingOracle {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.segment.id == self.failing_id {
            Err((self.error)())
        } else {
            Ok(score_for(request.segment))
        }
    }
}

/// Records the prior-context topics seen on each call
#[derive(Default)]
struct RecordingOracle {
    seen: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl QualityOracle for RecordingOracle {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError> {
        let topics = request.prior_context.iter().map(|p| p.topic.clone()).collect();
        self.seen.lock().unwrap().push(topics);
        let mut score = score_for(request.segment);
        // Out-of-range values must come back clamped
        score.interest_score = 150.0;
        Ok(score)
    }
}

/// Cancels the batch from inside the Nth call
struct CancellingOracle {
    cancel_on_call: u32,
    calls: AtomicU32,
    token: CancellationToken,
}

#[async_trait]
impl QualityOracle for CancellingOracle {
    fn name(&self) -> &'static str {
        "cancelling"
    }

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on_call {
            self.token.cancel();
        }
        Ok(score_for(request.segment))
    }
}

/// Hangs on one segment
struct StallingOracle {
    stall_id: &'static str,
}

#[async_trait]
impl QualityOracle for StallingOracle {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError> {
        if request.segment.id == self.stall_id {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(score_for(request.segment))
    }
}

/// TC-PIPE-001: Transient failures are retried until success
#[tokio::test]
async fn tc_pipe_001_retry_then_succeed() {
    // Given: every segment fails twice before succeeding
    let oracle = Arc::new(FlakyOracle {
        failures_per_segment: 2,
        calls: Mutex::new(HashMap::new()),
    });
    let pipeline = ScoringPipeline::new(oracle.clone(), fast_policy());

    // When
    let outcome = pipeline
        .score_all(&segments(3), &CancellationToken::new())
        .await
        .unwrap();

    // Then: all scored, three calls each
    assert!(outcome.is_complete());
    assert_eq!(outcome.scored.len(), 3);
    let calls = oracle.calls.lock().unwrap();
    assert!(calls.values().all(|&c| c == 3));
}

/// TC-PIPE-002: Retries are bounded by max_retries
#[tokio::test]
async fn tc_pipe_002_retries_exhausted() {
    // Given: failures outlast the retry budget
    let oracle = Arc::new(FlakyOracle {
        failures_per_segment: 10,
        calls: Mutex::new(HashMap::new()),
    });
    let policy = ScoringPolicy {
        max_retries: 2,
        ..fast_policy()
    };
    let pipeline = ScoringPipeline::new(oracle, policy);

    // When
    let outcome = pipeline
        .score_all(&segments(2), &CancellationToken::new())
        .await
        .unwrap();

    // Then: the first segment aborts the batch after 3 attempts
    assert!(outcome.scored.is_empty());
    match outcome.status {
        BatchStatus::Failed(err) => {
            assert_eq!(err.index, 0);
            assert_eq!(err.segment_id, "s0");
            assert_eq!(err.attempts, 3);
            assert!(matches!(err.source, OracleError::Network(_)));
        }
        other => panic!("unexpected status {:?}", other),
    }
}

/// TC-PIPE-003: Abort keeps partial results and names the segment
#[tokio::test]
async fn tc_pipe_003_abort_returns_partial_results() {
    // Given: s2 always returns unparseable output
    let oracle = Arc::new(FailingOracle {
        failing_id: "s2",
        error: || OracleError::Parse("no json".to_string()),
        calls: AtomicU32::new(0),
    });
    let pipeline = ScoringPipeline::new(oracle.clone(), fast_policy());

    // When
    let outcome = pipeline
        .score_all(&segments(5), &CancellationToken::new())
        .await
        .unwrap();

    // Then: s0, s1 kept; parse errors are not retried; s3, s4 never attempted
    assert_eq!(outcome.scored.len(), 2);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    let err = match outcome.status {
        BatchStatus::Failed(err) => err,
        other => panic!("unexpected status {:?}", other),
    };
    assert_eq!(err.index, 2);
    assert_eq!(err.attempts, 1);
    assert!(err.to_string().contains("s2"));
}

/// TC-PIPE-004: Skip records the failure and continues
#[tokio::test]
async fn tc_pipe_004_skip_continues() {
    // Given: s1 hits a non-retryable API error
    let oracle = Arc::new(FailingOracle {
        failing_id: "s1",
        error: || OracleError::Api {
            status: 400,
            body: "bad request".to_string(),
        },
        calls: AtomicU32::new(0),
    });
    let policy = ScoringPolicy {
        failure_policy: FailurePolicy::Skip,
        ..fast_policy()
    };
    let pipeline = ScoringPipeline::new(oracle, policy);

    // When
    let outcome = pipeline
        .score_all(&segments(4), &CancellationToken::new())
        .await
        .unwrap();

    // Then: no substitute score for s1
    assert!(matches!(outcome.status, BatchStatus::Complete));
    assert!(!outcome.is_complete());
    let ids: Vec<&str> = outcome.scored.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["s0", "s2", "s3"]);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].segment_id, "s1");
}

/// TC-PIPE-005: Context window slides over scored segments only
#[tokio::test]
async fn tc_pipe_005_context_window() {
    // Given: a window of 2
    let oracle = Arc::new(RecordingOracle::default());
    let policy = ScoringPolicy {
        context_window: 2,
        ..fast_policy()
    };
    let pipeline = ScoringPipeline::new(oracle.clone(), policy);

    // When
    let outcome = pipeline
        .score_all(&segments(4), &CancellationToken::new())
        .await
        .unwrap();

    // Then: oldest first, at most two entries
    let seen = oracle.seen.lock().unwrap();
    assert_eq!(seen[0], Vec::<String>::new());
    assert_eq!(seen[1], vec!["topic-s0"]);
    assert_eq!(seen[2], vec!["topic-s0", "topic-s1"]);
    assert_eq!(seen[3], vec!["topic-s1", "topic-s2"]);

    // And: scores were clamped into range
    assert!(outcome.scored.iter().all(|s| s.analysis.interest_score == 100.0));
}

/// TC-PIPE-006: Cancellation stops before the next segment
#[tokio::test]
async fn tc_pipe_006_cancellation() {
    // Given: the second call requests cancellation
    let token = CancellationToken::new();
    let oracle = Arc::new(CancellingOracle {
        cancel_on_call: 2,
        calls: AtomicU32::new(0),
        token: token.clone(),
    });
    let pipeline = ScoringPipeline::new(oracle.clone(), fast_policy());

    // When
    let outcome = pipeline.score_all(&segments(5), &token).await.unwrap();

    // Then: the in-flight call finishes, nothing after it starts
    assert_eq!(outcome.scored.len(), 2);
    assert!(matches!(outcome.status, BatchStatus::Cancelled { completed: 2 }));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.into_result().unwrap().len(), 2);
}

/// TC-PIPE-007: Per-call timeout becomes a typed failure
#[tokio::test]
async fn tc_pipe_007_call_timeout() {
    // Given: s1 never answers and there are no retries
    let policy = ScoringPolicy {
        call_timeout: Duration::from_millis(20),
        max_retries: 0,
        ..fast_policy()
    };
    let pipeline = ScoringPipeline::new(Arc::new(StallingOracle { stall_id: "s1" }), policy);

    // When
    let outcome = pipeline
        .score_all(&segments(3), &CancellationToken::new())
        .await
        .unwrap();

    // Then
    assert_eq!(outcome.scored.len(), 1);
    match outcome.status {
        BatchStatus::Failed(err) => {
            assert_eq!(err.segment_id, "s1");
            assert!(matches!(err.source, OracleError::Timeout(20)));
        }
        other => panic!("unexpected status {:?}", other),
    }
}

/// TC-PIPE-008: Batch deadline interrupts a pending call
#[tokio::test]
async fn tc_pipe_008_batch_deadline() {
    // Given: s1 hangs longer than the batch may run
    let policy = ScoringPolicy {
        call_timeout: Duration::from_secs(3600),
        batch_timeout: Some(Duration::from_millis(50)),
        ..fast_policy()
    };
    let pipeline = ScoringPipeline::new(Arc::new(StallingOracle { stall_id: "s1" }), policy);

    // When
    let outcome = pipeline
        .score_all(&segments(3), &CancellationToken::new())
        .await
        .unwrap();

    // Then: the partial result is returned
    assert_eq!(outcome.scored.len(), 1);
    assert!(matches!(outcome.status, BatchStatus::TimedOut { completed: 1 }));
}

/// TC-PIPE-009: Abort surfaces as an engine error through into_result
#[tokio::test]
async fn tc_pipe_009_into_result_error() {
    // Given
    let oracle = Arc::new(FailingOracle {
        failing_id: "s0",
        error: || OracleError::NotConfigured("missing key".to_string()),
        calls: AtomicU32::new(0),
    });
    let pipeline = ScoringPipeline::new(oracle, fast_policy());

    // When
    let result = pipeline
        .score_all(&segments(2), &CancellationToken::new())
        .await
        .unwrap()
        .into_result();

    // Then
    let err = result.unwrap_err();
    assert!(err.to_string().contains("s0"));
}
