//! Scoring Pipeline Stage
//!
//! Turns raw transcript segments into scored segments through a
//! [`QualityOracle`].
//!
//! # Algorithm
//! 1. Segments are scored strictly in input order, one call at a time. Each
//!    request carries the text and topic of the last `context_window`
//!    successfully scored segments, so call *i* needs calls *i-3..i-1* to have
//!    finished.
//! 2. Before every attempt the pipeline waits on a rate limiter allowing one
//!    call per `min_interval`.
//! 3. Each attempt is bounded by `call_timeout`. Retryable failures (network,
//!    timeout, rate limit, 5xx) back off exponentially from
//!    `initial_backoff`, doubling up to `max_backoff`, for at most
//!    `max_retries` retries.
//! 4. A segment that still fails either aborts the batch or is skipped,
//!    per [`FailurePolicy`].
//! 5. Cancellation and the optional batch deadline interrupt any wait or
//!    pending call; everything scored so far is returned.
//!
//! Failed segments never receive a substitute score.

use crate::error::{EngineResult, OracleError, ScoringError};
use crate::types::{PriorContext, QualityOracle, ScoringRequest};
use governor::{Quota, RateLimiter};
use recut_common::{ScoredSegment, Segment, SegmentScore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What to do with a segment that could not be scored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the batch at the failing segment
    #[default]
    Abort,
    /// Record the failure and continue with the next segment
    Skip,
}

/// Pacing, retry and failure behavior of a scoring batch
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    pub context_window: usize,
    /// Zero disables rate limiting
    pub min_interval: Duration,
    pub call_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub batch_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            context_window: 3,
            min_interval: Duration::from_millis(500),
            call_timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            batch_timeout: None,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

/// How a batch ended
#[derive(Debug)]
pub enum BatchStatus {
    /// Every segment was attempted
    Complete,
    /// Cancellation was requested after `completed` segments were attempted
    Cancelled { completed: usize },
    /// The batch deadline passed after `completed` segments were attempted
    TimedOut { completed: usize },
    /// A segment failed under [`FailurePolicy::Abort`]
    Failed(ScoringError),
}

/// Scored segments plus how the batch ended
#[derive(Debug)]
pub struct ScoringOutcome {
    /// In input order
    pub scored: Vec<ScoredSegment>,
    /// Failures passed over under [`FailurePolicy::Skip`]
    pub skipped: Vec<ScoringError>,
    pub status: BatchStatus,
}

impl ScoringOutcome {
    /// Every segment was scored
    pub fn is_complete(&self) -> bool {
        matches!(self.status, BatchStatus::Complete) && self.skipped.is_empty()
    }

    /// Scored segments, or the error that aborted the batch
    ///
    /// Cancelled and timed-out batches yield their partial results.
    pub fn into_result(self) -> EngineResult<Vec<ScoredSegment>> {
        match self.status {
            BatchStatus::Failed(err) => Err(err.into()),
            _ => Ok(self.scored),
        }
    }
}

/// Why a segment's scoring stopped without a score
enum Interrupt {
    Cancelled,
    TimedOut,
    Failed(ScoringError),
}

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct ScoringPipeline {
    oracle: Arc<dyn QualityOracle>,
    policy: ScoringPolicy,
    /// Absent when `min_interval` is zero
    rate_limiter: Option<DirectLimiter>,
}

impl ScoringPipeline {
    pub fn new(oracle: Arc<dyn QualityOracle>, policy: ScoringPolicy) -> Self {
        let rate_limiter = Quota::with_period(policy.min_interval).map(RateLimiter::direct);
        Self {
            oracle,
            policy,
            rate_limiter,
        }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score every segment in order
    ///
    /// # Errors
    /// `EngineError::InvalidInput` when a segment is malformed; nothing is scored in
    /// that case. Oracle failures are reported through
    /// [`ScoringOutcome::status`] and [`ScoringOutcome::skipped`].
    pub async fn score_all(
        &self,
        segments: &[Segment],
        cancel: &CancellationToken,
    ) -> EngineResult<ScoringOutcome> {
        for segment in segments {
            segment.check()?;
        }

        let deadline = self.policy.batch_timeout.map(|t| Instant::now() + t);
        let mut scored: Vec<ScoredSegment> = Vec::with_capacity(segments.len());
        let mut skipped: Vec<ScoringError> = Vec::new();
        let mut context: VecDeque<PriorContext> =
            VecDeque::with_capacity(self.policy.context_window);

        info!(
            oracle = self.oracle.name(),
            segments = segments.len(),
            "Scoring batch started"
        );

        for (index, segment) in segments.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(self.finish(scored, skipped, BatchStatus::Cancelled { completed: index }));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(self.finish(scored, skipped, BatchStatus::TimedOut { completed: index }));
            }

            let prior: Vec<PriorContext> = context.iter().cloned().collect();
            match self.score_one(index, segment, &prior, cancel, deadline).await {
                Ok(analysis) => {
                    let entry = ScoredSegment::new(segment.clone(), analysis);
                    if self.policy.context_window > 0 {
                        if context.len() == self.policy.context_window {
                            context.pop_front();
                        }
                        context.push_back(PriorContext::from_scored(&entry));
                    }
                    scored.push(entry);
                }
                Err(Interrupt::Cancelled) => {
                    return Ok(self.finish(scored, skipped, BatchStatus::Cancelled { completed: index }));
                }
                Err(Interrupt::TimedOut) => {
                    return Ok(self.finish(scored, skipped, BatchStatus::TimedOut { completed: index }));
                }
                Err(Interrupt::Failed(err)) => match self.policy.failure_policy {
                    FailurePolicy::Abort => {
                        return Ok(self.finish(scored, skipped, BatchStatus::Failed(err)));
                    }
                    FailurePolicy::Skip => {
                        warn!(segment_id = %segment.id, index, error = %err.source, "Skipping unscored segment");
                        skipped.push(err);
                    }
                },
            }
        }

        Ok(self.finish(scored, skipped, BatchStatus::Complete))
    }

    fn finish(
        &self,
        scored: Vec<ScoredSegment>,
        skipped: Vec<ScoringError>,
        status: BatchStatus,
    ) -> ScoringOutcome {
        match &status {
            BatchStatus::Complete => info!(
                scored = scored.len(),
                skipped = skipped.len(),
                "Scoring batch complete"
            ),
            BatchStatus::Cancelled { completed } => {
                info!(completed, scored = scored.len(), "Scoring batch cancelled")
            }
            BatchStatus::TimedOut { completed } => {
                warn!(completed, scored = scored.len(), "Scoring batch deadline exceeded")
            }
            BatchStatus::Failed(err) => error!(
                scored = scored.len(),
                error = %err,
                "Scoring batch aborted"
            ),
        }
        ScoringOutcome {
            scored,
            skipped,
            status,
        }
    }

    /// Score one segment, retrying retryable failures with backoff
    async fn score_one(
        &self,
        index: usize,
        segment: &Segment,
        prior: &[PriorContext],
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<SegmentScore, Interrupt> {
        let request = ScoringRequest {
            segment,
            prior_context: prior,
        };
        let mut attempt: u32 = 0;
        let mut backoff = self.policy.initial_backoff;

        loop {
            attempt += 1;

            if let Some(limiter) = &self.rate_limiter {
                interruptible(limiter.until_ready(), cancel, deadline).await?;
            }

            if attempt > 1 {
                debug!(segment_id = %segment.id, attempt, "Retrying segment analysis");
            }

            let call = tokio::time::timeout(self.policy.call_timeout, self.oracle.score(&request));
            let result = match interruptible(call, cancel, deadline).await? {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(self.policy.call_timeout.as_millis() as u64)),
            };

            match result {
                Ok(analysis) => {
                    debug!(
                        segment_id = %segment.id,
                        index,
                        attempt,
                        topic = %analysis.topic,
                        "Segment scored"
                    );
                    return Ok(analysis.clamped());
                }
                Err(err) if err.is_retryable() && attempt <= self.policy.max_retries => {
                    warn!(
                        segment_id = %segment.id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Oracle call failed, will retry after backoff"
                    );
                    interruptible(tokio::time::sleep(backoff), cancel, deadline).await?;
                    backoff = backoff.saturating_mul(2).min(self.policy.max_backoff);
                }
                Err(err) => {
                    return Err(Interrupt::Failed(ScoringError {
                        index,
                        segment_id: segment.id.clone(),
                        attempts: attempt,
                        source: err,
                    }));
                }
            }
        }
    }
}

/// Run `fut` unless cancellation or the deadline comes first
async fn interruptible<F: Future>(
    fut: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<F::Output, Interrupt> {
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = expired => Err(Interrupt::TimedOut),
        output = fut => Ok(output),
    }
}
