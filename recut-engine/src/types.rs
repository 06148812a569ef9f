//! Oracle contracts
//!
//! Quality and reordering oracles are single-method capabilities. Each has a
//! deterministic implementation for tests and offline use and a
//! network-backed implementation for production; the engine never cares
//! which one it is talking to.

use crate::error::OracleError;
use async_trait::async_trait;
use recut_common::{ProposedOrder, ScoredSegment, Segment, SegmentScore};

/// Text and topic of a segment scored earlier in the same batch
#[derive(Debug, Clone, PartialEq)]
pub struct PriorContext {
    pub text: String,
    pub topic: String,
}

impl PriorContext {
    pub fn from_scored(scored: &ScoredSegment) -> Self {
        Self {
            text: scored.segment.text.clone(),
            topic: scored.analysis.topic.clone(),
        }
    }
}

/// Everything a quality oracle sees for one call
#[derive(Debug, Clone)]
pub struct ScoringRequest<'a> {
    pub segment: &'a Segment,
    /// Previously scored segments, oldest first
    pub prior_context: &'a [PriorContext],
}

/// Produces a [`SegmentScore`] for one segment
///
/// # Example
/// ```rust,ignore
/// use recut_engine::oracles::HeuristicOracle;
/// use recut_engine::types::{QualityOracle, ScoringRequest};
///
/// let oracle = HeuristicOracle::new();
/// let score = oracle
///     .score(&ScoringRequest { segment: &segment, prior_context: &[] })
///     .await?;
/// println!("{} -> {}", score.topic, score.quality());
/// ```
#[async_trait]
pub trait QualityOracle: Send + Sync {
    /// Oracle name for logging
    fn name(&self) -> &'static str;

    /// Score a single segment given the text and topics that precede it
    ///
    /// Implementations must clamp numeric fields into range; the pipeline
    /// never substitutes a default score when this fails.
    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError>;
}

/// Proposes a playback order over already selected segments
#[async_trait]
pub trait ReorderingOracle: Send + Sync {
    /// Oracle name for logging
    fn name(&self) -> &'static str;

    /// Propose an order; callers validate before trusting it
    async fn propose(&self, segments: &[ScoredSegment]) -> Result<ProposedOrder, OracleError>;
}
