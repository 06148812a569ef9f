//! Transcript segment models shared across the editing pipeline
//!
//! Field names serialize in camelCase so the selection and ordering artifacts
//! can be handed unchanged to the editor front end.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Lower bound of the analysis score scale
pub const SCORE_MIN: f64 = 0.0;

/// Upper bound of the analysis score scale
pub const SCORE_MAX: f64 = 100.0;

/// Immutable transcribed unit
///
/// Created once by transcription and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Stable opaque identifier
    pub id: String,
    /// Start of the segment in seconds
    pub start_time: f64,
    /// End of the segment in seconds (must be greater than `start_time`)
    pub end_time: f64,
    /// Transcribed text
    pub text: String,
}

impl Segment {
    /// Create a segment with a freshly generated identifier
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), start_time, end_time, text)
    }

    /// Create a segment with a caller-supplied identifier
    pub fn with_id(
        id: impl Into<String>,
        start_time: f64,
        end_time: f64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time,
            text: text.into(),
        }
    }

    /// Length of the segment in seconds
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    /// Reject segments no transcription step could have produced
    pub fn check(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("segment id is empty".to_string()));
        }
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(Error::InvalidInput(format!(
                "segment {} has non-finite time range ({}, {})",
                self.id, self.start_time, self.end_time
            )));
        }
        if self.end_time <= self.start_time {
            return Err(Error::InvalidInput(format!(
                "segment {} ends at {} which is not after its start {}",
                self.id, self.end_time, self.start_time
            )));
        }
        Ok(())
    }
}

/// Oracle-produced analysis attached to one segment
///
/// Replaced wholesale whenever a segment is re-analyzed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentScore {
    /// Short free-text topic label, the only handle other segments depend on
    pub topic: String,
    /// How engaging the segment is (0-100)
    pub interest_score: f64,
    /// How clearly the segment is delivered (0-100)
    pub clarity_score: f64,
    pub is_tangent: bool,
    pub is_repetition: bool,
    /// Segment makes sense without any earlier context
    pub standalone: bool,
    /// Topic labels that must be introduced before this segment, in order
    pub depends_on: Vec<String>,
    pub key_insight: String,
    pub has_factual_error: bool,
    pub factual_error_detail: Option<String>,
    pub has_contradiction: bool,
    pub contradiction_detail: Option<String>,
    pub is_confusing: bool,
    pub confusing_detail: Option<String>,
    pub is_incomplete: bool,
    pub incomplete_detail: Option<String>,
    /// Suggestion for re-recording, present only when a redo is advised
    pub needs_rerecord: Option<String>,
}

impl SegmentScore {
    /// Clamp scores into the 0-100 scale and tidy the dependency list
    ///
    /// NaN scores collapse to 0. Blank dependency labels are dropped and
    /// repeated labels keep their first position.
    pub fn clamped(mut self) -> Self {
        self.interest_score = clamp_score(self.interest_score);
        self.clarity_score = clamp_score(self.clarity_score);

        let mut seen: Vec<String> = Vec::with_capacity(self.depends_on.len());
        let mut depends_on = Vec::with_capacity(self.depends_on.len());
        for label in self.depends_on.drain(..) {
            let label = label.trim().to_string();
            if label.is_empty() {
                continue;
            }
            let key = label.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                depends_on.push(label);
            }
        }
        self.depends_on = depends_on;
        self
    }

    /// Geometric mean of interest and clarity
    pub fn quality(&self) -> f64 {
        (self.interest_score * self.clarity_score).max(0.0).sqrt()
    }

    /// Sum of interest and clarity, used for coarse ranking
    pub fn combined(&self) -> f64 {
        self.interest_score + self.clarity_score
    }

    fn check(&self, segment_id: &str) -> Result<()> {
        if !self.interest_score.is_finite() || !self.clarity_score.is_finite() {
            return Err(Error::InvalidInput(format!(
                "segment {} has non-finite scores (interest {}, clarity {})",
                segment_id, self.interest_score, self.clarity_score
            )));
        }
        let range = SCORE_MIN..=SCORE_MAX;
        if !range.contains(&self.interest_score) || !range.contains(&self.clarity_score) {
            return Err(Error::InvalidInput(format!(
                "segment {} has scores outside [{}, {}] (interest {}, clarity {})",
                segment_id, SCORE_MIN, SCORE_MAX, self.interest_score, self.clarity_score
            )));
        }
        Ok(())
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        SCORE_MIN
    } else {
        value.clamp(SCORE_MIN, SCORE_MAX)
    }
}

/// Segment plus its analysis, the unit the selection engine works on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSegment {
    #[serde(flatten)]
    pub segment: Segment,
    pub analysis: SegmentScore,
}

impl ScoredSegment {
    pub fn new(segment: Segment, analysis: SegmentScore) -> Self {
        Self { segment, analysis }
    }

    pub fn id(&self) -> &str {
        &self.segment.id
    }

    pub fn topic(&self) -> &str {
        &self.analysis.topic
    }

    pub fn duration(&self) -> f64 {
        self.segment.duration()
    }

    /// Reject malformed segments or analyses
    pub fn check(&self) -> Result<()> {
        self.segment.check()?;
        self.analysis.check(&self.segment.id)
    }
}

/// Why a segment did not make it into the edited program
///
/// Filter reasons are listed in the priority order they are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Geometric mean of interest and clarity below the threshold
    LowScore,
    Tangent,
    Repetition,
    NeedsRerecord,
    FactualError,
    /// Passed every filter but did not fit the duration budget
    OverBudget,
}

impl RemovalReason {
    pub fn label(&self) -> &'static str {
        match self {
            RemovalReason::LowScore => "low_score",
            RemovalReason::Tangent => "tangent",
            RemovalReason::Repetition => "repetition",
            RemovalReason::NeedsRerecord => "needs_rerecord",
            RemovalReason::FactualError => "factual_error",
            RemovalReason::OverBudget => "over_budget",
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of budget-constrained selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    /// Chosen segments in chronological order
    pub selected_segments: Vec<ScoredSegment>,
    /// Sum of selected durations in seconds
    pub total_duration: f64,
    pub average_interest_score: f64,
    pub average_clarity_score: f64,
    /// Input segments that were not selected
    pub removed_count: usize,
    /// One entry per removed segment, keyed by its first matching reason
    pub removed_reasons: BTreeMap<RemovalReason, usize>,
}

impl SelectionResult {
    pub fn selected_ids(&self) -> Vec<String> {
        self.selected_segments
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    }
}

/// Suggested bridge between two adjacent segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub before_id: String,
    pub after_id: String,
    pub transition_text: String,
    pub reasoning: String,
}

/// Proposed playback order over the selected segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProposedOrder {
    /// Permutation of the selected segment ids
    pub order: Vec<String>,
    pub transitions: Vec<Transition>,
    pub needs_intro: bool,
    pub intro_suggestion: Option<String>,
    pub needs_outro: bool,
    pub outro_suggestion: Option<String>,
    pub reasoning: String,
}
