//! Selection Engine
//!
//! Chooses which scored segments survive into the edited program under a
//! duration budget.
//!
//! # Algorithm
//! 1. **Filter**: drop segments failing, in priority order, the quality
//!    threshold, the tangent rule, the repetition rule, a re-record request or
//!    a factual error. Each drop is attributed to the first rule it fails.
//! 2. **Score**: geometric mean of interest and clarity, multiplied by a
//!    standalone bonus (1.1), confusion (0.8) and incompleteness (0.9)
//!    penalties and a fan-in weight of `1 + 0.05 × dependents`.
//! 3. **Rank**: stable sort by score, highest first.
//! 4. **Pick**: walk the ranking, adding segments that fit the budget. Each
//!    pick drags in (regardless of budget) a carrier for every topic it
//!    depends on, transitively. The walk ends once the budget is reached.
//! 5. **Finalize**: chronological order, averages, removal accounting.
//!
//! Segments passing every filter but left out by the budget are counted as
//! [`RemovalReason::OverBudget`], so every unselected segment is attributed
//! to exactly one reason.

use crate::dependency_index::{topic_key, DependencyIndex};
use crate::error::{EngineError, EngineResult};
use recut_common::{RemovalReason, ScoredSegment, SegmentScore, SelectionResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Multiplier for segments that stand on their own
pub const STANDALONE_BONUS: f64 = 1.1;

/// Multiplier for segments flagged as confusing
pub const CONFUSING_PENALTY: f64 = 0.8;

/// Multiplier for segments flagged as incomplete
pub const INCOMPLETE_PENALTY: f64 = 0.9;

/// Score weight added per dependent segment
pub const FAN_IN_WEIGHT: f64 = 0.05;

/// What to do when the next ranked candidate does not fit the budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetStrategy {
    /// Stop scanning at the first candidate that would overflow
    #[default]
    StrictCutoff,
    /// Skip the overflowing candidate and keep probing lower-ranked ones
    BestFitContinue,
}

/// Selection tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionOptions {
    /// Minimum geometric mean of interest and clarity
    pub min_score_threshold: f64,
    pub allow_tangents: bool,
    pub allow_repetitions: bool,
    pub prefer_standalone: bool,
    pub budget_strategy: BudgetStrategy,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            min_score_threshold: 50.0,
            allow_tangents: false,
            allow_repetitions: false,
            prefer_standalone: true,
            budget_strategy: BudgetStrategy::StrictCutoff,
        }
    }
}

/// First filter rule the analysis fails, if any
pub fn filter_reason(analysis: &SegmentScore, options: &SelectionOptions) -> Option<RemovalReason> {
    if analysis.quality() < options.min_score_threshold {
        Some(RemovalReason::LowScore)
    } else if analysis.is_tangent && !options.allow_tangents {
        Some(RemovalReason::Tangent)
    } else if analysis.is_repetition && !options.allow_repetitions {
        Some(RemovalReason::Repetition)
    } else if analysis.needs_rerecord.is_some() {
        Some(RemovalReason::NeedsRerecord)
    } else if analysis.has_factual_error {
        Some(RemovalReason::FactualError)
    } else {
        None
    }
}

/// Ranking score for a segment that passed the filter
pub fn selection_score(
    analysis: &SegmentScore,
    options: &SelectionOptions,
    dependent_count: usize,
) -> f64 {
    let mut score = analysis.quality();
    if analysis.standalone && options.prefer_standalone {
        score *= STANDALONE_BONUS;
    }
    if analysis.is_confusing {
        score *= CONFUSING_PENALTY;
    }
    if analysis.is_incomplete {
        score *= INCOMPLETE_PENALTY;
    }
    score * (1.0 + FAN_IN_WEIGHT * dependent_count as f64)
}

/// Reject input that only a caller bug could produce
pub(crate) fn check_segments(segments: &[ScoredSegment]) -> EngineResult<()> {
    let mut ids = HashSet::with_capacity(segments.len());
    for segment in segments {
        segment.check()?;
        if !ids.insert(segment.id()) {
            return Err(EngineError::InvalidInput(format!(
                "duplicate segment id {}",
                segment.id()
            )));
        }
    }
    Ok(())
}

/// Select a chronologically ordered subset fitting `target_duration` seconds
///
/// # Errors
/// `EngineError::InvalidInput` for malformed segments, duplicate ids or a
/// non-finite target. Empty input or a non-positive target yield an empty
/// selection.
pub fn select(
    segments: &[ScoredSegment],
    target_duration: f64,
    options: &SelectionOptions,
) -> EngineResult<SelectionResult> {
    if !target_duration.is_finite() {
        return Err(EngineError::InvalidInput(format!(
            "target duration must be finite, got {}",
            target_duration
        )));
    }
    if !options.min_score_threshold.is_finite() {
        return Err(EngineError::InvalidInput(format!(
            "score threshold must be finite, got {}",
            options.min_score_threshold
        )));
    }
    check_segments(segments)?;

    if segments.is_empty() {
        return Ok(SelectionResult::default());
    }

    let filtered: Vec<Option<RemovalReason>> = segments
        .iter()
        .map(|s| filter_reason(&s.analysis, options))
        .collect();

    let mut picker = Picker::new(segments);

    if target_duration > 0.0 {
        let index = DependencyIndex::build(segments);

        let mut ranked: Vec<(usize, f64)> = filtered
            .iter()
            .enumerate()
            .filter(|(_, reason)| reason.is_none())
            .map(|(position, _)| {
                let segment = &segments[position];
                let score = selection_score(
                    &segment.analysis,
                    options,
                    index.dependent_count(segment.id()),
                );
                (position, score)
            })
            .collect();
        // sort_by is stable: equal scores keep input order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let ranked_positions: Vec<usize> = ranked.iter().map(|(p, _)| *p).collect();

        for &(position, score) in &ranked {
            if picker.total >= target_duration {
                break;
            }
            if picker.is_picked(position) {
                continue;
            }

            let duration = segments[position].duration();
            if picker.total + duration > target_duration {
                let stop = options.budget_strategy == BudgetStrategy::StrictCutoff
                    && !picker.order.is_empty();
                debug!(
                    segment_id = %segments[position].id(),
                    duration,
                    running_total = picker.total,
                    target_duration,
                    stop,
                    "Candidate exceeds budget"
                );
                if stop {
                    break;
                }
                continue;
            }

            debug!(segment_id = %segments[position].id(), score, duration, "Picked segment");
            picker.pick(position);
            picker.close_dependencies(position, &index, &ranked_positions);
        }
    }

    Ok(picker.finish(&filtered))
}

/// Running state of the greedy walk
struct Picker<'a> {
    segments: &'a [ScoredSegment],
    picked: Vec<bool>,
    order: Vec<usize>,
    total: f64,
}

impl<'a> Picker<'a> {
    fn new(segments: &'a [ScoredSegment]) -> Self {
        Self {
            segments,
            picked: vec![false; segments.len()],
            order: Vec::new(),
            total: 0.0,
        }
    }

    fn is_picked(&self, position: usize) -> bool {
        self.picked[position]
    }

    fn pick(&mut self, position: usize) {
        self.picked[position] = true;
        self.order.push(position);
        self.total += self.segments[position].duration();
    }

    /// Force-pick carriers for every topic the segment depends on, transitively
    ///
    /// Ranked candidates are searched first; if none carries the topic the
    /// remaining input is searched in input order so closure holds whenever
    /// any segment carries it.
    fn close_dependencies(&mut self, position: usize, index: &DependencyIndex, ranked: &[usize]) {
        let segments = self.segments;
        let mut pending = vec![position];

        while let Some(current) = pending.pop() {
            for label in &segments[current].analysis.depends_on {
                let carriers = index.segments_with_topic(label);
                if carriers.iter().any(|&p| p != current && self.picked[p]) {
                    continue;
                }

                let key = topic_key(label);
                let target = ranked
                    .iter()
                    .copied()
                    .chain(carriers.iter().copied())
                    .find(|&p| {
                        p != current && !self.picked[p] && topic_key(segments[p].topic()) == key
                    });

                if let Some(target) = target {
                    debug!(
                        segment_id = %segments[target].id(),
                        required_by = %segments[current].id(),
                        topic = %label,
                        "Forced dependency pick"
                    );
                    self.pick(target);
                    pending.push(target);
                }
            }
        }
    }

    fn finish(self, filtered: &[Option<RemovalReason>]) -> SelectionResult {
        let mut order = self.order;
        order.sort_by(|&a, &b| {
            self.segments[a]
                .segment
                .start_time
                .total_cmp(&self.segments[b].segment.start_time)
                .then(a.cmp(&b))
        });

        let selected_segments: Vec<ScoredSegment> =
            order.iter().map(|&p| self.segments[p].clone()).collect();

        let count = selected_segments.len();
        let (average_interest_score, average_clarity_score) = if count == 0 {
            (0.0, 0.0)
        } else {
            let interest: f64 = selected_segments.iter().map(|s| s.analysis.interest_score).sum();
            let clarity: f64 = selected_segments.iter().map(|s| s.analysis.clarity_score).sum();
            (interest / count as f64, clarity / count as f64)
        };

        let mut result = SelectionResult {
            selected_segments,
            total_duration: self.total,
            average_interest_score,
            average_clarity_score,
            removed_count: self.segments.len() - count,
            removed_reasons: Default::default(),
        };

        for (position, reason) in filtered.iter().enumerate() {
            if self.picked[position] {
                continue;
            }
            let reason = reason.unwrap_or(RemovalReason::OverBudget);
            *result.removed_reasons.entry(reason).or_insert(0) += 1;
        }

        info!(
            selected = count,
            removed = result.removed_count,
            total_duration = result.total_duration,
            "Selection complete"
        );

        result
    }
}
