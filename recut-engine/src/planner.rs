//! Program Planner
//!
//! End-to-end assembly of an edited program from scored segments.
//!
//! # Flow
//! 1. Select segments within the target duration.
//! 2. Ask the reordering oracle, if one is configured, for an order.
//! 3. Validate the proposal. A valid proposal is used as-is.
//! 4. Otherwise (no oracle, oracle error, invalid proposal) the fallback
//!    heuristic orders the selection. Rejected proposals are logged and kept
//!    on the plan together with their violations.
//! 5. The final order is validated once more and the result attached.

use crate::config::EngineConfig;
use crate::duration::suggest_default_target;
use crate::error::EngineResult;
use crate::fallback::{propose_order, FallbackOptions};
use crate::selection::{select, SelectionOptions};
use crate::types::ReorderingOracle;
use crate::validator::{validate_with, OrderValidation, OrderViolation, TopicMatch};
use chrono::{DateTime, Utc};
use recut_common::{ProposedOrder, ScoredSegment, SelectionResult, Transition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where the final order came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSource {
    Oracle,
    Fallback,
}

/// Oracle proposal that was not used
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedProposal {
    pub oracle: String,
    /// Absent when the oracle call itself failed
    pub proposal: Option<ProposedOrder>,
    pub reason: String,
    pub violations: Vec<OrderViolation>,
}

/// Selected segments in their final playback order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramPlan {
    pub selection: SelectionResult,
    pub order: ProposedOrder,
    pub source: OrderSource,
    /// Validation of `order`
    pub validation: OrderValidation,
    pub rejected: Option<RejectedProposal>,
    pub generated_at: DateTime<Utc>,
}

impl ProgramPlan {
    /// Selected segments in playback order; unknown ids are skipped
    pub fn ordered_segments(&self) -> Vec<&ScoredSegment> {
        let by_id: HashMap<&str, &ScoredSegment> = self
            .selection
            .selected_segments
            .iter()
            .map(|s| (s.id(), s))
            .collect();
        self.order
            .order
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect()
    }
}

pub struct ProgramPlanner {
    selection: SelectionOptions,
    fallback: FallbackOptions,
    topic_match: TopicMatch,
    reorderer: Option<Arc<dyn ReorderingOracle>>,
}

impl ProgramPlanner {
    pub fn new(selection: SelectionOptions) -> Self {
        Self {
            selection,
            fallback: FallbackOptions::default(),
            topic_match: TopicMatch::default(),
            reorderer: None,
        }
    }

    /// Planner using the selection, fallback and validation settings of `config`
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.selection.clone())
            .with_fallback(config.fallback.clone())
            .with_topic_match(config.topic_match)
    }

    pub fn with_fallback(mut self, fallback: FallbackOptions) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_topic_match(mut self, topic_match: TopicMatch) -> Self {
        self.topic_match = topic_match;
        self
    }

    pub fn with_reorderer(mut self, reorderer: Arc<dyn ReorderingOracle>) -> Self {
        self.reorderer = Some(reorderer);
        self
    }

    /// Build a program of at most `target_duration` seconds
    ///
    /// # Errors
    /// Only malformed input fails; oracle problems degrade to the fallback
    /// order.
    pub async fn plan(
        &self,
        segments: &[ScoredSegment],
        target_duration: f64,
    ) -> EngineResult<ProgramPlan> {
        let selection = select(segments, target_duration, &self.selection)?;
        let selected = &selection.selected_segments;

        let mut rejected = None;
        let mut accepted = None;

        if let Some(reorderer) = self.reorderer.as_ref().filter(|_| !selected.is_empty()) {
            match reorderer.propose(selected).await {
                Ok(mut proposal) => {
                    let validation = validate_with(selected, &proposal, self.topic_match);
                    if validation.valid {
                        let dropped = retain_adjacent_transitions(&mut proposal);
                        if dropped > 0 {
                            warn!(
                                oracle = reorderer.name(),
                                dropped,
                                kept = proposal.transitions.len(),
                                "Dropped transitions that do not join adjacent segments"
                            );
                        }
                        accepted = Some((proposal, validation));
                    } else {
                        warn!(
                            oracle = reorderer.name(),
                            violations = ?validation.messages(),
                            proposed = ?proposal.order,
                            "Rejected proposed order, using fallback"
                        );
                        rejected = Some(RejectedProposal {
                            oracle: reorderer.name().to_string(),
                            proposal: Some(proposal),
                            reason: format!(
                                "Proposed order has {} violation(s)",
                                validation.errors.len()
                            ),
                            violations: validation.errors,
                        });
                    }
                }
                Err(err) => {
                    warn!(oracle = reorderer.name(), error = %err, "Reordering oracle failed, using fallback");
                    rejected = Some(RejectedProposal {
                        oracle: reorderer.name().to_string(),
                        proposal: None,
                        reason: err.to_string(),
                        violations: Vec::new(),
                    });
                }
            }
        }

        let (order, validation, source) = match accepted {
            Some((order, validation)) => (order, validation, OrderSource::Oracle),
            None => {
                let order = propose_order(selected, &self.fallback);
                let validation = validate_with(selected, &order, self.topic_match);
                if !validation.valid {
                    error!(
                        violations = ?validation.messages(),
                        "Fallback order violates dependencies"
                    );
                }
                (order, validation, OrderSource::Fallback)
            }
        };

        info!(
            selected = selected.len(),
            removed = selection.removed_count,
            duration = selection.total_duration,
            source = ?source,
            valid = validation.valid,
            "Program planned"
        );

        Ok(ProgramPlan {
            selection,
            order,
            source,
            validation,
            rejected,
            generated_at: Utc::now(),
        })
    }

    /// [`plan`](Self::plan) with the target suggested from the segments themselves
    pub async fn plan_with_suggested_target(
        &self,
        segments: &[ScoredSegment],
    ) -> EngineResult<ProgramPlan> {
        let target = suggest_default_target(segments);
        info!(target, "Using suggested target duration");
        self.plan(segments, target).await
    }
}

/// Keep only transitions bridging consecutive ids of `proposal.order`
///
/// Returns how many were dropped.
fn retain_adjacent_transitions(proposal: &mut ProposedOrder) -> usize {
    let adjacent: HashSet<(&str, &str)> = proposal
        .order
        .windows(2)
        .map(|pair| (pair[0].as_str(), pair[1].as_str()))
        .collect();
    let before = proposal.transitions.len();
    let kept: Vec<Transition> = proposal
        .transitions
        .iter()
        .filter(|t| adjacent.contains(&(t.before_id.as_str(), t.after_id.as_str())))
        .cloned()
        .collect();
    proposal.transitions = kept;
    before - proposal.transitions.len()
}
