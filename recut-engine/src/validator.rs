//! Narrative Order Validator
//!
//! Checks that a proposed order is a permutation of the selected segments and
//! that every dependency is introduced before the segment relying on it.
//!
//! # Checks
//! 1. **Totality**: every id is known, appears once, and no selected segment
//!    is missing. Structurally invalid permutations are reported, never
//!    repaired.
//! 2. **Ordering**: for each segment S and each topic T it depends on, the
//!    segment resolved for T must sit at an earlier position than S.
//!
//! Dependencies on topics no selected segment carries are not reported;
//! presence is the selection engine's responsibility.

use crate::dependency_index::DependencyIndex;
use recut_common::{ProposedOrder, ScoredSegment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// How a dependency label is resolved to the segment that must come first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopicMatch {
    /// First other segment carrying the topic in the validated list
    #[default]
    FirstInInput,
    /// Whichever carrier of the topic is placed earliest in the order
    EarliestInOrder,
}

/// Single problem found in a proposed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderViolation {
    UnknownId {
        id: String,
    },
    DuplicateId {
        id: String,
    },
    MissingId {
        id: String,
    },
    DependencyOutOfOrder {
        segment_id: String,
        topic: String,
        required_id: String,
        segment_position: usize,
        required_position: usize,
    },
    DependencyAbsent {
        segment_id: String,
        topic: String,
        required_id: String,
    },
}

impl fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderViolation::UnknownId { id } => write!(f, "Unknown segment id {} in order", id),
            OrderViolation::DuplicateId { id } => {
                write!(f, "Segment {} appears more than once in order", id)
            }
            OrderViolation::MissingId { id } => write!(f, "Segment {} is missing from order", id),
            OrderViolation::DependencyOutOfOrder {
                segment_id,
                topic,
                required_id,
                segment_position,
                required_position,
            } => write!(
                f,
                "Segment {} (position {}) depends on \"{}\" but {} is at position {}",
                segment_id, segment_position, topic, required_id, required_position
            ),
            OrderViolation::DependencyAbsent {
                segment_id,
                topic,
                required_id,
            } => write!(
                f,
                "Segment {} depends on \"{}\" but {} is not in the order",
                segment_id, topic, required_id
            ),
        }
    }
}

/// Validation outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderValidation {
    pub valid: bool,
    pub errors: Vec<OrderViolation>,
}

impl OrderValidation {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Validate with the default [`TopicMatch::FirstInInput`] policy
pub fn validate(segments: &[ScoredSegment], proposed: &ProposedOrder) -> OrderValidation {
    validate_with(segments, proposed, TopicMatch::default())
}

/// Validate a proposed order over `segments`
pub fn validate_with(
    segments: &[ScoredSegment],
    proposed: &ProposedOrder,
    policy: TopicMatch,
) -> OrderValidation {
    let mut errors = Vec::new();

    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        by_id.entry(segment.id()).or_insert(index);
    }

    // segment index -> position in the proposed order
    let mut positions: HashMap<usize, usize> = HashMap::with_capacity(proposed.order.len());
    let mut placed: Vec<usize> = Vec::with_capacity(proposed.order.len());
    for (position, id) in proposed.order.iter().enumerate() {
        match by_id.get(id.as_str()) {
            None => errors.push(OrderViolation::UnknownId { id: id.clone() }),
            Some(&index) => {
                if positions.contains_key(&index) {
                    errors.push(OrderViolation::DuplicateId { id: id.clone() });
                } else {
                    positions.insert(index, position);
                    placed.push(index);
                }
            }
        }
    }

    for (index, segment) in segments.iter().enumerate() {
        if by_id.get(segment.id()) == Some(&index) && !positions.contains_key(&index) {
            errors.push(OrderViolation::MissingId {
                id: segment.id().to_string(),
            });
        }
    }

    let dependency_index = DependencyIndex::build(segments);
    for &index in &placed {
        let segment = &segments[index];
        let segment_position = positions[&index];

        for topic in &segment.analysis.depends_on {
            let required = match policy {
                TopicMatch::FirstInInput => dependency_index
                    .first_with_topic(topic, index)
                    .map(|required| (required, positions.get(&required).copied())),
                TopicMatch::EarliestInOrder => {
                    let carriers: Vec<usize> = dependency_index
                        .segments_with_topic(topic)
                        .iter()
                        .copied()
                        .filter(|&c| c != index)
                        .collect();
                    carriers
                        .iter()
                        .filter_map(|&c| positions.get(&c).map(|&p| (c, Some(p))))
                        .min_by_key(|&(_, p)| p)
                        .or_else(|| carriers.first().map(|&c| (c, None)))
                }
            };

            let Some((required, required_position)) = required else {
                continue;
            };

            match required_position {
                Some(required_position) if required_position < segment_position => {}
                Some(required_position) => {
                    errors.push(OrderViolation::DependencyOutOfOrder {
                        segment_id: segment.id().to_string(),
                        topic: topic.clone(),
                        required_id: segments[required].id().to_string(),
                        segment_position,
                        required_position,
                    });
                }
                None => {
                    errors.push(OrderViolation::DependencyAbsent {
                        segment_id: segment.id().to_string(),
                        topic: topic.clone(),
                        required_id: segments[required].id().to_string(),
                    });
                }
            }
        }
    }

    debug!(
        segments = segments.len(),
        ordered = proposed.order.len(),
        violations = errors.len(),
        "Order validation complete"
    );

    OrderValidation {
        valid: errors.is_empty(),
        errors,
    }
}
