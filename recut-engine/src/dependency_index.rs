//! Dependency Index
//!
//! Maps topic labels to the segments carrying them and each segment to the
//! segments that declare dependence on its topic. Topic labels are free text,
//! so lookups compare trimmed, lowercased labels and a label shared by several
//! segments resolves to all of them. Selection uses the fan-in for scoring
//! weight only; closure is enforced by the selection walk itself.
//!
//! Positions returned by the index refer to the slice it was built from.

use recut_common::ScoredSegment;
use std::collections::HashMap;

/// Normalized lookup key for a topic label
pub fn topic_key(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Dependency edge resolved from a topic label to a concrete segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Position of the segment declaring the dependency
    pub dependent: usize,
    /// Label as declared by the dependent
    pub topic: String,
    /// First other segment carrying the topic, in input order
    pub target: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    by_topic: HashMap<String, Vec<usize>>,
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyIndex {
    /// Build the index in O(n·d) over segments and their dependency labels
    pub fn build(segments: &[ScoredSegment]) -> Self {
        let mut by_topic: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, segment) in segments.iter().enumerate() {
            let key = topic_key(segment.topic());
            if !key.is_empty() {
                by_topic.entry(key).or_default().push(position);
            }
        }

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for (position, segment) in segments.iter().enumerate() {
            for label in &segment.analysis.depends_on {
                let Some(carriers) = by_topic.get(&topic_key(label)) else {
                    continue;
                };
                for &carrier in carriers {
                    if carrier == position {
                        continue;
                    }
                    let list = dependents
                        .entry(segments[carrier].id().to_string())
                        .or_default();
                    if !list.iter().any(|id| id == segment.id()) {
                        list.push(segment.id().to_string());
                    }
                }
            }
        }

        Self {
            by_topic,
            dependents,
        }
    }

    /// Ids of segments declaring dependence on this segment's topic
    pub fn dependents_of(&self, segment_id: &str) -> &[String] {
        self.dependents
            .get(segment_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fan-in: number of other segments depending on this segment's topic
    pub fn dependent_count(&self, segment_id: &str) -> usize {
        self.dependents_of(segment_id).len()
    }

    /// Positions of every segment carrying the topic, in input order
    pub fn segments_with_topic(&self, topic: &str) -> &[usize] {
        self.by_topic
            .get(&topic_key(topic))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First segment carrying the topic, skipping `exclude`
    pub fn first_with_topic(&self, topic: &str, exclude: usize) -> Option<usize> {
        self.segments_with_topic(topic)
            .iter()
            .copied()
            .find(|&position| position != exclude)
    }

    /// Resolve every declared dependency to a concrete segment position
    ///
    /// Ambiguous labels resolve to the first carrier in input order.
    pub fn edges(&self, segments: &[ScoredSegment]) -> Vec<DependencyEdge> {
        let mut edges = Vec::new();
        for (position, segment) in segments.iter().enumerate() {
            for label in &segment.analysis.depends_on {
                edges.push(DependencyEdge {
                    dependent: position,
                    topic: label.clone(),
                    target: self.first_with_topic(label, position),
                });
            }
        }
        edges
    }
}
