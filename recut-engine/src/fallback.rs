//! Fallback Reordering Heuristic
//!
//! Deterministic, oracle-free ordering used when no reordering oracle is
//! configured or its proposal was rejected.
//!
//! # Algorithm
//! 1. Split into standalone and dependent groups (skipped when the original
//!    order is preserved), rank each by interest plus clarity, standalone
//!    first.
//! 2. Repair: stable topological pass so that every dependency target comes
//!    before the segment needing it, ties resolved by the step 1 rank.
//!    Dependency cycles are broken at the best-ranked remaining segment.
//! 3. Suggest transitions wherever adjacent topics differ, an intro when the
//!    opener is not standalone and an outro naming the first and last topics.

use crate::dependency_index::{topic_key, DependencyIndex};
use recut_common::{ProposedOrder, ScoredSegment, Transition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackOptions {
    /// Keep the incoming order instead of regrouping by standalone-ness
    pub preserve_original_order: bool,
}

/// Propose an order over `segments` without consulting any oracle
pub fn propose_order(segments: &[ScoredSegment], options: &FallbackOptions) -> ProposedOrder {
    if segments.is_empty() {
        return ProposedOrder {
            reasoning: "No segments to order.".to_string(),
            ..Default::default()
        };
    }

    let ranking = initial_ranking(segments, options);
    let (ordered, moved) = repair_dependencies(segments, &ranking);

    let order: Vec<String> = ordered
        .iter()
        .map(|&i| segments[i].id().to_string())
        .collect();

    let transitions: Vec<Transition> = ordered
        .windows(2)
        .filter_map(|pair| {
            let (before, after) = (&segments[pair[0]], &segments[pair[1]]);
            if topic_key(before.topic()) == topic_key(after.topic()) {
                return None;
            }
            Some(Transition {
                before_id: before.id().to_string(),
                after_id: after.id().to_string(),
                transition_text: format!(
                    "That covers {}. Now let's turn to {}.",
                    topic_label(before),
                    topic_label(after)
                ),
                reasoning: format!(
                    "Topic shifts from \"{}\" to \"{}\"",
                    topic_label(before),
                    topic_label(after)
                ),
            })
        })
        .collect();

    let first = &segments[ordered[0]];
    let last = &segments[ordered[ordered.len() - 1]];

    let needs_intro = !first.analysis.standalone;
    let intro_suggestion = needs_intro.then(|| {
        format!(
            "Before we get into {}, here is the context you need.",
            topic_label(first)
        )
    });

    let outro_suggestion = Some(format!(
        "We started with {} and finished with {}. Thanks for listening.",
        topic_label(first),
        topic_label(last)
    ));

    let mut reasoning = if options.preserve_original_order {
        "Original order preserved.".to_string()
    } else {
        let standalone = segments.iter().filter(|s| s.analysis.standalone).count();
        format!(
            "{} standalone segment(s) first, then {} dependent segment(s), each ranked by interest plus clarity.",
            standalone,
            segments.len() - standalone
        )
    };
    if moved > 0 {
        reasoning.push_str(&format!(
            " {} segment(s) moved so dependencies come first.",
            moved
        ));
    }

    debug!(
        segments = segments.len(),
        transitions = transitions.len(),
        moved,
        "Fallback order proposed"
    );

    ProposedOrder {
        order,
        transitions,
        needs_intro,
        intro_suggestion,
        needs_outro: true,
        outro_suggestion,
        reasoning,
    }
}

fn topic_label(segment: &ScoredSegment) -> &str {
    let topic = segment.topic().trim();
    if topic.is_empty() {
        "this part"
    } else {
        topic
    }
}

/// Positions in heuristic order before dependency repair
fn initial_ranking(segments: &[ScoredSegment], options: &FallbackOptions) -> Vec<usize> {
    if options.preserve_original_order {
        return (0..segments.len()).collect();
    }

    let by_combined_desc = |a: &usize, b: &usize| {
        segments[*b]
            .analysis
            .combined()
            .total_cmp(&segments[*a].analysis.combined())
    };

    let (mut standalone, mut dependent): (Vec<usize>, Vec<usize>) =
        (0..segments.len()).partition(|&i| segments[i].analysis.standalone);
    standalone.sort_by(by_combined_desc);
    dependent.sort_by(by_combined_desc);

    standalone.extend(dependent);
    standalone
}

/// Stable topological repair over resolved dependency edges
///
/// Returns the repaired order and how many segments changed position.
fn repair_dependencies(segments: &[ScoredSegment], ranking: &[usize]) -> (Vec<usize>, usize) {
    let n = segments.len();
    let mut rank = vec![0usize; n];
    for (r, &i) in ranking.iter().enumerate() {
        rank[i] = r;
    }

    let index = DependencyIndex::build(segments);
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for edge in index.edges(segments) {
        if let Some(target) = edge.target {
            successors[target].push(edge.dependent);
            indegree[edge.dependent] += 1;
        }
    }

    // (rank, position) so the best-ranked ready segment comes out first
    let mut ready: BTreeSet<(usize, usize)> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(|i| (rank[i], i))
        .collect();
    let mut remaining: BTreeSet<(usize, usize)> = (0..n).map(|i| (rank[i], i)).collect();
    let mut ordered = Vec::with_capacity(n);

    loop {
        let Some((r, next)) = ready.first().copied().or_else(|| remaining.first().copied()) else {
            break;
        };
        if !ready.remove(&(r, next)) {
            warn!(
                segment_id = %segments[next].id(),
                "Dependency cycle detected; placing segment before its dependencies"
            );
        }
        remaining.remove(&(r, next));
        ordered.push(next);

        for &successor in &successors[next] {
            if indegree[successor] == 0 {
                continue;
            }
            indegree[successor] -= 1;
            if indegree[successor] == 0 && remaining.contains(&(rank[successor], successor)) {
                ready.insert((rank[successor], successor));
            }
        }
    }

    let moved = ordered
        .iter()
        .zip(ranking)
        .filter(|(a, b)| a != b)
        .count();
    (ordered, moved)
}
