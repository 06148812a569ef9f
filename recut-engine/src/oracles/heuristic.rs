//! Heuristic Quality Oracle
//!
//! Deterministic, offline stand-in for the network scorer. Same input always
//! produces the same analysis, which keeps tests and dry runs reproducible.
//!
//! # Signals
//! - **Topic**: first two content words of the segment
//! - **Interest**: lexical variety (40%) plus length up to 40 words (30%),
//!   on a base of 30
//! - **Clarity**: 100 minus 400 × filler-word density
//! - **Tangent**: digression markers ("by the way", "side note", ...)
//! - **Repetition**: ≥ 60% content-word overlap with a prior segment
//! - **Standalone**: false when the segment opens with a back-reference, in
//!   which case it depends on the previous topic

use crate::dependency_index::topic_key;
use crate::error::OracleError;
use crate::types::{QualityOracle, ScoringRequest};
use async_trait::async_trait;
use recut_common::SegmentScore;
use std::collections::HashSet;
use tracing::debug;

const FILLER_WORDS: &[&str] = &[
    "um", "uh", "erm", "like", "basically", "actually", "literally", "kinda", "sorta", "yeah",
];

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "because", "before", "being", "could", "every", "from", "have",
    "just", "really", "should", "some", "that", "their", "them", "then", "there", "these",
    "they", "thing", "things", "this", "those", "very", "want", "were", "what", "when", "where",
    "which", "will", "with", "would", "your",
];

const TANGENT_MARKERS: &[&str] = &[
    "by the way",
    "side note",
    "off topic",
    "random aside",
    "going off on a tangent",
    "unrelated, but",
];

const BACK_REFERENCE_OPENERS: &[&str] = &[
    "this", "that", "it", "these", "those", "so", "and", "but", "also", "then",
];

const BACK_REFERENCE_PHRASES: &[&str] = &["as i said", "as mentioned", "like i said", "going back to"];

/// Jaccard overlap above which a segment counts as repeating earlier content
const REPETITION_OVERLAP: f64 = 0.6;

const KEY_INSIGHT_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    pub fn new() -> Self {
        Self
    }

    fn analyze(&self, request: &ScoringRequest<'_>) -> SegmentScore {
        let text = request.segment.text.trim();
        let lowered = text.to_lowercase();
        let words = tokenize(&lowered);

        if words.is_empty() {
            return SegmentScore {
                topic: "silence".to_string(),
                standalone: true,
                is_incomplete: true,
                incomplete_detail: Some("Segment has no spoken words".to_string()),
                ..Default::default()
            };
        }

        let topic = derive_topic(&words);

        let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
        let variety = unique.len() as f64 / words.len() as f64;
        let length_factor = (words.len() as f64 / 40.0).min(1.0);
        let interest_score = 30.0 + 40.0 * variety + 30.0 * length_factor;

        let fillers = words
            .iter()
            .filter(|w| FILLER_WORDS.contains(&w.as_str()))
            .count();
        let filler_density = fillers as f64 / words.len() as f64;
        let clarity_score = 100.0 - 400.0 * filler_density;

        let is_tangent = TANGENT_MARKERS.iter().any(|m| lowered.contains(m));

        let content = content_words(&words);
        let is_repetition = request.prior_context.iter().any(|prior| {
            let prior_words = tokenize(&prior.text.to_lowercase());
            jaccard(&content, &content_words(&prior_words)) >= REPETITION_OVERLAP
        });

        let opens_with_reference = BACK_REFERENCE_OPENERS.contains(&words[0].as_str())
            || BACK_REFERENCE_PHRASES.iter().any(|p| lowered.contains(p));
        let previous_topic = request
            .prior_context
            .last()
            .map(|p| p.topic.trim())
            .filter(|t| !t.is_empty() && topic_key(t) != topic_key(&topic));

        let (standalone, depends_on) = match (opens_with_reference, previous_topic) {
            (true, Some(previous)) => (false, vec![previous.to_string()]),
            (true, None) => (false, Vec::new()),
            (false, _) => (true, Vec::new()),
        };

        let is_incomplete = !text.ends_with(&['.', '!', '?'][..]);
        let is_confusing = clarity_score < 50.0;

        SegmentScore {
            topic,
            interest_score,
            clarity_score,
            is_tangent,
            is_repetition,
            standalone,
            depends_on,
            key_insight: key_insight(text),
            is_confusing,
            confusing_detail: is_confusing
                .then(|| format!("{} filler word(s) in {} words", fillers, words.len())),
            is_incomplete,
            incomplete_detail: is_incomplete
                .then(|| "Segment ends mid-sentence".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl QualityOracle for HeuristicOracle {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError> {
        let score = self.analyze(request).clamped();
        debug!(
            segment_id = %request.segment.id,
            topic = %score.topic,
            interest = score.interest_score,
            clarity = score.clarity_score,
            "Heuristic analysis complete"
        );
        Ok(score)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_content_word(word: &str) -> bool {
    word.chars().count() >= 4 && !STOP_WORDS.contains(&word) && !FILLER_WORDS.contains(&word)
}

fn content_words(words: &[String]) -> HashSet<&str> {
    words
        .iter()
        .map(String::as_str)
        .filter(|w| is_content_word(w))
        .collect()
}

fn derive_topic(words: &[String]) -> String {
    let mut picked: Vec<&str> = Vec::with_capacity(2);
    for word in words.iter().map(String::as_str).filter(|w| is_content_word(w)) {
        if !picked.contains(&word) {
            picked.push(word);
        }
        if picked.len() == 2 {
            break;
        }
    }
    if picked.is_empty() {
        "general".to_string()
    } else {
        picked.join(" ")
    }
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.union(b).count();
    shared as f64 / union as f64
}

fn key_insight(text: &str) -> String {
    let sentence = text
        .split_inclusive(&['.', '!', '?'][..])
        .next()
        .unwrap_or(text)
        .trim();
    if sentence.chars().count() <= KEY_INSIGHT_MAX_CHARS {
        sentence.to_string()
    } else {
        let truncated: String = sentence.chars().take(KEY_INSIGHT_MAX_CHARS).collect();
        format!("{}…", truncated.trim_end())
    }
}
