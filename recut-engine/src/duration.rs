//! Duration Estimators
//!
//! Rough guidance for how far a recording can be cut before selection runs.

use crate::error::{EngineError, EngineResult};
use recut_common::ScoredSegment;

/// Scores below this mark a segment as low value
pub const LOW_VALUE_SCORE: f64 = 40.0;

pub const DEFAULT_MIN_RATIO: f64 = 0.5;
pub const DEFAULT_MAX_RATIO: f64 = 0.9;

fn is_low_value(segment: &ScoredSegment) -> bool {
    let analysis = &segment.analysis;
    analysis.is_tangent
        || analysis.is_repetition
        || analysis.interest_score < LOW_VALUE_SCORE
        || analysis.clarity_score < LOW_VALUE_SCORE
}

fn total_duration(segments: &[ScoredSegment]) -> f64 {
    segments.iter().map(ScoredSegment::duration).sum()
}

/// Share of the recording worth keeping, in [0, 1]
///
/// Low-value time is tangents, repetitions, and anything scoring under 40 on
/// either axis. Returns 1 when there is no duration at all.
pub fn estimate_compression_ratio(segments: &[ScoredSegment]) -> f64 {
    let total = total_duration(segments);
    if total <= 0.0 {
        return 1.0;
    }

    let low_value: f64 = segments
        .iter()
        .filter(|s| is_low_value(s))
        .map(ScoredSegment::duration)
        .sum();

    ((total - low_value) / total).clamp(0.0, 1.0)
}

/// Suggested program length in seconds
///
/// The compression ratio is clamped into `[min_ratio, max_ratio]` and applied
/// to the total duration. The result is rounded to whole seconds unless
/// rounding would leave the clamped range.
///
/// # Errors
/// `EngineError::InvalidInput` unless `0 <= min_ratio <= max_ratio <= 1`.
pub fn suggest_target_duration(
    segments: &[ScoredSegment],
    min_ratio: f64,
    max_ratio: f64,
) -> EngineResult<f64> {
    if !(0.0..=1.0).contains(&min_ratio)
        || !(0.0..=1.0).contains(&max_ratio)
        || min_ratio > max_ratio
    {
        return Err(EngineError::InvalidInput(format!(
            "ratio bounds must satisfy 0 <= min <= max <= 1, got [{}, {}]",
            min_ratio, max_ratio
        )));
    }

    Ok(clamped_target(segments, min_ratio, max_ratio))
}

/// [`suggest_target_duration`] with the default 0.5-0.9 bounds
pub fn suggest_default_target(segments: &[ScoredSegment]) -> f64 {
    clamped_target(segments, DEFAULT_MIN_RATIO, DEFAULT_MAX_RATIO)
}

fn clamped_target(segments: &[ScoredSegment], min_ratio: f64, max_ratio: f64) -> f64 {
    let total = total_duration(segments);
    let ratio = estimate_compression_ratio(segments).clamp(min_ratio, max_ratio);
    let exact = ratio * total;
    let rounded = exact.round();

    if rounded >= min_ratio * total && rounded <= max_ratio * total {
        rounded
    } else {
        exact
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recut_common::{Segment, SegmentScore};

    fn seg(start: f64, end: f64, interest: f64, clarity: f64, tangent: bool) -> ScoredSegment {
        ScoredSegment::new(
            Segment::new(start, end, "text"),
            SegmentScore {
                interest_score: interest,
                clarity_score: clarity,
                is_tangent: tangent,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_ratio_counts_low_value_time() {
        let segments = vec![
            seg(0.0, 30.0, 80.0, 80.0, false),
            seg(30.0, 40.0, 80.0, 80.0, true),
            seg(40.0, 60.0, 35.0, 90.0, false),
        ];
        let ratio = estimate_compression_ratio(&segments);
        assert!((ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_of_empty_input_is_one() {
        assert_eq!(estimate_compression_ratio(&[]), 1.0);
    }

    #[test]
    fn test_suggestion_clamped_to_bounds() {
        let all_low = vec![seg(0.0, 100.0, 10.0, 10.0, false)];
        assert_eq!(suggest_target_duration(&all_low, 0.5, 0.9).unwrap(), 50.0);

        let all_good = vec![seg(0.0, 100.0, 90.0, 90.0, false)];
        assert_eq!(suggest_target_duration(&all_good, 0.5, 0.9).unwrap(), 90.0);
        assert_eq!(suggest_default_target(&all_good), 90.0);
    }

    #[test]
    fn test_rounding_never_leaves_range() {
        let segments = vec![seg(0.0, 3.0, 90.0, 90.0, false)];
        let target = suggest_target_duration(&segments, 0.5, 0.9).unwrap();
        assert!(target >= 1.5 && target <= 2.7 + 1e-9);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let segments = vec![seg(0.0, 10.0, 90.0, 90.0, false)];
        assert!(suggest_target_duration(&segments, 0.9, 0.5).is_err());
        assert!(suggest_target_duration(&segments, -0.1, 0.5).is_err());
        assert!(suggest_target_duration(&segments, 0.5, f64::NAN).is_err());
    }
}
