//! Error types for recut-engine
//!
//! Selection, validation and the fallback heuristic only fail on malformed
//! input. Oracle failures are the only errors expected to be recovered from at
//! runtime (retry, fallback, partial batch continuation).

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input handed in by a caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A segment could not be scored
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// recut-common error
    #[error("Common error: {0}")]
    Common(#[source] recut_common::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl From<recut_common::Error> for EngineError {
    fn from(err: recut_common::Error) -> Self {
        match err {
            recut_common::Error::InvalidInput(msg) => EngineError::InvalidInput(msg),
            other => EngineError::Common(other),
        }
    }
}

/// Failure reported by a quality or reordering oracle
#[derive(Debug, Error)]
pub enum OracleError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Call exceeded its time limit
    #[error("Oracle call timed out after {0} ms")]
    Timeout(u64),

    /// Provider asked us to slow down
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider returned a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Response did not contain a usable answer
    #[error("Parse error: {0}")]
    Parse(String),

    /// Oracle is missing credentials or settings
    #[error("Oracle not configured: {0}")]
    NotConfigured(String),

    /// Batch was cancelled while the call was pending
    #[error("Cancelled")]
    Cancelled,

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OracleError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Network(_) | OracleError::Timeout(_) | OracleError::RateLimited(_) => {
                true
            }
            OracleError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout(0)
        } else if err.is_decode() {
            OracleError::Parse(err.to_string())
        } else {
            OracleError::Network(err.to_string())
        }
    }
}

/// Oracle failure pinned to the segment that could not be scored
#[derive(Debug, Error)]
#[error("Scoring segment {segment_id} (batch index {index}) failed after {attempts} attempt(s): {source}")]
pub struct ScoringError {
    /// Position of the segment in the batch
    pub index: usize,
    pub segment_id: String,
    pub attempts: u32,
    #[source]
    pub source: OracleError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(OracleError::Network("reset".into()).is_retryable());
        assert!(OracleError::Timeout(1000).is_retryable());
        assert!(OracleError::RateLimited("429".into()).is_retryable());
        assert!(OracleError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!OracleError::Api { status: 401, body: String::new() }.is_retryable());
        assert!(!OracleError::Parse("no json".into()).is_retryable());
        assert!(!OracleError::Cancelled.is_retryable());
    }

    #[test]
    fn test_common_invalid_input_maps_to_engine_invalid_input() {
        let err: EngineError = recut_common::Error::InvalidInput("end before start".into()).into();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let err: EngineError = recut_common::Error::Config("bad".into()).into();
        assert!(matches!(err, EngineError::Common(_)));
    }

    #[test]
    fn test_scoring_error_names_segment() {
        let err = ScoringError {
            index: 4,
            segment_id: "seg-5".to_string(),
            attempts: 3,
            source: OracleError::Timeout(2000),
        };
        let message = err.to_string();
        assert!(message.contains("seg-5"));
        assert!(message.contains("batch index 4"));
        assert!(message.contains("3 attempt"));
    }
}
