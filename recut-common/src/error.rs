//! Common error types for recut

use thiserror::Error;

/// Common result type for recut operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by recut crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input handed in by a caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
