//! # Recut Common Library
//!
//! Shared code for the recut editing pipeline including:
//! - Transcript segment and analysis models
//! - Selection and ordering artifacts handed to downstream consumers
//! - Configuration file discovery and loading
//! - Logging bootstrap

pub mod config;
pub mod error;
pub mod logging;
pub mod models;

pub use error::{Error, Result};
pub use models::{
    ProposedOrder, RemovalReason, ScoredSegment, Segment, SegmentScore, SelectionResult,
    Transition,
};
