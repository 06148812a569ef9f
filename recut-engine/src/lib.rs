//! recut-engine library interface
//!
//! Segment selection and dependency-constrained reordering for long-form
//! audio edits. Data flows through the crate as:
//!
//! raw segments → [`pipeline`] (quality oracle) → scored segments →
//! [`dependency_index`] → [`selection`] → [`validator`] / [`fallback`] →
//! final program ([`planner`]).

pub mod config;
pub mod dependency_index;
pub mod duration;
pub mod error;
pub mod fallback;
pub mod oracles;
pub mod pipeline;
pub mod planner;
pub mod selection;
pub mod types;
pub mod validator;

pub use crate::config::EngineConfig;
pub use crate::dependency_index::DependencyIndex;
pub use crate::duration::{
    estimate_compression_ratio, suggest_default_target, suggest_target_duration,
};
pub use crate::error::{EngineError, EngineResult, OracleError, ScoringError};
pub use crate::fallback::{propose_order, FallbackOptions};
pub use crate::pipeline::{
    BatchStatus, FailurePolicy, ScoringOutcome, ScoringPipeline, ScoringPolicy,
};
pub use crate::planner::{OrderSource, ProgramPlan, ProgramPlanner, RejectedProposal};
pub use crate::selection::{select, BudgetStrategy, SelectionOptions};
pub use crate::types::{PriorContext, QualityOracle, ReorderingOracle, ScoringRequest};
pub use crate::validator::{validate, OrderValidation, OrderViolation, TopicMatch};
