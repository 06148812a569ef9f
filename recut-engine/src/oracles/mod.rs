//! Quality and reordering oracle implementations
//!
//! # Oracles
//! 1. **heuristic** - Deterministic, offline lexical scorer
//! 2. **anthropic** - Messages API backed scorer and reorderer

pub mod anthropic;
pub mod heuristic;

pub use anthropic::{AnthropicClient, AnthropicQualityOracle, AnthropicReorderingOracle};
pub use heuristic::HeuristicOracle;
