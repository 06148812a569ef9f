//! Configuration Tests
//! Test File: config_tests.rs
//! Covers: config file discovery through RECUT_CONFIG, settings conversion,
//! API key resolution

use recut_common::config::CONFIG_ENV_VAR;
use recut_engine::config::{resolve_api_key, API_KEY_ENV_VAR};
use recut_engine::{BudgetStrategy, EngineConfig, FailurePolicy, ProgramPlanner, TopicMatch};
use serial_test::serial;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
topic_match = "earliest-in-order"

[logging]
level = "recut_engine=debug"
ansi = false

[selection]
min_score_threshold = 55.0
allow_tangents = true
budget_strategy = "best-fit-continue"

[fallback]
preserve_original_order = true

[scoring]
context_window = 5
min_interval_ms = 0
max_retries = 1
failure_policy = "skip"

[anthropic]
api_key = "sk-from-toml"
model = "claude-test"
max_tokens = 2048
"#;

/// TC-CFG-001: RECUT_CONFIG selects the file
#[test]
#[serial]
fn tc_cfg_001_env_var_config_path() {
    // Given: a complete config file named by RECUT_CONFIG
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recut.toml");
    fs::write(&path, FULL_CONFIG).unwrap();
    std::env::set_var(CONFIG_ENV_VAR, &path);

    // When
    let config = EngineConfig::load(None);
    std::env::remove_var(CONFIG_ENV_VAR);
    let config = config.unwrap();

    // Then: every table is read
    assert_eq!(config.logging.level, "recut_engine=debug");
    assert!(!config.logging.ansi);
    assert_eq!(config.selection.min_score_threshold, 55.0);
    assert!(config.selection.allow_tangents);
    assert_eq!(config.selection.budget_strategy, BudgetStrategy::BestFitContinue);
    assert!(config.fallback.preserve_original_order);
    assert_eq!(config.topic_match, TopicMatch::EarliestInOrder);
    assert_eq!(config.anthropic.model, "claude-test");
    assert_eq!(config.anthropic.max_tokens, 2048);

    // And: scoring settings convert to a pipeline policy
    let policy = config.scoring.to_policy();
    assert_eq!(policy.context_window, 5);
    assert_eq!(policy.min_interval, Duration::ZERO);
    assert_eq!(policy.max_retries, 1);
    assert_eq!(policy.failure_policy, FailurePolicy::Skip);
    assert_eq!(policy.initial_backoff, Duration::from_millis(250));

    // And: a planner can be built from it
    let _planner = ProgramPlanner::from_config(&config);
}

/// TC-CFG-002: A named but missing file is an error
#[test]
#[serial]
fn tc_cfg_002_missing_named_file() {
    // Given
    let dir = TempDir::new().unwrap();
    std::env::set_var(CONFIG_ENV_VAR, dir.path().join("nope.toml"));

    // When
    let result = EngineConfig::load(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    // Then
    assert!(result.is_err());
}

/// TC-CFG-003: Invalid values are rejected at load time
#[test]
#[serial]
fn tc_cfg_003_invalid_values() {
    // Given: backoff start above its cap
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recut.toml");
    fs::write(&path, "[scoring]\ninitial_backoff_ms = 9000\nmax_backoff_ms = 100\n").unwrap();

    // When/Then
    assert!(EngineConfig::load(Some(&path)).is_err());
}

/// TC-CFG-004: Environment key wins over TOML
#[test]
#[serial]
fn tc_cfg_004_api_key_resolution() {
    // Given: a key in the file
    let config: EngineConfig = toml::from_str(FULL_CONFIG).unwrap();

    // When: no environment key
    std::env::remove_var(API_KEY_ENV_VAR);
    let from_toml = resolve_api_key(&config.anthropic).unwrap();

    // When: environment key present
    std::env::set_var(API_KEY_ENV_VAR, "sk-from-env");
    let from_env = resolve_api_key(&config.anthropic).unwrap();
    std::env::remove_var(API_KEY_ENV_VAR);

    // Then
    assert_eq!(from_toml, "sk-from-toml");
    assert_eq!(from_env, "sk-from-env");
}
