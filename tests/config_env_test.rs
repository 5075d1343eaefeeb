//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads and validates
//! environment variable overrides. Config::from_env() also loads a .env
//! file via dotenvy, so each test sets every variable it asserts on.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use pln_orchestrator::config::{Config, LogFormat};
use serial_test::serial;
use std::env;

fn clear(keys: &[&str]) {
    for key in keys {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_from_env_defaults() {
    clear(&[
        "REQUEST_TIMEOUT_MS",
        "MAX_HOPS",
        "CALCULATOR_CONFIDENCE",
        "MAX_SOURCES",
    ]);

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 5000);
    assert_eq!(config.reasoning.max_hops, 3);
    assert_eq!(config.reasoning.calculator_confidence, 0.95);
    assert_eq!(config.documents.max_sources, 5);
}

#[test]
#[serial]
fn test_config_from_env_analysis_service() {
    env::set_var("ANALYSIS_BASE_URL", "https://analysis.example.org");
    env::set_var("ANALYSIS_API_KEY", "secret");

    let config = Config::from_env().unwrap();
    assert_eq!(
        config.analysis.base_url.as_deref(),
        Some("https://analysis.example.org")
    );
    assert_eq!(config.analysis.api_key.as_deref(), Some("secret"));

    clear(&["ANALYSIS_BASE_URL", "ANALYSIS_API_KEY"]);
}

#[test]
#[serial]
fn test_config_from_env_blank_url_is_unset() {
    env::set_var("DOCUMENT_INDEX_URL", "   ");

    let config = Config::from_env().unwrap();
    assert!(config.documents.base_url.is_none());

    clear(&["DOCUMENT_INDEX_URL"]);
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    env::set_var("DATABASE_PATH", "/custom/knowledge.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/knowledge.db");
    assert_eq!(config.database.max_connections, 10);

    clear(&["DATABASE_PATH", "DATABASE_MAX_CONNECTIONS"]);
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    clear(&["LOG_FORMAT"]);
}

#[test]
#[serial]
fn test_config_from_env_unparseable_falls_back() {
    env::set_var("MAX_RETRIES", "lots");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.max_retries, 1);

    clear(&["MAX_RETRIES"]);
}

#[test]
#[serial]
fn test_config_rejects_zero_timeout() {
    env::set_var("REQUEST_TIMEOUT_MS", "0");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("REQUEST_TIMEOUT_MS"));

    clear(&["REQUEST_TIMEOUT_MS"]);
}

#[test]
#[serial]
fn test_config_rejects_calculator_confidence_above_one() {
    env::set_var("CALCULATOR_CONFIDENCE", "1.5");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("CALCULATOR_CONFIDENCE"));

    clear(&["CALCULATOR_CONFIDENCE"]);
}

#[test]
#[serial]
fn test_config_rejects_zero_hops() {
    env::set_var("MAX_HOPS", "0");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("MAX_HOPS"));

    clear(&["MAX_HOPS"]);
}
