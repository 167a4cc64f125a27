//! Common test utilities and fixtures

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use narrator::backend::MockGenerator;
use narrator::commentary::{CommentaryContext, GenerationEngine};
use narrator::config::PersonaSettings;
use narrator::telemetry::StaticTelemetry;
use narrator::NarratorConfig;

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// Configuration with the given personas, all speaking without delay
pub fn roster_config(names: &[&str]) -> NarratorConfig {
    let mut config = NarratorConfig::default();
    config.personas = names
        .iter()
        .map(|name| PersonaSettings {
            name: name.to_string(),
            personality: format!("{} comments on the colony.", name),
            phrase_delay_min_secs: 0,
            phrase_delay_max_secs: 0,
            ..Default::default()
        })
        .collect();
    config
}

/// Session wired to a scripted generator
pub fn session(
    config: &NarratorConfig,
    mock: Arc<MockGenerator>,
    telemetry: Arc<StaticTelemetry>,
) -> Arc<CommentaryContext> {
    let engine = Arc::new(GenerationEngine::new(
        mock,
        config.provider.clone(),
        config.commentary.clone(),
    ));
    CommentaryContext::new(config, engine, telemetry, true)
}
