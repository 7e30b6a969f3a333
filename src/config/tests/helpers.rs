//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::serde_json::json;
use ortho_config::{MergeComposer, toml};
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let source = r#"
        engine_socket = "unix:///run/podman/podman.sock"
        project_file = "/srv/shop/compose.toml"

        [lifecycle]
        stop_grace_secs = 5
        kill_timeout_secs = 3
        remove_timeout_secs = 10
        inspect_timeout_secs = 4
        stdin_drain_timeout_ms = 250
        health_poll_interval_ms = 100
    "#;

    toml::from_str(source).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let source = r#"
        engine_socket = "unix:///tmp/docker.sock"

        [lifecycle]
        remove_timeout_secs = 30
    "#;

    toml::from_str(source).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, ortho_config::serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Creates a composer with defaults, file and environment layers.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, ortho_config::serde_json::Error>
{
    let mut composer = create_composer_with_defaults()?;
    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "project_file": "/from/file/compose.toml",
            "lifecycle": { "stop_grace_secs": 7, "kill_timeout_secs": 9 }
        }),
        None,
    );
    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock",
        "lifecycle": { "stop_grace_secs": 11 }
    }));
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}
