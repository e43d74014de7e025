//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::{AppConfig, TransportConfig};

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///run/user/1000/podman/podman.sock"
        api_version = "v4.9.0"

        [transport]
        request_timeout_secs = 90
        connect_timeout_secs = 2
        max_header_bytes = 16384
        max_body_bytes = 1048576
        reconnect_attempts = 3
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "/run/podman/podman.sock"

        [transport]
        request_timeout_secs = 10
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a transport section has default values.
pub fn assert_transport_defaults(transport: &TransportConfig) {
    assert_eq!(transport.request_timeout_secs, 30);
    assert_eq!(transport.connect_timeout_secs, 5);
    assert_eq!(transport.max_header_bytes, 64 * 1024);
    assert_eq!(transport.max_body_bytes, 64 * 1024 * 1024);
    assert_eq!(transport.reconnect_attempts, 1);
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(
        config.engine_socket.is_none(),
        "engine_socket should be None"
    );
    assert!(config.api_version.is_none(), "api_version should be None");
    assert_transport_defaults(&config.transport);
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for
/// testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "api_version": "v4.0.0",
            "transport": { "request_timeout_secs": 60, "reconnect_attempts": 2 }
        }),
        None,
    );

    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock",
        "transport": { "request_timeout_secs": 45 }
    }));

    Ok(composer)
}
