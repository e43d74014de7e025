//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: application defaults, configuration file,
//! `PODWIRE_*` environment variables, command-line arguments.
//!
//! The layers are composed by hand with `MergeComposer` rather than through
//! `OrthoConfig::load()`, because the `Cli` owns subcommand parsing and
//! because typed environment variables must fail fast instead of being
//! dropped silently. An unparseable value such as
//! `PODWIRE_TRANSPORT_REQUEST_TIMEOUT_SECS=soon` is an error; string fields
//! like `PODWIRE_ENGINE_SOCKET` are always accepted.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, PodwireError, Result};

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
    /// Unsigned 32-bit integer. Invalid values return an error.
    U32,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `PODWIRE_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["transport", "request_timeout_secs"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
///
/// Adding or modifying environment variable mappings is a single-line change here.
/// The order doesn't matter as the table is processed in a single pass.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    // Top-level fields
    EnvVarSpec {
        env_var: "PODWIRE_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "PODWIRE_API_VERSION",
        path: &["api_version"],
        var_type: EnvVarType::String,
    },
    // Transport fields
    EnvVarSpec {
        env_var: "PODWIRE_TRANSPORT_REQUEST_TIMEOUT_SECS",
        path: &["transport", "request_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PODWIRE_TRANSPORT_CONNECT_TIMEOUT_SECS",
        path: &["transport", "connect_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PODWIRE_TRANSPORT_MAX_HEADER_BYTES",
        path: &["transport", "max_header_bytes"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PODWIRE_TRANSPORT_MAX_BODY_BYTES",
        path: &["transport", "max_body_bytes"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PODWIRE_TRANSPORT_RECONNECT_ATTEMPTS",
        path: &["transport", "reconnect_attempts"],
        var_type: EnvVarType::U32,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// This is primarily useful for tests that need to clear all `PODWIRE_*` environment
/// variables to ensure isolation. Using this function instead of a hard-coded list
/// ensures the test stays in sync with the loader's actual environment variable
/// mappings.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// Uses `cap_std::fs_utf8` for capability-oriented filesystem access as per
/// project conventions. The function opens the parent directory of the config
/// file and reads from there.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    // Open the parent directory using ambient authority, then read the file.
    let current_dir = Utf8PathBuf::from(".");
    let parent = path.parent().unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|e| read_error(path, &format!("failed to open directory {parent}"), &e))?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| read_error(path, &format!("failed to read {path}"), &e))?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// A missing file or directory is `FileNotFound`; anything else is a read
/// failure reported as `ParseError`.
fn read_error(path: &Utf8PathBuf, context: &str, error: &std::io::Error) -> ConfigError {
    if error.kind() == std::io::ErrorKind::NotFound {
        ConfigError::FileNotFound { path: path.clone() }
    } else {
        ConfigError::ParseError {
            message: format!("{context}: {error}"),
        }
    }
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (discovered via XDG paths or `PODWIRE_CONFIG_PATH`)
/// 3. Environment variables prefixed with `PODWIRE_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - An explicit `--config` path that does not exist (`FileNotFound`)
/// - Malformed configuration files
/// - Invalid typed environment variable values (e.g., non-numeric
///   `PODWIRE_TRANSPORT_MAX_BODY_BYTES`)
/// - Transport limits that fail
///   [`TransportConfig::validate`](crate::config::TransportConfig::validate)
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    // An explicit `--config` must exist; otherwise discover via XDG paths.
    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().or_else(|| {
            // Discover config files using ortho_config's ConfigDiscovery builder.
            let discovery = ConfigDiscovery::builder("podwire")
                .env_var("PODWIRE_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".podwire.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    // Merge all layers into the final configuration.
    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.transport.validate()?;

    Ok(config)
}

/// Collect environment variables with the `PODWIRE_` prefix into a JSON value.
///
/// This function uses a data-driven approach: all environment variable mappings
/// are defined in [`ENV_VAR_SPECS`]. Adding or changing mappings requires only
/// a single-line change in that table.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a integer environment variable
/// has an unparseable value. This fail-fast approach ensures misconfigurations are
/// visible to users.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };

        // Parse the value according to its expected type.
        // Invalid values return an error immediately (fail-fast).
        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::U64 => match raw_value.parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => return Err(unsigned_expected(spec, &raw_value)),
            },
            EnvVarType::U32 => match raw_value.parse::<u32>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => return Err(unsigned_expected(spec, &raw_value)),
            },
        };

        // Insert at the appropriate path (supports arbitrary nesting depth).
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn unsigned_expected(spec: &EnvVarSpec, raw_value: &str) -> PodwireError {
    ConfigError::InvalidValue {
        field: spec.env_var.to_owned(),
        reason: format!("expected unsigned integer, got '{raw_value}'"),
    }
    .into()
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["transport", "max_body_bytes"]`, this creates the
/// intermediate `transport` object if needed and inserts `max_body_bytes` within it.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    // Navigate to the parent object, creating intermediate objects as needed.
    let mut current = root;
    for &segment in parents {
        // Ensure the entry is an object; if it's not (shouldn't happen with our
        // controlled path specs), skip this insertion.
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    // Insert the final field.
    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();

    if let Some(ref socket) = cli.engine_socket {
        overrides.insert(
            "engine_socket".to_owned(),
            serde_json::Value::String(socket.clone()),
        );
    }

    if let Some(ref version) = cli.api_version {
        overrides.insert(
            "api_version".to_owned(),
            serde_json::Value::String(version.clone()),
        );
    }

    if overrides.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(overrides)
    }
}
