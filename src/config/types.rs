//! Configuration data types for podwire.

use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::error::{ConfigError, PodwireError};
use crate::transport::{ExchangeLimits, SessionOptions};

/// Upper bound on extra connect attempts; more only delays the error.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Smallest accepted response head budget.
const MIN_HEADER_BYTES: u64 = 1024;

/// Socket transport tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct TransportConfig {
    /// Seconds allowed for each request, connect included.
    #[default = 30]
    pub request_timeout_secs: u64,

    /// Seconds allowed for one connect attempt.
    #[default = 5]
    pub connect_timeout_secs: u64,

    /// Largest accepted response head in bytes.
    #[default = 65_536]
    pub max_header_bytes: u64,

    /// Largest response body buffered in memory, in bytes.
    #[default = 67_108_864]
    pub max_body_bytes: u64,

    /// Extra connect attempts after the first fails.
    #[default = 1]
    pub reconnect_attempts: u32,
}

impl TransportConfig {
    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than zero"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(invalid("connect_timeout_secs", "must be greater than zero"));
        }
        if self.max_header_bytes < MIN_HEADER_BYTES {
            return Err(invalid(
                "max_header_bytes",
                format!("must be at least {MIN_HEADER_BYTES}"),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(invalid("max_body_bytes", "must be greater than zero"));
        }
        if self.reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            return Err(invalid(
                "reconnect_attempts",
                format!("must be at most {MAX_RECONNECT_ATTEMPTS}"),
            ));
        }
        Ok(())
    }

    /// Returns the per-request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the per-attempt connect bound.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Converts the settings into session tunables.
    ///
    /// Limits wider than the address space saturate.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            request_timeout: self.request_timeout(),
            connect_timeout: self.connect_timeout(),
            reconnect_attempts: self.reconnect_attempts,
            limits: ExchangeLimits {
                max_header_bytes: usize::try_from(self.max_header_bytes).unwrap_or(usize::MAX),
                max_body_bytes: usize::try_from(self.max_body_bytes).unwrap_or(usize::MAX),
            },
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `PODWIRE_CONFIG_PATH` environment variable
/// 2. `.podwire.toml` in the current working directory
/// 3. `.podwire.toml` in the home directory
/// 4. `~/.config/podwire/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "PODWIRE",
    post_merge_hook,
    discovery(
        app_name = "podwire",
        env_var = "PODWIRE_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".podwire.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The daemon socket, as `unix:///path` or an absolute path.
    pub engine_socket: Option<String>,

    /// The libpod API version prefix, such as `v5.0.0`.
    pub api_version: Option<String>,

    /// Socket transport tuning.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub transport: TransportConfig,
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Blank strings from env or files mean "not set".
        self.engine_socket = normalise(self.engine_socket.take());
        self.api_version = normalise(self.api_version.take());
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> PodwireError {
    ConfigError::InvalidValue {
        field: format!("transport.{field}"),
        reason: reason.into(),
    }
    .into()
}

/// Trims `value`, treating blank text as unset.
pub(super) fn normalise(value: Option<String>) -> Option<String> {
    value
        .map(|text| String::from(text.trim()))
        .filter(|text| !text.is_empty())
}
