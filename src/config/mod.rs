//! Configuration system for podwire.
//!
//! This module provides the configuration structures and CLI definitions for the
//! podwire binary and library. Configuration loading and precedence merging is
//! handled by the `ortho_config` crate. Precedence: CLI flags override
//! environment variables, which override configuration files, which override
//! defaults.
//!
//! The configuration file is expected at `~/.config/podwire/config.toml` by default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//! api_version = "v5.0.0"
//!
//! [transport]
//! request_timeout_secs = 30
//! connect_timeout_secs = 5
//! max_header_bytes = 65536
//! max_body_bytes = 67108864
//! reconnect_attempts = 1
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, DownArgs, LogsArgs, PlayArgs, PsArgs, PullArgs, RequestArgs};
pub use loader::{env_var_names, load_config};
pub use types::{AppConfig, TransportConfig};
