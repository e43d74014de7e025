//! Daemon socket endpoint resolution.
//!
//! The socket path comes from the first source that provides one:
//! explicit configuration, then the `PODMAN_HOST`, `DOCKER_HOST` and
//! `CONTAINER_HOST` environment variables, then the per-user Podman socket
//! under `XDG_RUNTIME_DIR`, then the system-wide Podman socket.

use camino::Utf8PathBuf;

use crate::error::ConfigError;

/// Environment variable names checked in fallback order after configuration.
const FALLBACK_ENV_VARS: &[&str] = &["PODMAN_HOST", "DOCKER_HOST", "CONTAINER_HOST"];

/// Variable naming the per-user runtime directory.
const RUNTIME_DIR_VAR: &str = "XDG_RUNTIME_DIR";

/// Socket location relative to the runtime directory.
const RUNTIME_SOCKET: &str = "podman/podman.sock";

/// System-wide socket used when nothing else is configured.
pub const SYSTEM_SOCKET: &str = "/run/podman/podman.sock";

/// The only URI scheme accepted for the daemon endpoint.
const UNIX_SCHEME: &str = "unix://";

/// Resolves the daemon socket from configuration and the environment.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use podwire::transport::SocketResolver;
///
/// let env = DefaultEnv::new();
/// let socket = SocketResolver::new(&env).resolve(None)?;
/// ```
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Returns the first non-empty fallback variable with its name.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<(&'static str, String)> {
        FALLBACK_ENV_VARS.iter().find_map(|name| {
            self.env
                .string(name)
                .filter(|value| !value.is_empty())
                .map(|value| (*name, value))
        })
    }

    /// Returns the default socket: the per-user Podman socket when
    /// `XDG_RUNTIME_DIR` is set, the system socket otherwise.
    #[must_use]
    pub fn default_socket(&self) -> Utf8PathBuf {
        self.env
            .string(RUNTIME_DIR_VAR)
            .filter(|dir| !dir.is_empty())
            .map_or_else(
                || Utf8PathBuf::from(SYSTEM_SOCKET),
                |dir| Utf8PathBuf::from(dir).join(RUNTIME_SOCKET),
            )
    }

    /// Resolve the socket path, preferring `config_socket` when non-empty.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the chosen value is not a
    /// Unix socket (`unix:///path` or an absolute path).
    pub fn resolve(&self, config_socket: Option<&str>) -> Result<Utf8PathBuf, ConfigError> {
        if let Some(socket) = config_socket.filter(|value| !value.is_empty()) {
            return parse_socket_uri(socket, "engine_socket");
        }
        match self.resolve_from_env() {
            Some((name, value)) => parse_socket_uri(&value, name),
            None => Ok(self.default_socket()),
        }
    }
}

/// Turn an endpoint string into a socket path.
///
/// Accepts `unix:///absolute/path` and bare absolute paths. `field` names
/// the setting the value came from and is used in the error.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for other schemes and for relative
/// or empty paths.
pub fn parse_socket_uri(value: &str, field: &str) -> Result<Utf8PathBuf, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: String::from(field),
        reason,
    };
    let path = if let Some(rest) = value.strip_prefix(UNIX_SCHEME) {
        rest
    } else if let Some((scheme, _)) = value.split_once("://") {
        return Err(invalid(format!(
            "unsupported socket scheme '{scheme}'; only unix:// endpoints are supported"
        )));
    } else {
        value
    };
    if !path.starts_with('/') {
        return Err(invalid(format!(
            "socket path must be absolute, got {value:?}"
        )));
    }
    Ok(Utf8PathBuf::from(path))
}
