//! Semantic error types for the podwire library.
//!
//! This module defines the error hierarchy for podwire, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect, retry, or map to a user-facing message, while
//! reserving opaque errors (`eyre::Report`) for the application boundary.

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly named configuration file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: Utf8PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// The stage of a request/response exchange in which a transport error
/// occurred.
///
/// Everything in [`Phase::Connect`] happens before the first request byte is
/// written, so failures there are safe to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Establishing the connection, before any request byte is written.
    Connect,
    /// Writing the request head or body.
    Write,
    /// Reading the status line and response headers.
    ReadHeaders,
    /// Reading the response body.
    ReadBody,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::Write => "write",
            Self::ReadHeaders => "read-headers",
            Self::ReadBody => "read-body",
        };
        f.write_str(label)
    }
}

/// Errors raised by the socket transport and session layer.
///
/// Every variant except the connect family implies the connection was
/// discarded.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The daemon socket does not exist.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: Utf8PathBuf,
    },

    /// The daemon socket exists but may not be opened by this process.
    #[error("permission denied accessing container engine socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: Utf8PathBuf,
    },

    /// The socket could not be connected for another reason.
    #[error("failed to connect to container engine at {path}: {message}")]
    ConnectFailed {
        /// The path to the socket.
        path: Utf8PathBuf,
        /// A description of the connection failure.
        message: String,
    },

    /// The request was rejected before anything was sent.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Why the request cannot be framed.
        message: String,
    },

    /// A read or write failed mid-exchange.
    #[error("I/O error during {phase}: {message}")]
    Io {
        /// The exchange phase that failed.
        phase: Phase,
        /// A description of the I/O failure.
        message: String,
    },

    /// The deadline passed before the exchange completed.
    #[error("deadline exceeded during {phase}")]
    Timeout {
        /// The exchange phase that was in progress.
        phase: Phase,
    },

    /// The byte stream is not valid HTTP/1.1 framing.
    #[error("protocol error during {phase}: {message}")]
    Protocol {
        /// The exchange phase that failed.
        phase: Phase,
        /// A description of the framing violation.
        message: String,
    },

    /// The stream ended before the response was complete.
    #[error("truncated response during {phase}: {message}")]
    TruncatedResponse {
        /// The exchange phase that was in progress.
        phase: Phase,
        /// What was still expected.
        message: String,
    },

    /// The session was explicitly closed.
    #[error("session has been closed")]
    SessionClosed,
}

impl TransportError {
    /// Returns the exchange phase the error belongs to.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::SocketNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::ConnectFailed { .. }
            | Self::InvalidRequest { .. }
            | Self::SessionClosed => Phase::Connect,
            Self::Io { phase, .. }
            | Self::Timeout { phase }
            | Self::Protocol { phase, .. }
            | Self::TruncatedResponse { phase, .. } => *phase,
        }
    }

    /// Returns true for failures to reach the daemon socket.
    #[must_use]
    pub const fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Self::SocketNotFound { .. } | Self::PermissionDenied { .. } | Self::ConnectFailed { .. }
        )
    }

    /// Returns true when no request byte reached the daemon.
    ///
    /// Anything that failed after the first byte was written may already
    /// have had a side effect on the daemon.
    #[must_use]
    pub const fn is_retry_safe(&self) -> bool {
        match self {
            Self::InvalidRequest { .. } | Self::SessionClosed => false,
            _ => matches!(self.phase(), Phase::Connect),
        }
    }

    pub(crate) fn io(phase: Phase, error: &std::io::Error) -> Self {
        Self::Io {
            phase,
            message: error.to_string(),
        }
    }

    pub(crate) fn protocol(phase: Phase, message: impl Into<String>) -> Self {
        Self::Protocol {
            phase,
            message: message.into(),
        }
    }

    pub(crate) fn truncated(phase: Phase, message: impl Into<String>) -> Self {
        Self::TruncatedResponse {
            phase,
            message: message.into(),
        }
    }
}

/// Errors raised by the typed resource client on top of the transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The daemon answered with a non-success status.
    #[error("container engine returned {status}: {message}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The daemon's error message, or the raw body.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("failed to decode container engine response: {message}")]
    Decode {
        /// A description of the decode failure.
        message: String,
    },

    /// The daemon reported a failure inside a streamed response.
    #[error("container engine reported an error: {message}")]
    Stream {
        /// The error text from the stream.
        message: String,
    },

    /// A request body could not be encoded.
    #[error("failed to encode request body: {message}")]
    Encode {
        /// A description of the encode failure.
        message: String,
    },
}

/// Top-level error type for podwire.
///
/// At the application boundary (main.rs) these errors are converted to
/// `eyre::Report` for human-readable error reporting.
#[derive(Debug, Error)]
pub enum PodwireError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the socket transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The daemon API rejected or garbled a request.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// A specialised `Result` type for podwire operations.
pub type Result<T> = std::result::Result<T, PodwireError>;
