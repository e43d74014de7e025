//! HTTP/1.1 over a Unix domain socket, for talking to a Podman daemon.
//!
//! `podwire` speaks just enough HTTP/1.1 to drive the libpod REST API on
//! `podman.sock` without a general-purpose HTTP client. One persistent
//! connection is reused across requests, exchanges are serialised on it,
//! and a connection that failed mid-exchange is thrown away and lazily
//! replaced.
//!
//! # Modules
//!
//! - [`transport`]: socket channel, HTTP framing, request execution and sessions
//! - [`client`]: typed wrappers for libpod system, container and image endpoints
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`error`]: Semantic error types for the library

pub mod client;
pub mod config;
pub mod error;
pub mod transport;
