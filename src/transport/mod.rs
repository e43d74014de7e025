//! HTTP/1.1 transport to the container daemon over a Unix domain socket.
//!
//! The layers build on each other:
//!
//! - [`SocketChannel`]: raw, deadline-bounded bytes over one socket
//! - [`framer`]: request encoding and incremental response decoding
//! - [`RequestExecutor`]: one request/response exchange on a connection
//! - [`Session`]: the reusable connection, leasing and reconnection
//!
//! Endpoint discovery lives in [`SocketResolver`].

mod channel;
mod connection;
mod deadline;
mod endpoint;
mod executor;
pub mod framer;
mod message;
mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use self::channel::{
    BoxedStream, ConnectFuture, Connector, DaemonStream, SocketChannel, UnixConnector,
};
pub use self::connection::{Connection, ConnectionState};
pub use self::deadline::Deadline;
pub use self::endpoint::{SYSTEM_SOCKET, SocketResolver, parse_socket_uri};
pub use self::executor::{BodyReader, ExchangeLimits, RequestExecutor};
pub use self::message::{BodyStream, Request, RequestBody, Response, ResponseHead};
pub use self::session::{Session, SessionOptions, StreamingResponse};
