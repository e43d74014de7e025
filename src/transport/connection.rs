//! The session's single logical connection and its lifecycle state.

use bytes::BytesMut;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::channel::{Connector, SocketChannel};
use super::deadline::Deadline;
use crate::error::TransportError;

/// Lifecycle of the socket behind a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket is held; the next request opens one.
    Closed,
    /// A socket is being opened.
    Connecting,
    /// A socket is open and idle between requests.
    Open,
    /// The last exchange failed and the socket was discarded.
    Broken,
}

/// One reusable connection with the bytes read past the last response.
#[derive(Debug)]
pub struct Connection {
    endpoint: Utf8PathBuf,
    state: ConnectionState,
    channel: Option<SocketChannel>,
    read_buffer: BytesMut,
    last_activity: Option<Instant>,
    terminated: bool,
}

impl Connection {
    /// Create a closed connection for `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<Utf8PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: ConnectionState::Closed,
            channel: None,
            read_buffer: BytesMut::new(),
            last_activity: None,
            terminated: false,
        }
    }

    /// Wrap an already-open channel.
    #[must_use]
    pub fn with_channel(endpoint: impl Into<Utf8PathBuf>, channel: SocketChannel) -> Self {
        let mut connection = Self::new(endpoint);
        connection.channel = Some(channel);
        connection.state = ConnectionState::Open;
        connection
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the socket path.
    #[must_use]
    pub fn endpoint(&self) -> &Utf8Path {
        &self.endpoint
    }

    /// When a request last completed on this connection.
    #[must_use]
    pub const fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Returns true once [`Self::terminate`] has run.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Returns true when a request can be written without reconnecting.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.state, ConnectionState::Open) && self.channel.is_some()
    }

    /// Open a fresh socket through `connector`.
    ///
    /// # Errors
    ///
    /// Returns the connect failure; the state becomes `Broken`.
    pub async fn open(
        &mut self,
        connector: &dyn Connector,
        deadline: Option<Deadline>,
    ) -> Result<(), TransportError> {
        self.channel = None;
        self.read_buffer.clear();
        self.state = ConnectionState::Connecting;
        debug!(endpoint = %self.endpoint, "connecting to daemon socket");
        match SocketChannel::open(connector, deadline).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = ConnectionState::Open;
                Ok(())
            }
            Err(error) => {
                self.state = ConnectionState::Broken;
                Err(error)
            }
        }
    }

    /// Record a completed exchange.
    pub fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    /// Discard the socket after a failed exchange.
    pub fn mark_broken(&mut self) {
        if self.channel.take().is_some() {
            warn!(endpoint = %self.endpoint, "discarding daemon connection after failed exchange");
        }
        self.read_buffer.clear();
        self.state = ConnectionState::Broken;
    }

    /// Drop the socket after an exchange that ended the connection cleanly.
    pub fn retire(&mut self) {
        self.channel = None;
        self.read_buffer.clear();
        self.state = ConnectionState::Closed;
    }

    /// Close the socket for good. Later requests are refused.
    pub async fn terminate(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.seal();
    }

    /// Drop the socket without a shutdown handshake and refuse later
    /// requests.
    pub fn seal(&mut self) {
        self.channel = None;
        self.read_buffer.clear();
        self.state = ConnectionState::Closed;
        self.terminated = true;
    }

    /// Drop buffered bytes that belong to no response, returning how many
    /// there were.
    pub(crate) fn discard_read_ahead(&mut self) -> usize {
        let stray = self.read_buffer.len();
        self.read_buffer.clear();
        stray
    }

    /// Borrow the open channel together with the read-ahead buffer.
    pub(crate) fn io_parts(&mut self) -> Option<(&mut SocketChannel, &mut BytesMut)> {
        let channel = self.channel.as_mut()?;
        Some((channel, &mut self.read_buffer))
    }
}
