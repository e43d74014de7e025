//! Session management over a single reusable daemon connection.
//!
//! A [`Session`] owns one logical connection to the daemon socket. Every
//! exchange takes an exclusive lease on it, so concurrent callers are
//! served one after another and never interleave bytes on the wire. The
//! lease discards the connection on every exit path that did not finish
//! the exchange cleanly, including a dropped future.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use camino::Utf8PathBuf;
use futures_util::Stream;
use futures_util::stream;
use http::{HeaderMap, StatusCode};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{Connector, UnixConnector};
use super::connection::{Connection, ConnectionState};
use super::deadline::{Deadline, bounded};
use super::executor::{BodyReader, ExchangeLimits, RequestExecutor};
use super::message::{Request, Response, ResponseHead};
use crate::error::{Phase, TransportError};

/// Tunables for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Deadline applied to each buffered exchange, and to the head of each
    /// streaming exchange.
    pub request_timeout: Duration,
    /// Upper bound for a single connect attempt.
    pub connect_timeout: Duration,
    /// Extra connect attempts after the first one fails.
    pub reconnect_attempts: u32,
    /// Size limits for heads and buffered bodies.
    pub limits: ExchangeLimits,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            reconnect_attempts: 1,
            limits: ExchangeLimits::default(),
        }
    }
}

/// Exclusive use of the session's connection for one exchange.
///
/// Dropping a lease that was not released marks the connection broken. If
/// the session was closed while the lease was out, the connection is sealed
/// instead.
#[derive(Debug)]
struct ConnectionLease {
    guard: OwnedMutexGuard<Connection>,
    closed: Arc<AtomicBool>,
    armed: bool,
}

impl ConnectionLease {
    const fn new(guard: OwnedMutexGuard<Connection>, closed: Arc<AtomicBool>) -> Self {
        Self {
            guard,
            closed,
            armed: true,
        }
    }

    fn session_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn connection(&mut self) -> &mut Connection {
        &mut self.guard
    }

    /// Hand the connection back as the exchange left it.
    fn release(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.session_closed() {
            if !self.guard.is_terminated() {
                self.guard.seal();
                debug!(endpoint = %self.guard.endpoint(), "connection sealed after session close");
            }
        } else if self.armed {
            self.guard.mark_broken();
        }
    }
}

/// A shared handle to one daemon connection.
///
/// Clones share the connection.
#[derive(Clone)]
pub struct Session {
    connector: Arc<dyn Connector>,
    connection: Arc<Mutex<Connection>>,
    closed: Arc<AtomicBool>,
    executor: RequestExecutor,
    options: SessionOptions,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.connector.endpoint())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session that dials through `connector`.
    ///
    /// No socket is opened until the first request.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, options: SessionOptions) -> Self {
        let connection = Connection::new(connector.endpoint());
        Self {
            connector,
            connection: Arc::new(Mutex::new(connection)),
            closed: Arc::new(AtomicBool::new(false)),
            executor: RequestExecutor::new(options.limits),
            options,
        }
    }

    /// Create a session for the Unix socket at `path`.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>, options: SessionOptions) -> Self {
        Self::new(Arc::new(UnixConnector::new(path)), options)
    }

    /// Returns the socket path.
    #[must_use]
    pub fn endpoint(&self) -> Utf8PathBuf {
        self.connector.endpoint()
    }

    /// Returns the session tunables.
    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Send `request` within the configured request timeout and buffer the
    /// response.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SessionClosed` after [`Self::close`], a
    /// connect-family error when no connection could be opened, and any
    /// error raised by the exchange itself.
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        self.execute_with_deadline(request, Deadline::after(self.options.request_timeout))
            .await
    }

    /// Send `request` and buffer the response, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn execute_with_deadline(
        &self,
        request: Request,
        deadline: Deadline,
    ) -> Result<Response, TransportError> {
        let method = request.method().clone();
        let path = String::from(request.path());
        let mut lease = self.acquire(deadline).await?;
        let result = self
            .executor
            .execute(lease.connection(), request, deadline)
            .await;
        lease.release();
        let response = result?;
        debug!(%method, %path, status = response.status().as_u16(), "request completed");
        Ok(response)
    }

    /// Send `request` and return as soon as the response head is read.
    ///
    /// The returned [`StreamingResponse`] holds the connection until its
    /// body is drained, it is abandoned, or it is dropped.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn execute_streaming(
        &self,
        request: Request,
    ) -> Result<StreamingResponse, TransportError> {
        let deadline = Deadline::after(self.options.request_timeout);
        let method = request.method().clone();
        let path = String::from(request.path());
        let mut lease = self.acquire(deadline).await?;
        let result = self
            .executor
            .execute_streaming(lease.connection(), request, deadline)
            .await;
        let (head, reader) = match result {
            Ok(parts) => parts,
            Err(error) => {
                lease.release();
                return Err(error);
            }
        };
        debug!(%method, %path, status = head.status().as_u16(), "streaming response started");
        let held = if reader.is_finished() {
            lease.release();
            None
        } else {
            Some(lease)
        };
        Ok(StreamingResponse {
            head,
            reader,
            executor: self.executor,
            lease: held,
        })
    }

    /// Returns the connection state, waiting for any exchange in flight.
    pub async fn state(&self) -> ConnectionState {
        self.settled().await.state()
    }

    /// When a request last completed, waiting for any exchange in flight.
    pub async fn last_activity(&self) -> Option<Instant> {
        self.settled().await.last_activity()
    }

    /// Returns true once [`Self::close`] has been called on any clone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the session. Every later request fails with
    /// `TransportError::SessionClosed`.
    ///
    /// Never waits for an exchange in flight: a streaming response that
    /// holds the connection fails its next read with `SessionClosed`, and
    /// the socket is dropped when that response lets go of it.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let Ok(mut connection) = self.connection.try_lock() else {
            debug!(
                endpoint = %self.connector.endpoint(),
                "session closed; connection is released by the exchange in flight"
            );
            return;
        };
        if !connection.is_terminated() {
            connection.terminate().await;
            debug!(endpoint = %connection.endpoint(), "session closed");
        }
    }

    /// Lock the connection, sealing it first if the session was closed
    /// while it was busy.
    async fn settled(&self) -> MutexGuard<'_, Connection> {
        let mut connection = self.connection.lock().await;
        if self.is_closed() && !connection.is_terminated() {
            connection.seal();
        }
        connection
    }

    async fn acquire(&self, deadline: Deadline) -> Result<ConnectionLease, TransportError> {
        if self.is_closed() {
            return Err(TransportError::SessionClosed);
        }
        if deadline.is_expired() {
            return Err(TransportError::Timeout {
                phase: Phase::Connect,
            });
        }
        let guard = bounded(
            Some(deadline),
            Phase::Connect,
            Arc::clone(&self.connection).lock_owned(),
        )
        .await?;
        let mut lease = ConnectionLease::new(guard, Arc::clone(&self.closed));
        if lease.session_closed() {
            lease.release();
            return Err(TransportError::SessionClosed);
        }
        if !lease.connection().is_usable() {
            let outcome = self.reconnect(lease.connection(), deadline).await;
            if let Err(error) = outcome {
                lease.release();
                return Err(error);
            }
        }
        Ok(lease)
    }

    async fn reconnect(
        &self,
        connection: &mut Connection,
        deadline: Deadline,
    ) -> Result<(), TransportError> {
        let attempts = self.options.reconnect_attempts.saturating_add(1);
        let reconnecting = connection.state() == ConnectionState::Broken;
        let mut attempt = 1;
        loop {
            let bound = deadline.min_after(self.options.connect_timeout);
            match connection.open(self.connector.as_ref(), Some(bound)).await {
                Ok(()) => {
                    if reconnecting || attempt > 1 {
                        info!(endpoint = %connection.endpoint(), attempt, "reconnected to daemon");
                    }
                    return Ok(());
                }
                Err(error)
                    if attempt < attempts && error.is_retry_safe() && !deadline.is_expired() =>
                {
                    warn!(
                        endpoint = %connection.endpoint(),
                        attempt,
                        %error,
                        "connect attempt failed; retrying"
                    );
                    attempt += 1;
                }
                Err(error) => {
                    warn!(
                        endpoint = %connection.endpoint(),
                        attempt,
                        %error,
                        "giving up connecting"
                    );
                    return Err(error);
                }
            }
        }
    }
}

/// A response whose body is read lazily from the connection.
///
/// The session's connection stays reserved until the body is drained.
/// Dropping the response early discards the connection, as does
/// [`Self::abandon`].
#[derive(Debug)]
pub struct StreamingResponse {
    head: ResponseHead,
    reader: BodyReader,
    executor: RequestExecutor,
    lease: Option<ConnectionLease>,
}

impl StreamingResponse {
    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.head.status()
    }

    /// Returns the response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// Returns the status line and headers.
    #[must_use]
    pub const fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Returns true once the whole body has been read.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.reader.is_finished()
    }

    /// Read the next body chunk; `None` once the body is complete.
    ///
    /// # Errors
    ///
    /// Returns a read-body `TransportError`, or `SessionClosed` once the
    /// session has been closed; the connection is then discarded and later
    /// calls return `None`.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        let Some(lease) = self.lease.as_mut() else {
            return Ok(None);
        };
        if lease.session_closed() {
            self.lease = None;
            return Err(TransportError::SessionClosed);
        }
        let result = self
            .executor
            .next_body_chunk(lease.connection(), &mut self.reader, None)
            .await;
        if self.reader.is_finished()
            && let Some(done) = self.lease.take()
        {
            done.release();
        }
        result
    }

    /// Read the rest of the body into memory, up to the session's
    /// `max_body_bytes`.
    ///
    /// # Errors
    ///
    /// Returns a read-body `TransportError::Protocol` when the body
    /// outgrows the limit, discarding the connection. Otherwise see
    /// [`Self::next_chunk`].
    pub async fn read_to_end(mut self) -> Result<Bytes, TransportError> {
        let limit = self.executor.limits().max_body_bytes;
        let mut body = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            if body.len().saturating_add(chunk.len()) > limit {
                let error = self.executor.oversized_body();
                self.abandon();
                return Err(error);
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Stop reading and discard the connection.
    pub fn abandon(mut self) {
        if let Some(lease) = self.lease.take() {
            debug!("streaming response abandoned");
            drop(lease);
        }
    }

    /// Turn the body into a [`Stream`] of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, TransportError>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut response = state?;
            match response.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                Ok(None) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }
}
