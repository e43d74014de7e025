//! Raw byte channel over a single daemon socket.
//!
//! Opening goes through the [`Connector`] trait so session behaviour can be
//! exercised against in-memory streams without a live daemon.

use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::deadline::{Deadline, bounded};
use crate::error::{Phase, TransportError};

/// A bidirectional byte stream to the daemon.
pub trait DaemonStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> DaemonStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Boxed daemon stream handed out by a [`Connector`].
pub type BoxedStream = Box<dyn DaemonStream>;

/// Boxed future type returned by [`Connector::connect`].
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BoxedStream, TransportError>> + Send + 'a>>;

/// Behaviour required to open a fresh stream to the daemon.
pub trait Connector: Send + Sync {
    /// The socket path this connector dials, used in diagnostics.
    fn endpoint(&self) -> Utf8PathBuf;

    /// Open a new stream.
    fn connect(&self) -> ConnectFuture<'_>;
}

/// Connects to a Unix domain socket on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixConnector {
    path: Utf8PathBuf,
}

impl UnixConnector {
    /// Creates a connector for the socket at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Connector for UnixConnector {
    fn endpoint(&self) -> Utf8PathBuf {
        self.path.clone()
    }

    #[cfg(unix)]
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(self.path.as_std_path())
                .await
                .map_err(|error| classify_connect_error(&error, &self.path))?;
            let boxed: BoxedStream = Box::new(stream);
            Ok(boxed)
        })
    }

    #[cfg(not(unix))]
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(async move {
            Err(TransportError::ConnectFailed {
                path: self.path.clone(),
                message: String::from("Unix domain sockets are not supported on this platform"),
            })
        })
    }
}

/// Map an OS-level connect failure onto the connect error family.
pub(crate) fn classify_connect_error(error: &io::Error, path: &Utf8Path) -> TransportError {
    match error.kind() {
        io::ErrorKind::NotFound => TransportError::SocketNotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => TransportError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => TransportError::ConnectFailed {
            path: path.to_path_buf(),
            message: error.to_string(),
        },
    }
}

/// One open socket to the daemon with deadline-bounded reads and writes.
///
/// Once closed, every read or write fails with an I/O error.
pub struct SocketChannel {
    stream: Option<BoxedStream>,
}

impl std::fmt::Debug for SocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketChannel")
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl SocketChannel {
    /// Open a channel through `connector`, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns a connect-family `TransportError` when the socket cannot be
    /// reached, or `TransportError::Timeout` in the connect phase.
    pub async fn open(
        connector: &dyn Connector,
        deadline: Option<Deadline>,
    ) -> Result<Self, TransportError> {
        let stream = bounded(deadline, Phase::Connect, connector.connect()).await??;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream.
    #[must_use]
    pub fn from_stream(stream: BoxedStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Returns true once [`Self::close`] has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream_mut(&mut self, phase: Phase) -> Result<&mut BoxedStream, TransportError> {
        self.stream.as_mut().ok_or_else(|| TransportError::Io {
            phase,
            message: String::from("channel is closed"),
        })
    }

    /// Write every byte of `bytes` and flush.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` or `TransportError::Timeout` in the write
    /// phase.
    pub async fn write_all(
        &mut self,
        bytes: &[u8],
        deadline: Option<Deadline>,
    ) -> Result<(), TransportError> {
        let stream = self.stream_mut(Phase::Write)?;
        bounded(deadline, Phase::Write, async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await?
        .map_err(|error| TransportError::io(Phase::Write, &error))
    }

    /// Read at most `limit` bytes. An empty result means end of stream.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` or `TransportError::Timeout` tagged with
    /// `phase`.
    pub async fn read_up_to(
        &mut self,
        limit: usize,
        deadline: Option<Deadline>,
        phase: Phase,
    ) -> Result<Bytes, TransportError> {
        let mut buffer = BytesMut::with_capacity(limit);
        self.read_into(&mut buffer, limit, deadline, phase).await?;
        Ok(buffer.freeze())
    }

    /// Append at most `limit` bytes to `buffer`, returning how many arrived.
    pub(crate) async fn read_into(
        &mut self,
        buffer: &mut BytesMut,
        limit: usize,
        deadline: Option<Deadline>,
        phase: Phase,
    ) -> Result<usize, TransportError> {
        let stream = self.stream_mut(phase)?;
        buffer.reserve(limit);
        bounded(deadline, phase, async {
            let mut limited = (&mut *stream).take(limit as u64);
            limited.read_buf(buffer).await
        })
        .await?
        .map_err(|error| TransportError::io(phase, &error))
    }

    /// Shut down and release the socket. Calling it again does nothing.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // The peer may already be gone; the socket is dropped either way.
            drop(stream.shutdown().await);
        }
    }
}
