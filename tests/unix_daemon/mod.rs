//! A scripted daemon listening on a real Unix domain socket.
//!
//! Each test gets its own socket inside a temporary directory. Requests are
//! parsed with the crate's own framer so tests can assert on what actually
//! crossed the socket.

#![allow(
    clippy::allow_attributes,
    dead_code,
    reason = "each test crate uses a different subset of these helpers"
)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use camino::{Utf8Path, Utf8PathBuf};
use podwire::transport::framer::{
    BodyDecoder, Decoded, parse_request_head, request_body_framing,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// What the daemon does with one request.
#[derive(Debug, Clone)]
pub enum Action {
    /// Write the bytes and wait for the next request.
    Respond(Vec<u8>),
    /// Write the bytes and close the connection.
    RespondAndClose(Vec<u8>),
    /// Close the connection without answering.
    Hangup,
    /// Keep the connection open and never answer.
    Silence,
}

/// One request as the daemon parsed it.
#[derive(Debug, Clone)]
pub struct Seen {
    /// Request method.
    pub method: String,
    /// Origin-form target, query included.
    pub target: String,
    /// Decoded body.
    pub body: Vec<u8>,
    /// Zero-based index of the connection it arrived on.
    pub connection: usize,
}

type Handler = Arc<dyn Fn(&Seen) -> Action + Send + Sync>;
type SeenLog = Arc<Mutex<Vec<Seen>>>;

/// A daemon bound to `podman.sock` in a temporary directory.
pub struct UnixDaemon {
    dir: TempDir,
    path: Utf8PathBuf,
    seen: SeenLog,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl UnixDaemon {
    /// Bind the socket and start accepting. Must run inside a Tokio runtime.
    pub fn start(handler: impl Fn(&Seen) -> Action + Send + Sync + 'static) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = Utf8PathBuf::try_from(dir.path().join("podman.sock"))
            .map_err(|e| io::Error::other(e.to_string()))?;
        let listener = UnixListener::bind(&path)?;
        let seen = SeenLog::default();
        let accepted = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::new(handler),
            Arc::clone(&seen),
            Arc::clone(&accepted),
        ));
        Ok(Self {
            dir,
            path,
            seen,
            accepted,
            task,
        })
    }

    /// Socket path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Socket as a `unix://` URI.
    pub fn uri(&self) -> String {
        format!("unix://{}", self.path)
    }

    /// A path in the same directory where nothing listens.
    pub fn missing_socket(&self) -> Utf8PathBuf {
        self.path.with_file_name("missing.sock")
    }

    /// Temporary directory holding the socket.
    pub fn dir(&self) -> &TempDir {
        &self.dir
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Requests received so far, in arrival order.
    pub fn seen(&self) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for UnixDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: UnixListener,
    handler: Handler,
    seen: SeenLog,
    accepted: Arc<AtomicUsize>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        let connection = accepted.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(
            stream,
            connection,
            Arc::clone(&handler),
            Arc::clone(&seen),
        ));
    }
}

async fn serve(
    mut stream: UnixStream,
    connection: usize,
    handler: Handler,
    seen: SeenLog,
) -> io::Result<()> {
    let mut buffer = BytesMut::new();
    while let Some(request) = read_request(&mut stream, &mut buffer, connection).await? {
        let action = handler(&request);
        seen.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        match action {
            Action::Respond(bytes) => stream.write_all(&bytes).await?,
            Action::RespondAndClose(bytes) => {
                stream.write_all(&bytes).await?;
                return stream.shutdown().await;
            }
            Action::Hangup => return Ok(()),
            Action::Silence => std::future::pending::<()>().await,
        }
    }
    Ok(())
}

async fn read_request(
    stream: &mut UnixStream,
    buffer: &mut BytesMut,
    connection: usize,
) -> io::Result<Option<Seen>> {
    let head = loop {
        if let Some(head) = parse_request_head(buffer, 64 * 1024).map_err(io::Error::other)? {
            break head;
        }
        if stream.read_buf(buffer).await? == 0 {
            return Ok(None);
        }
    };
    let framing = request_body_framing(&head.headers).map_err(io::Error::other)?;
    let mut decoder = BodyDecoder::new(framing, 64 * 1024);
    let mut body = Vec::new();
    loop {
        match decoder.decode(buffer).map_err(io::Error::other)? {
            Decoded::Data(data) => body.extend_from_slice(&data),
            Decoded::Done => break,
            Decoded::NeedMore => {
                if stream.read_buf(buffer).await? == 0 {
                    return Ok(None);
                }
            }
        }
    }
    Ok(Some(Seen {
        method: head.method.to_string(),
        target: head.target,
        body,
        connection,
    }))
}

/// A `Content-Length` response.
pub fn respond(status: &str, content_type: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

/// A JSON response.
pub fn json(status: &str, body: &str) -> Vec<u8> {
    respond(status, "application/json", body)
}

/// A plain-text response.
pub fn text(status: &str, body: &str) -> Vec<u8> {
    respond(status, "text/plain", body)
}

/// A `200 OK` chunked response with one chunk per part.
pub fn chunked(parts: &[&str]) -> Vec<u8> {
    let mut wire = String::from("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
    for part in parts {
        wire.push_str(&format!("{:x}\r\n{part}\r\n", part.len()));
    }
    wire.push_str("0\r\n\r\n");
    wire.into_bytes()
}
