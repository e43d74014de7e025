//! In-memory daemon used by transport and client tests.
//!
//! Each accepted dial gets its own duplex pipe and a script of replies; the
//! daemon parses every request it receives so tests can assert on the bytes
//! that actually went over the wire.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use camino::Utf8PathBuf;
use http::{HeaderMap, Method};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use super::channel::{BoxedStream, ConnectFuture, Connector};
use super::framer::{BodyDecoder, Decoded, parse_request_head, request_body_framing};
use crate::error::TransportError;

/// Socket path reported by the fake daemon.
pub(crate) const FAKE_SOCKET: &str = "/run/podman/podman.sock";

/// A request as the daemon parsed it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub connection: usize,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// What the daemon does after reading one request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Write these bytes and wait for the next request.
    Send(Vec<u8>),
    /// Write these bytes in pieces, pausing between them.
    Trickle(Vec<Vec<u8>>, Duration),
    /// Write these bytes and close the socket.
    SendAndClose(Vec<u8>),
    /// Close the socket without answering.
    Hangup,
    /// Never answer, keeping the socket open.
    Stall,
}

/// How the daemon treats one dial.
#[derive(Debug, Clone)]
pub(crate) enum Dial {
    /// Accept and follow the reply script.
    Accept(Vec<Reply>),
    /// Refuse the connection.
    Refuse,
}

/// Build a complete `Content-Length` response.
pub(crate) fn response(status: &str, content_type: Option<&str>, body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\n").into_bytes();
    if let Some(kind) = content_type {
        out.extend_from_slice(format!("Content-Type: {kind}\r\n").as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Build a JSON response.
pub(crate) fn json_response(status: &str, body: &str) -> Vec<u8> {
    response(status, Some("application/json"), body.as_bytes())
}

/// A scripted daemon that hands out in-memory connections.
#[derive(Debug, Default)]
pub(crate) struct FakeDaemon {
    dials: Mutex<VecDeque<Dial>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    connects: AtomicUsize,
}

impl FakeDaemon {
    pub(crate) fn new(dials: impl IntoIterator<Item = Dial>) -> Self {
        Self {
            dials: Mutex::new(dials.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A daemon that accepts one connection and answers with `replies`.
    pub(crate) fn single(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self::new([Dial::Accept(replies.into_iter().collect())])
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }
}

impl Connector for FakeDaemon {
    fn endpoint(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(FAKE_SOCKET)
    }

    fn connect(&self) -> ConnectFuture<'_> {
        let dial = self.dials.lock().expect("dial script poisoned").pop_front();
        let connection = self.connects.fetch_add(1, Ordering::SeqCst);
        let requests = Arc::clone(&self.requests);
        Box::pin(async move {
            match dial {
                Some(Dial::Accept(replies)) => {
                    let (client, server) = duplex(64 * 1024);
                    tokio::spawn(serve(server, replies, requests, connection));
                    let stream: BoxedStream = Box::new(client);
                    Ok(stream)
                }
                Some(Dial::Refuse) | None => Err(TransportError::ConnectFailed {
                    path: Utf8PathBuf::from(FAKE_SOCKET),
                    message: String::from("connection refused"),
                }),
            }
        })
    }
}

async fn serve(
    mut server: DuplexStream,
    replies: Vec<Reply>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
    connection: usize,
) -> io::Result<()> {
    let mut buffer = BytesMut::new();
    for reply in replies {
        let Some(request) = read_request(&mut server, &mut buffer, connection).await? else {
            return Ok(());
        };
        log.lock().expect("request log poisoned").push(request);
        match reply {
            Reply::Send(bytes) => server.write_all(&bytes).await?,
            Reply::Trickle(pieces, pause) => {
                for piece in pieces {
                    server.write_all(&piece).await?;
                    tokio::time::sleep(pause).await;
                }
            }
            Reply::SendAndClose(bytes) => {
                server.write_all(&bytes).await?;
                return server.shutdown().await;
            }
            Reply::Hangup => return Ok(()),
            Reply::Stall => std::future::pending::<()>().await,
        }
    }
    // Keep the pipe open until the client hangs up.
    let mut sink = Vec::new();
    server.read_to_end(&mut sink).await.map(drop)
}

/// Read and parse one request; `None` when the client hung up first.
pub(crate) async fn read_request(
    stream: &mut DuplexStream,
    buffer: &mut BytesMut,
    connection: usize,
) -> io::Result<Option<RecordedRequest>> {
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
                    decoder.finish_at_eof().map_err(io::Error::other)?;
                    break;
                }
            }
        }
    }
    Ok(Some(RecordedRequest {
        method: head.method,
        target: head.target,
        headers: head.headers,
        body,
        connection,
    }))
}
