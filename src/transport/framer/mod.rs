//! HTTP/1.1 framing over the daemon socket.
//!
//! Encoding turns a [`Request`] into request-line, header and body bytes.
//! Decoding is incremental and works on a byte buffer that the caller keeps
//! filling from the socket, so bodies never need to be buffered whole.
//!
//! Body framing is chosen from the headers in priority order:
//! `Transfer-Encoding: chunked`, then `Content-Length`, then read until the
//! connection closes (only when the caller announced that no further request
//! follows, or the daemon said it will close).

mod decode;

use bytes::{Bytes, BytesMut};
use http::Method;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};

pub use self::decode::{
    BodyDecoder, BodyFraming, Decoded, RequestHead, parse_request_head, parse_response_head,
    request_body_framing, response_body_framing,
};
use super::message::{Request, RequestBody};

/// `Host` value sent on every request; Unix sockets have no real host.
pub const HOST_PLACEHOLDER: &str = "localhost";

/// Terminating chunk of a chunked body with an empty trailer section.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Encode the request line and headers, including the framing headers
/// implied by the body kind.
///
/// Caller-supplied `Content-Length` and `Transfer-Encoding` headers are
/// dropped in favour of the framer's own.
#[must_use]
pub fn encode_head(request: &Request) -> BytesMut {
    let mut out = BytesMut::with_capacity(256);
    out.extend_from_slice(request.method().as_str().as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(request.path().as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");

    if !request.headers().contains_key(HOST) {
        push_header(&mut out, "Host", HOST_PLACEHOLDER.as_bytes());
    }

    for (name, value) in request.headers() {
        let framer_owned = *name == CONTENT_LENGTH
            || *name == TRANSFER_ENCODING
            || (request.closes_after() && *name == CONNECTION);
        if !framer_owned {
            push_header(&mut out, name.as_str(), value.as_bytes());
        }
    }

    match request.body() {
        RequestBody::Empty => {
            if expects_body(request.method()) {
                push_header(&mut out, "Content-Length", b"0");
            }
        }
        RequestBody::Bytes(bytes) => {
            push_header(&mut out, "Content-Length", bytes.len().to_string().as_bytes());
        }
        RequestBody::Stream(_) => push_header(&mut out, "Transfer-Encoding", b"chunked"),
    }

    if request.closes_after() {
        push_header(&mut out, "Connection", b"close");
    }

    out.extend_from_slice(b"\r\n");
    out
}

/// Encode the whole request when its body is already in memory.
///
/// Returns `None` for streaming bodies, which go out chunk by chunk.
#[must_use]
pub fn encode_buffered(request: &Request) -> Option<BytesMut> {
    let mut out = encode_head(request);
    match request.body() {
        RequestBody::Empty => Some(out),
        RequestBody::Bytes(bytes) => {
            out.extend_from_slice(bytes);
            Some(out)
        }
        RequestBody::Stream(_) => None,
    }
}

/// Encode one chunk of a chunked body.
///
/// An empty `data` would read as the terminating chunk, so callers skip
/// empty chunks and finish with [`LAST_CHUNK`].
#[must_use]
pub fn encode_chunk(data: &[u8]) -> Bytes {
    let size_line = format!("{:x}\r\n", data.len());
    let mut out = BytesMut::with_capacity(size_line.len() + data.len() + 2);
    out.extend_from_slice(size_line.as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out.freeze()
}

fn push_header(out: &mut BytesMut, name: &str, value: &[u8]) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

fn expects_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}
