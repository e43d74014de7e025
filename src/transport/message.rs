//! Request and response values exchanged with the daemon.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use http::header::{CONNECTION, HeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};

use crate::error::TransportError;

/// Lazy byte-chunk sequence used for streaming uploads.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// The body of an outgoing request.
pub enum RequestBody {
    /// No body at all.
    Empty,
    /// A fully buffered body, sent with `Content-Length`.
    Bytes(Bytes),
    /// A lazily produced body, sent with `Transfer-Encoding: chunked`.
    Stream(BodyStream),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A single HTTP/1.1 request for the daemon.
///
/// Requests are built up front and consumed when submitted.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: RequestBody,
    close_after: bool,
}

impl Request {
    /// Create a request for `path` (origin form, including any query).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidRequest` when the path does not start
    /// with `/` or contains whitespace or control characters.
    pub fn new(method: Method, path: impl Into<String>) -> Result<Self, TransportError> {
        let target = path.into();
        validate_target(&target)?;
        Ok(Self {
            method,
            path: target,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            close_after: false,
        })
    }

    /// Shorthand for a `GET` request.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn get(path: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a `POST` request.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn post(path: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(Method::POST, path)
    }

    /// Shorthand for a `DELETE` request.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn delete(path: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(Method::DELETE, path)
    }

    /// Add a header. Repeated names are kept as separate values.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach a buffered body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Attach a lazily produced body.
    #[must_use]
    pub fn with_streaming_body<S>(mut self, body: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.body = RequestBody::Stream(Box::pin(body));
        self
    }

    /// Announce that no further request follows on this connection.
    ///
    /// This is what permits a response body framed by connection close.
    #[must_use]
    pub const fn close_after(mut self) -> Self {
        self.close_after = true;
        self
    }

    /// Return the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Return the request target.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Return the caller-supplied headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Return the body.
    #[must_use]
    pub const fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Return whether the connection ends after this request.
    #[must_use]
    pub const fn closes_after(&self) -> bool {
        self.close_after
    }

    pub(crate) fn into_body(self) -> RequestBody {
        self.body
    }
}

fn validate_target(target: &str) -> Result<(), TransportError> {
    if !target.starts_with('/') {
        return Err(TransportError::InvalidRequest {
            message: format!("request path must start with '/': {target:?}"),
        });
    }
    if target
        .bytes()
        .any(|byte| byte.is_ascii_whitespace() || byte.is_ascii_control())
    {
        return Err(TransportError::InvalidRequest {
            message: format!("request path contains whitespace or control characters: {target:?}"),
        });
    }
    Ok(())
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) reason: String,
    pub(crate) headers: HeaderMap,
}

impl ResponseHead {
    /// Return the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Return the reason phrase as sent by the daemon.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Return the protocol version of the status line.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Return the response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns true when the daemon will close the connection after this
    /// response.
    #[must_use]
    pub fn closes_connection(&self) -> bool {
        let tokens = connection_tokens(&self.headers);
        if tokens.iter().any(|token| token == "close") {
            return true;
        }
        self.version == Version::HTTP_10 && !tokens.iter().any(|token| token == "keep-alive")
    }
}

fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .collect()
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    head: ResponseHead,
    body: Bytes,
}

impl Response {
    pub(crate) const fn new(head: ResponseHead, body: Bytes) -> Self {
        Self { head, body }
    }

    /// Return the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.head.status
    }

    /// Return the response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Return the status line and headers.
    #[must_use]
    pub const fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Return the body bytes.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response, keeping only the body.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Return the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
