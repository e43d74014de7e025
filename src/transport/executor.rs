//! One request/response exchange on an open connection.
//!
//! The executor writes the request, reads the response head (skipping
//! interim `1xx` responses) and decodes the body. Any failure after the
//! socket was opened leaves the connection `Broken`, so a half-read
//! response can never be mistaken for the next one.

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::StatusCode;
use tracing::{debug, warn};

use super::channel::SocketChannel;
use super::connection::Connection;
use super::deadline::{Deadline, bounded};
use super::framer::{
    BodyDecoder, BodyFraming, Decoded, LAST_CHUNK, encode_buffered, encode_chunk, encode_head,
    parse_response_head, response_body_framing,
};
use super::message::{Request, RequestBody, Response, ResponseHead};
use crate::error::{Phase, TransportError};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 8 * 1024;

/// Size limits applied to every exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeLimits {
    /// Largest accepted response head, status line included.
    pub max_header_bytes: usize,
    /// Largest body accepted into a buffered [`Response`].
    pub max_body_bytes: usize,
}

impl Default for ExchangeLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Body of a response whose head has been read.
#[derive(Debug)]
pub struct BodyReader {
    decoder: BodyDecoder,
    close_when_done: bool,
    finished: bool,
}

impl BodyReader {
    /// Returns true once the body was fully read or reading failed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns true when the connection cannot be reused after this body.
    #[must_use]
    pub const fn closes_connection(&self) -> bool {
        self.close_when_done
    }
}

/// Performs exchanges on a [`Connection`] the caller has exclusive use of.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestExecutor {
    limits: ExchangeLimits,
}

impl RequestExecutor {
    /// Create an executor enforcing `limits`.
    #[must_use]
    pub const fn new(limits: ExchangeLimits) -> Self {
        Self { limits }
    }

    /// The error for a body that would outgrow `max_body_bytes` in memory.
    pub(crate) fn oversized_body(&self) -> TransportError {
        TransportError::protocol(
            Phase::ReadBody,
            format!(
                "response body exceeds the {}-byte limit",
                self.limits.max_body_bytes
            ),
        )
    }

    /// Returns the limits in force.
    #[must_use]
    pub const fn limits(&self) -> ExchangeLimits {
        self.limits
    }

    /// Send `request` and buffer the whole response.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Timeout` in the connect phase when `deadline`
    /// has already passed (nothing is written), `TransportError::Protocol`
    /// when the body exceeds the configured limit, and any error from
    /// writing or reading the exchange.
    pub async fn execute(
        &self,
        connection: &mut Connection,
        request: Request,
        deadline: Deadline,
    ) -> Result<Response, TransportError> {
        let (head, mut reader) = self
            .execute_streaming(connection, request, deadline)
            .await?;
        let mut body = BytesMut::new();
        while let Some(chunk) = self
            .next_body_chunk(connection, &mut reader, Some(deadline))
            .await?
        {
            if body.len().saturating_add(chunk.len()) > self.limits.max_body_bytes {
                connection.mark_broken();
                return Err(self.oversized_body());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Response::new(head, body.freeze()))
    }

    /// Send `request` and return once the final response head is read.
    ///
    /// The body is pulled afterwards with [`Self::next_body_chunk`]; until it
    /// is exhausted the connection carries no other request.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn execute_streaming(
        &self,
        connection: &mut Connection,
        request: Request,
        deadline: Deadline,
    ) -> Result<(ResponseHead, BodyReader), TransportError> {
        if deadline.is_expired() {
            return Err(TransportError::Timeout {
                phase: Phase::Connect,
            });
        }
        let stray = connection.discard_read_ahead();
        if stray > 0 {
            warn!(bytes = stray, "dropping unsolicited bytes before request");
        }

        let method = request.method().clone();
        let close_requested = request.closes_after();
        debug!(%method, path = request.path(), "sending request");

        let outcome = self
            .exchange_head(connection, request, deadline)
            .await
            .and_then(|head| {
                let framing = response_body_framing(&method, &head, close_requested)?;
                Ok((head, framing))
            });
        let (head, framing) = match outcome {
            Ok(parts) => parts,
            Err(error) => {
                connection.mark_broken();
                return Err(error);
            }
        };

        debug!(status = head.status().as_u16(), ?framing, "response head received");
        let close_when_done = close_requested
            || head.closes_connection()
            || matches!(framing, BodyFraming::UntilClose);
        let mut reader = BodyReader {
            decoder: BodyDecoder::new(framing, self.limits.max_header_bytes),
            close_when_done,
            finished: false,
        };
        if reader.decoder.is_done() {
            Self::finish(connection, &mut reader);
        }
        Ok((head, reader))
    }

    /// Pull the next piece of a response body.
    ///
    /// Returns `Ok(None)` once the body is complete, after which the
    /// connection is idle again (or closed if the response ended it).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Timeout`, `TransportError::Io`,
    /// `TransportError::Protocol` or `TransportError::TruncatedResponse` in
    /// the read-body phase; the connection is then `Broken`.
    pub async fn next_body_chunk(
        &self,
        connection: &mut Connection,
        reader: &mut BodyReader,
        deadline: Option<Deadline>,
    ) -> Result<Option<Bytes>, TransportError> {
        if reader.finished {
            return Ok(None);
        }
        match Self::read_body_step(connection, reader, deadline).await {
            Ok(Some(data)) => Ok(Some(data)),
            Ok(None) => {
                Self::finish(connection, reader);
                Ok(None)
            }
            Err(error) => {
                reader.finished = true;
                connection.mark_broken();
                Err(error)
            }
        }
    }

    async fn exchange_head(
        &self,
        connection: &mut Connection,
        request: Request,
        deadline: Deadline,
    ) -> Result<ResponseHead, TransportError> {
        let (channel, buffer) = connection.io_parts().ok_or_else(|| TransportError::Io {
            phase: Phase::Write,
            message: String::from("connection is not open"),
        })?;
        write_request(channel, request, deadline).await?;
        loop {
            let head = self.read_head(channel, buffer, deadline).await?;
            let status = head.status();
            if status == StatusCode::SWITCHING_PROTOCOLS {
                return Err(TransportError::protocol(
                    Phase::ReadHeaders,
                    "protocol upgrades are not supported",
                ));
            }
            if status.is_informational() {
                debug!(status = status.as_u16(), "skipping interim response");
                continue;
            }
            return Ok(head);
        }
    }

    async fn read_head(
        &self,
        channel: &mut SocketChannel,
        buffer: &mut BytesMut,
        deadline: Deadline,
    ) -> Result<ResponseHead, TransportError> {
        loop {
            if let Some(head) = parse_response_head(buffer, self.limits.max_header_bytes)? {
                return Ok(head);
            }
            let read = channel
                .read_into(buffer, READ_CHUNK, Some(deadline), Phase::ReadHeaders)
                .await?;
            if read == 0 {
                let detail = if buffer.is_empty() {
                    "connection closed before the response head"
                } else {
                    "connection closed inside the response head"
                };
                return Err(TransportError::truncated(Phase::ReadHeaders, detail));
            }
        }
    }

    async fn read_body_step(
        connection: &mut Connection,
        reader: &mut BodyReader,
        deadline: Option<Deadline>,
    ) -> Result<Option<Bytes>, TransportError> {
        let (channel, buffer) = connection.io_parts().ok_or_else(|| TransportError::Io {
            phase: Phase::ReadBody,
            message: String::from("connection is not open"),
        })?;
        loop {
            match reader.decoder.decode(buffer)? {
                Decoded::Data(data) => return Ok(Some(data)),
                Decoded::Done => return Ok(None),
                Decoded::NeedMore => {
                    let read = channel
                        .read_into(buffer, READ_CHUNK, deadline, Phase::ReadBody)
                        .await?;
                    if read == 0 {
                        reader.decoder.finish_at_eof()?;
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn finish(connection: &mut Connection, reader: &mut BodyReader) {
        reader.finished = true;
        connection.touch();
        if reader.close_when_done {
            debug!("response ended the connection");
            connection.retire();
            return;
        }
        let stray = connection.discard_read_ahead();
        if stray > 0 {
            warn!(bytes = stray, "dropping bytes after complete response");
        }
    }
}

async fn write_request(
    channel: &mut SocketChannel,
    request: Request,
    deadline: Deadline,
) -> Result<(), TransportError> {
    if let Some(bytes) = encode_buffered(&request) {
        return channel.write_all(&bytes, Some(deadline)).await;
    }
    channel.write_all(&encode_head(&request), Some(deadline)).await?;
    let RequestBody::Stream(mut body) = request.into_body() else {
        return Ok(());
    };
    while let Some(item) = bounded(Some(deadline), Phase::Write, body.next()).await? {
        let data = item.map_err(|error| TransportError::io(Phase::Write, &error))?;
        if data.is_empty() {
            continue;
        }
        channel
            .write_all(&encode_chunk(&data), Some(deadline))
            .await?;
    }
    channel.write_all(LAST_CHUNK, Some(deadline)).await
}
