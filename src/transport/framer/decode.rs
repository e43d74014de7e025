//! Incremental decoding of message heads and bodies.

use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HeaderName, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};

use crate::error::{Phase, TransportError};
use crate::transport::message::ResponseHead;

/// Longest chunk-size line accepted, extensions included.
const MAX_CHUNK_SIZE_LINE: usize = 1024;

/// How the end of a message body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// There is no body.
    Empty,
    /// Exactly this many bytes follow the head.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// The body runs until the peer closes the connection.
    UntilClose,
}

/// Request line and headers, as seen by the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// The request method.
    pub method: Method,
    /// The request target.
    pub target: String,
    /// The request headers.
    pub headers: HeaderMap,
}

/// Try to parse a response head from the front of `buffer`.
///
/// On success the head bytes are removed from `buffer`; anything after
/// them is body. Returns `Ok(None)` while the head is still incomplete.
///
/// # Errors
///
/// Returns `TransportError::Protocol` when the head is malformed or grows
/// beyond `max_header_bytes`.
pub fn parse_response_head(
    buffer: &mut BytesMut,
    max_header_bytes: usize,
) -> Result<Option<ResponseHead>, TransportError> {
    let Some(head) = split_head(buffer, max_header_bytes, Phase::ReadHeaders)? else {
        return Ok(None);
    };
    let mut lines = head_lines(&head);
    let status_line = lines
        .next()
        .ok_or_else(|| protocol_head("missing status line"))?;
    let (version, status, reason) = parse_status_line(status_line)?;
    let headers = parse_header_lines(lines, Phase::ReadHeaders)?;
    Ok(Some(ResponseHead {
        version,
        status,
        reason,
        headers,
    }))
}

/// Try to parse a request head from the front of `buffer`.
///
/// Behaves like [`parse_response_head`] for the receiving side of a
/// connection.
///
/// # Errors
///
/// Returns `TransportError::Protocol` when the head is malformed or grows
/// beyond `max_header_bytes`.
pub fn parse_request_head(
    buffer: &mut BytesMut,
    max_header_bytes: usize,
) -> Result<Option<RequestHead>, TransportError> {
    let Some(head) = split_head(buffer, max_header_bytes, Phase::ReadHeaders)? else {
        return Ok(None);
    };
    let mut lines = head_lines(&head);
    let request_line = lines
        .next()
        .ok_or_else(|| protocol_head("missing request line"))?;
    let text = std::str::from_utf8(request_line)
        .map_err(|_| protocol_head("request line is not valid UTF-8"))?;
    let mut parts = text.split(' ');
    let (Some(method), Some(target), Some("HTTP/1.1" | "HTTP/1.0"), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(protocol_head(format!("malformed request line: {text:?}")));
    };
    let parsed_method = Method::from_bytes(method.as_bytes())
        .map_err(|_| protocol_head(format!("invalid method: {method:?}")))?;
    let headers = parse_header_lines(lines, Phase::ReadHeaders)?;
    Ok(Some(RequestHead {
        method: parsed_method,
        target: String::from(target),
        headers,
    }))
}

/// Decide how the body of a response is delimited.
///
/// `close_requested` records whether the request announced that the
/// connection ends after this exchange.
///
/// # Errors
///
/// Returns `TransportError::Protocol` for invalid or conflicting length
/// headers, and for a body with no length framing on a connection that is
/// meant to stay open.
pub fn response_body_framing(
    method: &Method,
    head: &ResponseHead,
    close_requested: bool,
) -> Result<BodyFraming, TransportError> {
    let status = head.status();
    if *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyFraming::Empty);
    }

    let may_read_to_close = close_requested || head.closes_connection();
    match transfer_coding(head.headers()) {
        TransferCoding::Chunked => return Ok(BodyFraming::Chunked),
        TransferCoding::Other if may_read_to_close => return Ok(BodyFraming::UntilClose),
        TransferCoding::Other => {
            return Err(protocol_head(
                "unsupported transfer coding on a persistent connection",
            ));
        }
        TransferCoding::Absent => {}
    }

    if let Some(length) = content_length(head.headers())? {
        return Ok(BodyFraming::Length(length));
    }

    if may_read_to_close {
        Ok(BodyFraming::UntilClose)
    } else {
        Err(protocol_head(
            "response has neither Content-Length nor chunked encoding on a persistent connection",
        ))
    }
}

/// Decide how the body of a request is delimited.
///
/// # Errors
///
/// Returns `TransportError::Protocol` for transfer codings other than
/// `chunked` and for invalid or conflicting `Content-Length` headers.
pub fn request_body_framing(headers: &HeaderMap) -> Result<BodyFraming, TransportError> {
    match transfer_coding(headers) {
        TransferCoding::Chunked => Ok(BodyFraming::Chunked),
        TransferCoding::Other => Err(protocol_head("unsupported request transfer coding")),
        TransferCoding::Absent => {
            Ok(content_length(headers)?.map_or(BodyFraming::Empty, BodyFraming::Length))
        }
    }
}

/// Outcome of one [`BodyDecoder::decode`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A piece of body data.
    Data(Bytes),
    /// The buffer holds no complete unit; read more and call again.
    NeedMore,
    /// The body is complete.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers { consumed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Length { remaining: u64 },
    Chunked(ChunkState),
    UntilClose,
    Done,
}

/// Sans-IO body decoder.
///
/// Feed it the connection's read buffer; it consumes exactly the bytes that
/// belong to the body and leaves the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDecoder {
    state: DecodeState,
    max_trailer_bytes: usize,
}

impl BodyDecoder {
    /// Create a decoder for `framing`. Chunked trailers are bounded by
    /// `max_trailer_bytes`.
    #[must_use]
    pub const fn new(framing: BodyFraming, max_trailer_bytes: usize) -> Self {
        let state = match framing {
            BodyFraming::Empty | BodyFraming::Length(0) => DecodeState::Done,
            BodyFraming::Length(remaining) => DecodeState::Length { remaining },
            BodyFraming::Chunked => DecodeState::Chunked(ChunkState::Size),
            BodyFraming::UntilClose => DecodeState::UntilClose,
        };
        Self {
            state,
            max_trailer_bytes,
        }
    }

    /// Returns true once the whole body has been consumed.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.state, DecodeState::Done)
    }

    /// Returns true when the body ends only with the connection.
    #[must_use]
    pub const fn reads_until_close(&self) -> bool {
        matches!(self.state, DecodeState::UntilClose)
    }

    /// Consume body bytes from the front of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Protocol` for malformed chunk framing or an
    /// oversized trailer section.
    pub fn decode(&mut self, buffer: &mut BytesMut) -> Result<Decoded, TransportError> {
        loop {
            match self.state {
                DecodeState::Done => return Ok(Decoded::Done),
                DecodeState::Length { remaining } => {
                    let Some(data) = take_up_to(buffer, remaining) else {
                        return Ok(Decoded::NeedMore);
                    };
                    let left = remaining - data.len() as u64;
                    self.state = if left == 0 {
                        DecodeState::Done
                    } else {
                        DecodeState::Length { remaining: left }
                    };
                    return Ok(Decoded::Data(data));
                }
                DecodeState::UntilClose => {
                    if buffer.is_empty() {
                        return Ok(Decoded::NeedMore);
                    }
                    return Ok(Decoded::Data(buffer.split().freeze()));
                }
                DecodeState::Chunked(chunk) => {
                    if let Some(step) = self.decode_chunked(chunk, buffer)? {
                        return Ok(step);
                    }
                }
            }
        }
    }

    /// Advance the chunked state machine by one step. `None` means the state
    /// changed and decoding should continue.
    fn decode_chunked(
        &mut self,
        chunk: ChunkState,
        buffer: &mut BytesMut,
    ) -> Result<Option<Decoded>, TransportError> {
        match chunk {
            ChunkState::Size => {
                let Some(line) = take_line(buffer, MAX_CHUNK_SIZE_LINE)? else {
                    return Ok(Some(Decoded::NeedMore));
                };
                let size = parse_chunk_size(&line)?;
                self.state = DecodeState::Chunked(if size == 0 {
                    ChunkState::Trailers { consumed: 0 }
                } else {
                    ChunkState::Data { remaining: size }
                });
                Ok(None)
            }
            ChunkState::Data { remaining } => {
                let Some(data) = take_up_to(buffer, remaining) else {
                    return Ok(Some(Decoded::NeedMore));
                };
                let left = remaining - data.len() as u64;
                self.state = DecodeState::Chunked(if left == 0 {
                    ChunkState::DataEnd
                } else {
                    ChunkState::Data { remaining: left }
                });
                Ok(Some(Decoded::Data(data)))
            }
            ChunkState::DataEnd => {
                if buffer.starts_with(b"\r\n") {
                    buffer.advance(2);
                    self.state = DecodeState::Chunked(ChunkState::Size);
                    Ok(None)
                } else if buffer.is_empty() || buffer.as_ref() == b"\r" {
                    Ok(Some(Decoded::NeedMore))
                } else {
                    Err(protocol_body("missing CRLF after chunk data"))
                }
            }
            ChunkState::Trailers { consumed } => {
                // The closing blank line is not charged to the trailer budget.
                if let Some(end) = blank_line_len(buffer) {
                    buffer.advance(end);
                    self.state = DecodeState::Done;
                    return Ok(Some(Decoded::Done));
                }
                if buffer.is_empty() || buffer.as_ref() == b"\r" {
                    return Ok(Some(Decoded::NeedMore));
                }
                let budget = self.max_trailer_bytes.saturating_sub(consumed);
                let Some(line) = take_line(buffer, budget)? else {
                    return Ok(Some(Decoded::NeedMore));
                };
                self.state = DecodeState::Chunked(ChunkState::Trailers {
                    consumed: consumed + line.len(),
                });
                Ok(None)
            }
        }
    }

    /// Account for the peer closing the stream.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::TruncatedResponse` unless the body is
    /// complete or delimited by the close itself.
    pub fn finish_at_eof(&mut self) -> Result<(), TransportError> {
        match self.state {
            DecodeState::Done => Ok(()),
            DecodeState::UntilClose => {
                self.state = DecodeState::Done;
                Ok(())
            }
            DecodeState::Length { remaining } => Err(TransportError::truncated(
                Phase::ReadBody,
                format!("connection closed with {remaining} body bytes outstanding"),
            )),
            DecodeState::Chunked(_) => Err(TransportError::truncated(
                Phase::ReadBody,
                "connection closed inside a chunked body",
            )),
        }
    }
}

fn protocol_head(message: impl Into<String>) -> TransportError {
    TransportError::protocol(Phase::ReadHeaders, message)
}

fn protocol_body(message: impl Into<String>) -> TransportError {
    TransportError::protocol(Phase::ReadBody, message)
}

/// Split off up to `limit` buffered bytes; `None` when nothing is buffered.
fn take_up_to(buffer: &mut BytesMut, limit: u64) -> Option<Bytes> {
    if buffer.is_empty() {
        return None;
    }
    let available = buffer.len();
    let count = usize::try_from(limit).map_or(available, |wanted| wanted.min(available));
    Some(buffer.split_to(count).freeze())
}

/// Split off one `\n`-terminated line, refusing lines longer than `limit`.
fn take_line(buffer: &mut BytesMut, limit: usize) -> Result<Option<BytesMut>, TransportError> {
    match buffer.iter().position(|byte| *byte == b'\n') {
        Some(end) if end < limit => Ok(Some(buffer.split_to(end + 1))),
        Some(_) => Err(protocol_body(format!("body framing line exceeds {limit} bytes"))),
        None if buffer.len() >= limit => {
            Err(protocol_body(format!("body framing line exceeds {limit} bytes")))
        }
        None => Ok(None),
    }
}

/// Length of a blank line at the front of `buffer`, if one is complete.
fn blank_line_len(buffer: &[u8]) -> Option<usize> {
    if buffer.starts_with(b"\r\n") {
        Some(2)
    } else if buffer.starts_with(b"\n") {
        Some(1)
    } else {
        None
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    let without_lf = line.strip_suffix(b"\n").unwrap_or(line);
    without_lf.strip_suffix(b"\r").unwrap_or(without_lf)
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, TransportError> {
    let content = strip_cr(line);
    let size_part = content
        .iter()
        .position(|byte| *byte == b';')
        .map_or(content, |split| content.split_at(split).0);
    let hex = std::str::from_utf8(size_part)
        .map_err(|_| protocol_body("chunk size line is not ASCII"))?
        .trim_matches(|c| c == ' ' || c == '\t');
    if hex.is_empty() || !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(protocol_body(format!("malformed chunk size line: {hex:?}")));
    }
    u64::from_str_radix(hex, 16)
        .map_err(|_| protocol_body(format!("chunk size out of range: {hex:?}")))
}

/// Cut the complete head, terminator included, off the front of `buffer`.
fn split_head(
    buffer: &mut BytesMut,
    max_header_bytes: usize,
    phase: Phase,
) -> Result<Option<BytesMut>, TransportError> {
    let leading_blank = buffer
        .iter()
        .take_while(|byte| **byte == b'\r' || **byte == b'\n')
        .count();
    buffer.advance(leading_blank);

    match find_head_end(buffer) {
        Some(end) if end <= max_header_bytes => Ok(Some(buffer.split_to(end))),
        Some(_) => Err(head_too_large(phase, max_header_bytes)),
        None if buffer.len() > max_header_bytes => Err(head_too_large(phase, max_header_bytes)),
        None => Ok(None),
    }
}

fn head_too_large(phase: Phase, max_header_bytes: usize) -> TransportError {
    TransportError::protocol(
        phase,
        format!("message head exceeds the {max_header_bytes}-byte limit"),
    )
}

/// Index just past the first empty line, if the buffer holds one.
fn find_head_end(buffer: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (index, byte) in buffer.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        let line = buffer.get(line_start..index)?;
        if strip_cr(line).is_empty() {
            return Some(index + 1);
        }
        line_start = index + 1;
    }
    None
}

/// Non-empty lines of a complete head, without line terminators.
fn head_lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    head.split(|byte| *byte == b'\n')
        .map(strip_cr)
        .take_while(|line| !line.is_empty())
}

fn parse_status_line(line: &[u8]) -> Result<(Version, StatusCode, String), TransportError> {
    let text =
        std::str::from_utf8(line).map_err(|_| protocol_head("status line is not valid UTF-8"))?;
    let mut parts = text.splitn(3, ' ');
    let version = match parts.next() {
        Some("HTTP/1.1") => Version::HTTP_11,
        Some("HTTP/1.0") => Version::HTTP_10,
        _ => return Err(protocol_head(format!("malformed status line: {text:?}"))),
    };
    let code = parts
        .next()
        .filter(|code| code.len() == 3 && code.bytes().all(|byte| byte.is_ascii_digit()))
        .ok_or_else(|| protocol_head(format!("malformed status code in {text:?}")))?;
    let status = StatusCode::from_bytes(code.as_bytes())
        .map_err(|_| protocol_head(format!("invalid status code {code}")))?;
    let reason = parts.next().unwrap_or_default();
    Ok((version, status, String::from(reason)))
}

fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a [u8]>,
    phase: Phase,
) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = parse_header_line(line, phase)?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn parse_header_line(
    line: &[u8],
    phase: Phase,
) -> Result<(HeaderName, HeaderValue), TransportError> {
    if line.starts_with(b" ") || line.starts_with(b"\t") {
        return Err(TransportError::protocol(
            phase,
            "obsolete header line folding is not supported",
        ));
    }
    let colon = line
        .iter()
        .position(|byte| *byte == b':')
        .ok_or_else(|| TransportError::protocol(phase, "header line without ':'"))?;
    let (raw_name, rest) = line.split_at(colon);
    let name = HeaderName::from_bytes(raw_name).map_err(|_| {
        TransportError::protocol(
            phase,
            format!("invalid header name {:?}", String::from_utf8_lossy(raw_name)),
        )
    })?;
    let raw_value = trim_ows(rest.get(1..).unwrap_or_default());
    let value = HeaderValue::from_bytes(raw_value).map_err(|_| {
        TransportError::protocol(phase, format!("invalid value for header {}", name.as_str()))
    })?;
    Ok((name, value))
}

fn trim_ows(bytes: &[u8]) -> &[u8] {
    let is_ows = |byte: &u8| *byte == b' ' || *byte == b'\t';
    let start = bytes.iter().position(|b| !is_ows(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_ows(b)).map_or(start, |last| last + 1);
    bytes.get(start..end).unwrap_or_default()
}

enum TransferCoding {
    Absent,
    Chunked,
    Other,
}

fn transfer_coding(headers: &HeaderMap) -> TransferCoding {
    let codings: Vec<String> = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .flat_map(|value| {
            value
                .split(',')
                .map(|coding| coding.trim().to_ascii_lowercase())
                .filter(|coding| !coding.is_empty())
                .collect::<Vec<_>>()
        })
        .collect();
    match codings.last().map(String::as_str) {
        None => TransferCoding::Absent,
        Some("chunked") => TransferCoding::Chunked,
        Some(_) => TransferCoding::Other,
    }
}

/// The declared body length; repeated values must agree.
fn content_length(headers: &HeaderMap) -> Result<Option<u64>, TransportError> {
    let mut declared: Option<u64> = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| protocol_head("Content-Length is not ASCII"))?;
        for item in text.split(',') {
            let digits = item.trim();
            if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(protocol_head(format!("invalid Content-Length {digits:?}")));
            }
            let length = digits
                .parse::<u64>()
                .map_err(|_| protocol_head(format!("Content-Length out of range: {digits}")))?;
            match declared {
                Some(previous) if previous != length => {
                    return Err(protocol_head("conflicting Content-Length values"));
                }
                _ => declared = Some(length),
            }
        }
    }
    Ok(declared)
}
