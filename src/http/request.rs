//! Client request parsing.
//!
//! # Responsibilities
//! - Read the request line and header block with per-line size limits
//! - Accept only `GET http://host[:port]/path` requests
//! - Split the absolute URI into host, port and path
//! - Classify headers: Host override, suppressed, pass-through, malformed
//!
//! # Design Decisions
//! - Lines stay raw bytes end to end; only the method, scheme, host and port
//!   have to be ASCII text
//! - Header lines without a `": "` separator are dropped, not rejected
//! - Exceeding the header limit rejects the whole request
//! - The raw URI bytes are kept untouched as the cache key

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::http::error::{ParseError, ProxyError};

/// Scheme prefix every proxied URI must start with.
pub const ABSOLUTE_URI_PREFIX: &[u8] = b"http://";

/// Port used when the URI names none.
pub const DEFAULT_PORT: u16 = 80;

/// Headers the forwarder always sets itself.
const SUPPRESSED_HEADERS: [&[u8]; 3] = [b"User-Agent", b"Connection", b"Proxy-Connection"];

/// Limits applied while reading a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    /// Maximum pass-through headers.
    pub max_headers: usize,
    /// Maximum bytes in any single line, terminator included.
    pub max_line_bytes: usize,
}

/// The three tokens of an HTTP request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a [u8],
    pub uri: &'a [u8],
    pub version: &'a [u8],
}

/// Origin location extracted from an absolute URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub path: Bytes,
}

/// How a single header line is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLine<'a> {
    /// Client-supplied Host; replaces the synthesized one.
    Host(&'a [u8]),
    /// Replaced by the forwarder's canonical value.
    Suppressed,
    /// Forwarded unchanged.
    PassThrough { name: &'a [u8], value: &'a [u8] },
    /// No `": "` separator; dropped.
    Malformed,
}

/// A validated proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Raw request URI, used as the cache key.
    pub uri: Bytes,
    pub host: String,
    pub port: u16,
    pub path: Bytes,
    /// Value of the client's Host header, if it sent one.
    pub host_header: Option<Bytes>,
    /// Pass-through headers in arrival order.
    pub headers: Vec<(Bytes, Bytes)>,
}

impl ParsedRequest {
    /// Build a request with no headers from its request line.
    pub fn from_request_line(line: &[u8]) -> Result<Self, ParseError> {
        let RequestLine { method, uri, .. } = parse_request_line(line)?;
        if method != b"GET" {
            return Err(ParseError::UnsupportedMethod(lossy(method)));
        }
        let Target { host, port, path } = parse_absolute_uri(uri)?;
        Ok(Self {
            uri: Bytes::copy_from_slice(uri),
            host,
            port,
            path,
            host_header: None,
            headers: Vec::new(),
        })
    }

    /// Apply one header line, enforcing the pass-through limit.
    pub fn add_header_line(&mut self, line: &[u8], max_headers: usize) -> Result<(), ParseError> {
        match classify_header(line) {
            HeaderLine::Host(value) => self.host_header = Some(Bytes::copy_from_slice(value)),
            HeaderLine::PassThrough { name, value } => {
                if self.headers.len() >= max_headers {
                    return Err(ParseError::TooManyHeaders { limit: max_headers });
                }
                self.headers
                    .push((Bytes::copy_from_slice(name), Bytes::copy_from_slice(value)));
            }
            HeaderLine::Suppressed | HeaderLine::Malformed => {}
        }
        Ok(())
    }
}

/// Split a request line into method, URI and version.
///
/// Tokens after the version are ignored.
pub fn parse_request_line(line: &[u8]) -> Result<RequestLine<'_>, ParseError> {
    let mut parts = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(uri), Some(version)) => Ok(RequestLine { method, uri, version }),
        _ => Err(ParseError::BadRequestLine(lossy(line))),
    }
}

/// Split `http://host[:port][/path]` into its parts.
///
/// A missing port becomes 80, a missing path becomes `"/"`. The path keeps
/// its bytes exactly as sent.
pub fn parse_absolute_uri(uri: &[u8]) -> Result<Target, ParseError> {
    let rest = uri
        .strip_prefix(ABSOLUTE_URI_PREFIX)
        .ok_or_else(|| ParseError::NotAbsoluteUri(lossy(uri)))?;

    let (authority, path) = match rest.iter().position(|&b| b == b'/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, &b"/"[..]),
    };

    let (host, port) = match authority.iter().position(|&b| b == b':') {
        Some(idx) => (&authority[..idx], Some(&authority[idx + 1..])),
        None => (authority, None),
    };

    if host.is_empty() {
        return Err(ParseError::EmptyHost(lossy(uri)));
    }
    let host = std::str::from_utf8(host).map_err(|_| ParseError::BadHost(lossy(host)))?;
    let port = match port {
        None | Some(b"") => DEFAULT_PORT,
        Some(raw) => std::str::from_utf8(raw)
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|&p| p != 0)
            .ok_or_else(|| ParseError::BadPort(lossy(raw)))?,
    };

    Ok(Target {
        host: host.to_string(),
        port,
        path: Bytes::copy_from_slice(path),
    })
}

/// Classify a header line (without its line terminator).
pub fn classify_header(line: &[u8]) -> HeaderLine<'_> {
    let Some(idx) = line.windows(2).position(|w| w == b": ") else {
        return HeaderLine::Malformed;
    };
    let (name, value) = (&line[..idx], &line[idx + 2..]);
    if name.is_empty() {
        return HeaderLine::Malformed;
    }
    if name.eq_ignore_ascii_case(b"Host") {
        return HeaderLine::Host(value);
    }
    if SUPPRESSED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
        return HeaderLine::Suppressed;
    }
    HeaderLine::PassThrough { name, value }
}

/// Read and parse a full request head from the client.
pub async fn read_request<R>(reader: &mut R, limits: RequestLimits) -> Result<ParsedRequest, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader, limits.max_line_bytes)
        .await?
        .ok_or(ParseError::EmptyRequest)?;
    let mut request = ParsedRequest::from_request_line(&line)?;

    loop {
        let line = read_line(reader, limits.max_line_bytes)
            .await?
            .ok_or(ParseError::UnterminatedHeaders)?;
        if line.is_empty() {
            break;
        }
        request.add_header_line(&line, limits.max_headers)?;
    }

    tracing::trace!(
        uri = ?request.uri,
        headers = request.headers.len(),
        "Request parsed"
    );
    Ok(request)
}

/// Read one line, stripped of its `\r\n` or `\n` terminator.
///
/// Returns `None` at end of stream.
async fn read_line<R>(reader: &mut R, max_bytes: usize) -> Result<Option<Vec<u8>>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader
        .take(max_bytes as u64)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(ProxyError::ClientRead)?;

    if n == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") {
        if n >= max_bytes {
            return Err(ParseError::LineTooLong { limit: max_bytes }.into());
        }
        // Stream ended mid-line.
        return Ok(None);
    }

    buf.pop();
    if buf.ends_with(b"\r") {
        buf.pop();
    }
    Ok(Some(buf))
}

/// Printable form of raw bytes for error messages.
fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
