//! Origin request forwarding.
//!
//! # Responsibilities
//! - Open a fresh TCP connection to the origin for every request
//! - Rebuild the request as HTTP/1.0 with canonical headers
//!
//! # Design Decisions
//! - No pooling: `Connection: close` makes the origin end the stream after one
//!   response, which is the relay's end-of-response signal
//! - Canonical headers come first in fixed order, then pass-through headers
//! - Path and header bytes are written exactly as the client sent them

use std::borrow::Cow;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::error::ProxyError;
use crate::http::request::{ParsedRequest, DEFAULT_PORT};

/// An HTTP/1.0 request ready to send to an origin server.
#[derive(Debug)]
pub struct OriginRequest<'a> {
    request: &'a ParsedRequest,
    user_agent: &'a str,
}

impl<'a> OriginRequest<'a> {
    pub fn new(request: &'a ParsedRequest, user_agent: &'a str) -> Self {
        Self { request, user_agent }
    }

    /// Host header value: the client's own if it sent one, otherwise
    /// `host` or `host:port` for non-default ports.
    pub fn host_header(&self) -> Cow<'a, [u8]> {
        let request = self.request;
        if let Some(host) = &request.host_header {
            return Cow::Borrowed(host);
        }
        if request.port == DEFAULT_PORT {
            Cow::Borrowed(request.host.as_bytes())
        } else {
            Cow::Owned(format!("{}:{}", request.host, request.port).into_bytes())
        }
    }

    /// Serialize the full request head, blank line included.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(b"GET ");
        out.extend_from_slice(&self.request.path);
        out.extend_from_slice(b" HTTP/1.0\r\n");
        push_header(&mut out, b"Host", &self.host_header());
        push_header(&mut out, b"User-Agent", self.user_agent.as_bytes());
        push_header(&mut out, b"Connection", b"close");
        push_header(&mut out, b"Proxy-Connection", b"close");
        for (name, value) in &self.request.headers {
            push_header(&mut out, name, value);
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

fn push_header(out: &mut Vec<u8>, name: &[u8], value: &[u8]) {
    out.extend_from_slice(name);
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

/// Connect to the request's origin and send the rewritten request.
///
/// The returned stream is positioned at the start of the response.
pub async fn forward(request: &ParsedRequest, user_agent: &str) -> Result<TcpStream, ProxyError> {
    let mut origin = connect(request).await?;
    let head = OriginRequest::new(request, user_agent).render();

    origin.write_all(&head).await.map_err(ProxyError::OriginWrite)?;
    origin.flush().await.map_err(ProxyError::OriginWrite)?;

    tracing::debug!(
        host = %request.host,
        port = request.port,
        path = ?request.path,
        "Request forwarded to origin"
    );
    Ok(origin)
}

async fn connect(request: &ParsedRequest) -> Result<TcpStream, ProxyError> {
    TcpStream::connect((request.host.as_str(), request.port))
        .await
        .map_err(|source| ProxyError::OriginUnreachable {
            addr: format!("{}:{}", request.host, request.port),
            source,
        })
}
