//! Session error taxonomy.
//!
//! Every variant is local to one session: it ends that session and is logged,
//! but never reaches the accept loop.

use std::io;

use thiserror::Error;

/// Why a client request could not be parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Client closed the connection before sending a request line.
    #[error("connection closed before request line")]
    EmptyRequest,

    /// Request line does not have the `METHOD URI VERSION` shape.
    #[error("malformed request line {0:?}")]
    BadRequestLine(String),

    /// Only GET is proxied.
    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),

    /// URI is not in absolute `http://` form.
    #[error("request URI {0:?} is not an absolute http:// URI")]
    NotAbsoluteUri(String),

    /// URI has no host between the scheme and the path.
    #[error("request URI {0:?} has no host")]
    EmptyHost(String),

    /// URI host is not ASCII text.
    #[error("invalid host {0:?}")]
    BadHost(String),

    /// URI port is not a valid TCP port.
    #[error("invalid port {0:?}")]
    BadPort(String),

    /// More pass-through headers than the configured limit.
    #[error("more than {limit} request headers")]
    TooManyHeaders { limit: usize },

    /// A request or header line exceeded the configured length.
    #[error("request line longer than {limit} bytes")]
    LineTooLong { limit: usize },

    /// Client closed the connection in the middle of the header block.
    #[error("connection closed before end of headers")]
    UnterminatedHeaders,
}

/// Errors that abort a proxy session.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request was rejected; nothing is written back.
    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),

    /// Reading the request from the client failed.
    #[error("client read failed: {0}")]
    ClientRead(#[source] io::Error),

    /// Writing to the client failed, typically a broken pipe.
    #[error("client write failed: {0}")]
    ClientWrite(#[source] io::Error),

    /// Could not open a connection to the origin.
    #[error("origin {addr} unreachable: {source}")]
    OriginUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Sending the request to the origin failed.
    #[error("origin write failed: {0}")]
    OriginWrite(#[source] io::Error),

    /// Reading the response from the origin failed.
    #[error("origin read failed: {0}")]
    OriginRead(#[source] io::Error),
}

impl ProxyError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Malformed(_) => "malformed",
            ProxyError::ClientRead(_) => "client_read",
            ProxyError::ClientWrite(_) => "client_write",
            ProxyError::OriginUnreachable { .. } => "origin_unreachable",
            ProxyError::OriginWrite(_) => "origin_write",
            ProxyError::OriginRead(_) => "origin_read",
        }
    }
}
