//! Per-connection proxy session.
//!
//! # State Machine
//! ```text
//! ReadRequest → ParseRequest → CacheLookup
//!     HIT  → WriteCachedResponse → Done
//!     MISS → ForwardToOrigin → RelayResponse → CacheInsertIfEligible → Done
//!
//! Any parse or I/O failure → Done (abort, nothing more written)
//! ```
//!
//! # Design Decisions
//! - Origin bytes are streamed to the client chunk by chunk as they arrive
//! - A shadow copy is staged only while it stays within the per-object cap
//! - Only a response relayed in full, from a cleanly closed origin, is cached

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::cache::{InsertOutcome, ObjectCache};
use crate::config::ProxyConfig;
use crate::http::error::ProxyError;
use crate::http::forward;
use crate::http::request::{read_request, ParsedRequest, RequestLimits};
use crate::observability::metrics;

/// Per-session knobs derived from [`ProxyConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub limits: RequestLimits,
    pub relay_chunk_bytes: usize,
    pub max_object_bytes: usize,
    pub user_agent: String,
}

impl SessionSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            limits: RequestLimits {
                max_headers: config.http.max_headers,
                max_line_bytes: config.http.max_line_bytes,
            },
            relay_chunk_bytes: config.http.relay_chunk_bytes,
            max_object_bytes: config.cache.max_object_bytes,
            user_agent: config.http.user_agent.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

/// How a session that ran to completion served its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Answered from the cache.
    CacheHit { bytes: usize },
    /// Relayed from the origin; `cached` if the response was stored.
    Relayed { bytes: usize, cached: bool },
}

impl SessionOutcome {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionOutcome::CacheHit { .. } => "hit",
            SessionOutcome::Relayed { .. } => "miss",
        }
    }
}

/// One client exchange, from request line to closed origin.
pub struct Session<S> {
    client: BufReader<S>,
    cache: Option<Arc<ObjectCache>>,
    settings: Arc<SessionSettings>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session over `client`. With no cache every request is a miss.
    pub fn new(client: S, cache: Option<Arc<ObjectCache>>, settings: Arc<SessionSettings>) -> Self {
        Self {
            client: BufReader::new(client),
            cache,
            settings,
        }
    }

    /// Drive the exchange to completion.
    ///
    /// The client stream is dropped (closed) when this returns, on success or
    /// error alike.
    pub async fn run(mut self) -> Result<SessionOutcome, ProxyError> {
        let request = read_request(&mut self.client, self.settings.limits).await?;

        if let Some(payload) = self.cache.as_ref().and_then(|c| c.lookup(&request.uri)) {
            self.write_client(&payload).await?;
            self.flush_client().await?;
            metrics::record_relayed_bytes("cache", payload.len());
            tracing::debug!(uri = ?request.uri, bytes = payload.len(), "Served from cache");
            return Ok(SessionOutcome::CacheHit { bytes: payload.len() });
        }

        let origin = forward::forward(&request, &self.settings.user_agent).await?;
        self.relay(origin, &request).await
    }

    /// Stream the origin response to the client until the origin closes,
    /// staging a copy for the cache while it fits.
    async fn relay<O>(&mut self, mut origin: O, request: &ParsedRequest) -> Result<SessionOutcome, ProxyError>
    where
        O: AsyncRead + Unpin,
    {
        let max_object = self.settings.max_object_bytes;
        let mut chunk = vec![0u8; self.settings.relay_chunk_bytes];
        let mut staging = self
            .cache
            .as_ref()
            .map(|_| BytesMut::with_capacity(max_object.min(self.settings.relay_chunk_bytes * 4)));
        let mut relayed = 0usize;

        loop {
            let n = origin.read(&mut chunk).await.map_err(ProxyError::OriginRead)?;
            if n == 0 {
                break;
            }
            self.write_client(&chunk[..n]).await?;
            relayed += n;

            let fits = staging
                .as_ref()
                .is_some_and(|staged| staged.len() + n <= max_object);
            if fits {
                if let Some(staged) = staging.as_mut() {
                    staged.extend_from_slice(&chunk[..n]);
                }
            } else if staging.take().is_some() {
                tracing::debug!(
                    uri = ?request.uri,
                    limit = max_object,
                    "Response exceeds object size limit, not caching"
                );
            }
        }
        self.flush_client().await?;
        metrics::record_relayed_bytes("origin", relayed);

        let cached = match (staging, &self.cache) {
            (Some(staged), Some(cache)) if !staged.is_empty() => {
                commit(cache, &request.uri, staged)
            }
            _ => false,
        };

        tracing::debug!(uri = ?request.uri, bytes = relayed, cached, "Relayed from origin");
        Ok(SessionOutcome::Relayed { bytes: relayed, cached })
    }

    async fn write_client(&mut self, bytes: &[u8]) -> Result<(), ProxyError> {
        self.client
            .get_mut()
            .write_all(bytes)
            .await
            .map_err(ProxyError::ClientWrite)
    }

    async fn flush_client(&mut self) -> Result<(), ProxyError> {
        self.client.get_mut().flush().await.map_err(ProxyError::ClientWrite)
    }
}

/// Store a fully staged response unless another session already did.
fn commit(cache: &ObjectCache, uri: &Bytes, staged: BytesMut) -> bool {
    if cache.contains(uri) {
        tracing::trace!(uri = ?uri, "Already cached by a concurrent session");
        return false;
    }
    match cache.insert(uri.clone(), staged.freeze()) {
        InsertOutcome::Inserted { evicted } => {
            tracing::trace!(uri = ?uri, evicted, "Response cached");
            true
        }
        InsertOutcome::AlreadyPresent | InsertOutcome::TooLarge => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::SocketAddr;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, DuplexStream, ReadBuf};
    use tokio::net::TcpListener;

    /// Origin stream that yields `data` once, then fails.
    struct ResettingOrigin {
        data: Option<&'static [u8]>,
    }

    impl AsyncRead for ResettingOrigin {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(data);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by origin"))),
            }
        }
    }

    /// Origin that answers one connection with `response` and closes.
    async fn one_shot_origin(response: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let mut head = Vec::new();
            while !head.ends_with(b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            stream.write_all(&response).await.unwrap();
        });
        addr
    }

    async fn exchange(
        request: impl AsRef<[u8]>,
        cache: Option<Arc<ObjectCache>>,
        settings: SessionSettings,
    ) -> (Result<SessionOutcome, ProxyError>, Vec<u8>) {
        let (proxy_side, mut client_side): (DuplexStream, DuplexStream) = duplex(64 * 1024);
        let session = Session::new(proxy_side, cache, Arc::new(settings));
        let task = tokio::spawn(session.run());

        client_side.write_all(request.as_ref()).await.unwrap();
        let mut received = Vec::new();
        client_side.read_to_end(&mut received).await.unwrap();
        (task.await.unwrap(), received)
    }

    fn get(addr: SocketAddr, path: &str) -> String {
        format!("GET http://{addr}{path} HTTP/1.1\r\nHost: {addr}\r\n\r\n")
    }

    #[tokio::test]
    async fn miss_relays_and_caches() {
        let body = b"HTTP/1.0 200 OK\r\n\r\nhello".to_vec();
        let addr = one_shot_origin(body.clone()).await;
        let cache = Arc::new(ObjectCache::new(1024 * 1024));

        let (outcome, received) =
            exchange(get(addr, "/a"), Some(cache.clone()), SessionSettings::default()).await;

        assert_eq!(
            outcome.unwrap(),
            SessionOutcome::Relayed {
                bytes: body.len(),
                cached: true
            }
        );
        assert_eq!(received, body);
        assert_eq!(cache.lookup(&format!("http://{addr}/a")).unwrap(), body);
    }

    #[tokio::test]
    async fn hit_is_served_without_origin() {
        let cache = Arc::new(ObjectCache::new(1024));
        cache.insert("http://nowhere.invalid/cached", bytes::Bytes::from_static(b"cached!"));

        let request = "GET http://nowhere.invalid/cached HTTP/1.0\r\n\r\n".to_string();
        let (outcome, received) = exchange(request, Some(cache), SessionSettings::default()).await;

        assert_eq!(outcome.unwrap(), SessionOutcome::CacheHit { bytes: 7 });
        assert_eq!(received, b"cached!");
    }

    #[tokio::test]
    async fn response_over_object_limit_is_relayed_not_cached() {
        let settings = SessionSettings {
            max_object_bytes: 100,
            relay_chunk_bytes: 16,
            ..SessionSettings::default()
        };
        let body = vec![b'x'; 101];
        let addr = one_shot_origin(body.clone()).await;
        let cache = Arc::new(ObjectCache::new(1000));

        let (outcome, received) = exchange(get(addr, "/big"), Some(cache.clone()), settings).await;

        assert_eq!(
            outcome.unwrap(),
            SessionOutcome::Relayed {
                bytes: 101,
                cached: false
            }
        );
        assert_eq!(received, body);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn response_at_object_limit_is_cached() {
        let settings = SessionSettings {
            max_object_bytes: 100,
            relay_chunk_bytes: 16,
            ..SessionSettings::default()
        };
        let addr = one_shot_origin(vec![b'y'; 100]).await;
        let cache = Arc::new(ObjectCache::new(1000));

        let (outcome, _) = exchange(get(addr, "/edge"), Some(cache.clone()), settings).await;

        assert!(matches!(outcome.unwrap(), SessionOutcome::Relayed { cached: true, .. }));
        assert_eq!(cache.total_size(), 100);
    }

    #[tokio::test]
    async fn malformed_request_gets_no_response() {
        let cache = Arc::new(ObjectCache::new(1024));
        let request = "POST http://example.com/ HTTP/1.1\r\n\r\n".to_string();

        let (outcome, received) = exchange(request, Some(cache), SessionSettings::default()).await;

        assert!(matches!(outcome, Err(ProxyError::Malformed(_))));
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn without_cache_nothing_is_stored() {
        let addr = one_shot_origin(b"body".to_vec()).await;
        let (outcome, received) = exchange(get(addr, "/"), None, SessionSettings::default()).await;

        assert_eq!(
            outcome.unwrap(),
            SessionOutcome::Relayed {
                bytes: 4,
                cached: false
            }
        );
        assert_eq!(received, b"body");
    }

    #[tokio::test]
    async fn empty_origin_response_is_not_cached() {
        let addr = one_shot_origin(Vec::new()).await;
        let cache = Arc::new(ObjectCache::new(1024));

        let (outcome, received) = exchange(get(addr, "/empty"), Some(cache.clone()), SessionSettings::default()).await;

        assert!(matches!(outcome.unwrap(), SessionOutcome::Relayed { bytes: 0, cached: false }));
        assert!(received.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn origin_read_error_aborts_without_caching() {
        let cache = Arc::new(ObjectCache::new(1024));
        let (proxy_side, mut client_side) = duplex(1024);
        let mut session = Session::new(proxy_side, Some(cache.clone()), Arc::new(SessionSettings::default()));
        let request = ParsedRequest::from_request_line(b"GET http://example.com/flaky HTTP/1.0").unwrap();

        let origin = ResettingOrigin {
            data: Some(&b"partial"[..]),
        };
        let result = session.relay(origin, &request).await;

        assert!(matches!(result, Err(ProxyError::OriginRead(_))));
        assert!(cache.is_empty());

        drop(session);
        let mut received = Vec::new();
        client_side.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"partial");
    }

    #[tokio::test]
    async fn distinct_non_utf8_uris_get_separate_entries() {
        let first = one_shot_origin(b"first".to_vec()).await;
        let cache = Arc::new(ObjectCache::new(1024));
        let mut request = format!("GET http://{first}/caf").into_bytes();
        request.extend_from_slice(b"\xe9 HTTP/1.0\r\n\r\n");

        let (outcome, received) = exchange(request, Some(cache.clone()), SessionSettings::default()).await;
        assert!(matches!(outcome, Ok(SessionOutcome::Relayed { cached: true, .. })));
        assert_eq!(received, b"first");

        let mut other = format!("http://{first}/caf").into_bytes();
        other.push(0xff);
        assert!(cache.lookup(&other).is_none());

        let mut key = format!("http://{first}/caf").into_bytes();
        key.push(0xe9);
        assert_eq!(cache.lookup(&key).unwrap(), &b"first"[..]);
    }

    #[test]
    fn commit_respects_first_writer() {
        let cache = ObjectCache::new(1024);
        let key = Bytes::from_static(b"k");
        assert!(commit(&cache, &key, BytesMut::from(&b"one"[..])));
        assert!(!commit(&cache, &key, BytesMut::from(&b"two"[..])));
        assert_eq!(cache.lookup("k").unwrap(), &b"one"[..]);
    }
}
