//! Proxy server: the connection acceptor.
//!
//! # Responsibilities
//! - Own the process-wide object cache and hand it to each session
//! - Accept connections until shutdown is signalled
//! - Spawn one detached task per accepted connection
//! - Log and count each session's outcome
//!
//! # Design Decisions
//! - Unbounded fan-out: no queue, no admission limit
//! - The accept loop never awaits a session; session errors stay in the task

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::cache::ObjectCache;
use crate::config::ProxyConfig;
use crate::http::error::ProxyError;
use crate::http::session::{Session, SessionSettings};
use crate::net::{ConnectionTracker, Listener};
use crate::observability::metrics;

/// Pause after a failed accept so resource exhaustion does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Forward proxy server.
pub struct ProxyServer {
    cache: Option<Arc<ObjectCache>>,
    settings: Arc<SessionSettings>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    /// Create a new server with the given configuration.
    pub fn new(config: &ProxyConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ObjectCache::new(config.cache.capacity_bytes)));
        let settings = Arc::new(SessionSettings::from_config(config));
        Self {
            cache,
            settings,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Shared handle to the cache, if caching is enabled.
    pub fn cache(&self) -> Option<Arc<ObjectCache>> {
        self.cache.clone()
    }

    /// Tracker counting running sessions.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Sessions still running at shutdown are left to finish on their own.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                address = %addr,
                cache_enabled = self.cache.is_some(),
                "Proxy server accepting connections"
            );
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(
                        active_sessions = self.tracker.active_count(),
                        "Shutdown signal received, no longer accepting"
                    );
                    break;
                }
            }
        }

        if let Some(cache) = &self.cache {
            tracing::info!(stats = %cache.stats(), "Proxy server stopped");
        }
    }

    /// Hand a connection to its own detached task.
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.track();
        let span = tracing::debug_span!("session", connection_id = %guard.id(), peer_addr = %peer);
        let session = Session::new(stream, self.cache.clone(), Arc::clone(&self.settings));

        tokio::spawn(
            async move {
                match session.run().await {
                    Ok(outcome) => metrics::record_session(outcome.kind()),
                    Err(e) => {
                        log_session_error(&e);
                        metrics::record_session(e.kind());
                    }
                }
                drop(guard);
            }
            .instrument(span),
        );
    }
}

fn log_session_error(error: &ProxyError) {
    match error {
        ProxyError::Malformed(_) | ProxyError::ClientRead(_) => {
            tracing::debug!(error = %error, "Session aborted")
        }
        _ => tracing::warn!(error = %error, "Session aborted"),
    }
}
