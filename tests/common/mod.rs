//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forward_proxy::config::ProxyConfig;
use forward_proxy::net::{ConnectionTracker, Listener};
use forward_proxy::{ObjectCache, ProxyServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A loopback origin server that answers every connection with a fixed
/// response and then closes.
pub struct MockOrigin {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    /// Number of connections the origin has served.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request heads received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Absolute proxy URI for `path` on this origin.
    pub fn uri(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start an origin that replies with `response` immediately.
pub async fn start_origin(response: Vec<u8>) -> MockOrigin {
    start_slow_origin(response, Duration::ZERO).await
}

/// Start an origin that waits `delay` before replying.
pub async fn start_slow_origin(response: Vec<u8>, delay: Duration) -> MockOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let response = Arc::new(response);

    let (h, r) = (hits.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            h.fetch_add(1, Ordering::SeqCst);
            let (requests, response) = (r.clone(), response.clone());
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                requests.lock().unwrap().push(head);
                tokio::time::sleep(delay).await;
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockOrigin { addr, hits, requests }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// A proxy running on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub cache: Option<Arc<ObjectCache>>,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Boot a proxy with `config`, ignoring its bind address.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = ProxyServer::new(&config);
    let cache = server.cache();
    let tracker = server.tracker();
    let rx = shutdown.subscribe();
    tokio::spawn(server.run(listener, rx));

    TestProxy {
        addr,
        cache,
        tracker,
        shutdown,
    }
}

/// Send raw bytes to the proxy and read until it closes the connection.
pub async fn send_raw(proxy: SocketAddr, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    response
}

/// Issue a proxy-form GET for `uri`.
pub async fn proxy_get(proxy: SocketAddr, uri: &str) -> Vec<u8> {
    send_raw(proxy, &format!("GET {uri} HTTP/1.1\r\nAccept: */*\r\n\r\n")).await
}

/// Wait until no session is running, or panic after `timeout`.
pub async fn wait_for_idle(tracker: &ConnectionTracker, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while tracker.active_count() > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} sessions still active",
            tracker.active_count()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// An HTTP/1.0 response whose total length is exactly `total` bytes.
pub fn response_of_len(total: usize) -> Vec<u8> {
    let head = b"HTTP/1.0 200 OK\r\nContent-Type: application/octet-stream\r\n\r\n";
    assert!(total >= head.len());
    let mut response = head.to_vec();
    response.resize(total, b'z');
    response
}
