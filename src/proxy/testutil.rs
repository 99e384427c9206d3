//! Loopback stand-ins for proxies and the echo service

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

static NONCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"cur=([^&\s]+)").expect("Invalid nonce regex"));

type Responder = dyn Fn(&str) -> (u16, String) + Send + Sync;

/// A listener that answers plain HTTP requests with a scripted echo body
///
/// `CONNECT` tunnels are refused with 502, so https probes through it fail.
pub(crate) struct FakeProxy {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicUsize>,
}

impl FakeProxy {
    pub async fn spawn<F>(respond: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        Self::spawn_with_delay(Duration::ZERO, respond).await
    }

    pub async fn spawn_with_delay<F>(delay: Duration, respond: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let respond: Arc<Responder> = Arc::new(respond);

        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let _ = serve(stream, delay, respond).await;
                });
            }
        });

        Self { addr, connections }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve(
    mut stream: TcpStream,
    delay: Duration,
    respond: Arc<Responder>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next().unwrap_or_default();
    if request_line.starts_with("CONNECT") {
        stream
            .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")
            .await?;
        return stream.shutdown().await;
    }

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let nonce = NONCE_REGEX
        .captures(request_line)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();
    let (status, body) = respond(&nonce);
    let response = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// An httpbin-style `/get?show_env=1` body
pub(crate) fn echo_body(nonce: &str, origin: &str, via: Option<&str>) -> String {
    let mut headers = serde_json::json!({
        "Accept": "*/*",
        "Host": "httpbin.org",
    });
    if let Some(via) = via {
        headers["Via"] = serde_json::Value::String(via.to_string());
    }
    serde_json::json!({
        "args": { "cur": nonce, "show_env": "1" },
        "headers": headers,
        "origin": origin,
        "url": format!("http://httpbin.org/get?show_env=1&cur={}", nonce),
    })
    .to_string()
}
