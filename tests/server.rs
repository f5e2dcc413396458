//! Raw HTTP/1.1 over a socket: bodies that cannot be read still pass the
//! interceptors and leave exactly one access record.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use apigate::middleware::{AccessLog, AccessRecord};
use apigate::{Endpoint, GatewayBuilder, GatewayConfig, Request, RouteTree, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
struct Records(Arc<Mutex<Vec<AccessRecord>>>);

impl AccessLog for Records {
    fn record(&self, record: &AccessRecord) {
        self.0.lock().unwrap().push(record.clone());
    }
}

impl Records {
    fn all(&self) -> Vec<AccessRecord> {
        self.0.lock().unwrap().clone()
    }
}

async fn tasks(_: Request) -> &'static str {
    "tasks"
}

async fn start(max_body_size: usize) -> (SocketAddr, Records, JoinHandle<()>) {
    let records = Records::default();
    let config = GatewayConfig { max_body_size, ..GatewayConfig::default() };
    let gateway = GatewayBuilder::new(config)
        .primary(RouteTree::new().any("/tasks", tasks))
        .secondary(RouteTree::new())
        .access_log(records.clone())
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        Server::serve_listener(listener, gateway, std::future::pending())
            .await
            .unwrap();
    });
    (addr, records, server)
}

/// Writes `raw` and returns the status line of the response.
async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();

    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                received.extend_from_slice(&chunk[..n]);
                if received.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&received).lines().next().unwrap_or_default().to_owned()
}

#[tokio::test]
async fn malformed_chunk_with_rate_trigger_is_429_and_logged() {
    let (addr, records, server) = start(1024).await;

    let status = exchange(
        addr,
        b"POST /api/v2/tasks HTTP/1.1\r\n\
          Host: gw\r\n\
          X-RateLimit-Me: 1\r\n\
          Transfer-Encoding: chunked\r\n\r\n\
          ZZ\r\n",
    )
    .await;

    assert!(status.starts_with("HTTP/1.1 429"), "{status}");
    let records = records.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 429);
    assert_eq!(records[0].endpoint, Endpoint::Primary);
    assert!(records[0].request_id.is_some());
    server.abort();
}

#[tokio::test]
async fn malformed_chunk_is_400_and_logged() {
    let (addr, records, server) = start(1024).await;

    let status = exchange(
        addr,
        b"POST /api/v2/tasks HTTP/1.1\r\n\
          Host: gw\r\n\
          Transfer-Encoding: chunked\r\n\r\n\
          ZZ\r\n",
    )
    .await;

    assert!(status.starts_with("HTTP/1.1 400"), "{status}");
    let records = records.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 400);
    server.abort();
}

#[tokio::test]
async fn oversized_body_is_413_and_logged() {
    let (addr, records, server) = start(16).await;

    let mut raw = b"POST /api/v2/tasks HTTP/1.1\r\nHost: gw\r\nContent-Length: 64\r\n\r\n".to_vec();
    raw.extend_from_slice(&[b'a'; 64]);
    let status = exchange(addr, &raw).await;

    assert!(status.starts_with("HTTP/1.1 413"), "{status}");
    let records = records.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 413);
    server.abort();
}

#[tokio::test]
async fn malformed_chunk_outside_prefix_is_404_and_logged() {
    let (addr, records, server) = start(1024).await;

    let status = exchange(
        addr,
        b"POST /unknown/path HTTP/1.1\r\n\
          Host: gw\r\n\
          Transfer-Encoding: chunked\r\n\r\n\
          ZZ\r\n",
    )
    .await;

    assert!(status.starts_with("HTTP/1.1 404"), "{status}");
    let records = records.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].endpoint, Endpoint::NonProxied);
    server.abort();
}
