//! HTTP listener and graceful shutdown.
//!
//! Each accepted connection runs on its own task; hyper drives the requests
//! on it (HTTP/1.1 or HTTP/2, whatever the client negotiates). Every request
//! body is read in full, up to [`Gateway::max_body_size`], turned into a
//! [`Request`] and handed to the shared [`Gateway`] together with a fresh
//! [`BufferedWriter`]. A body that fails to arrive or exceeds the limit is
//! handed over head-only through [`Gateway::reject`].
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets in-flight
//! connections finish, then returns from [`Server::serve`].

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::gateway::Gateway;
use crate::request::Request;
use crate::response::BufferedWriter;

pub struct Server {
    addr: SocketAddr,
}

impl Server {
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Serves until SIGTERM or Ctrl-C, then drains in-flight connections.
    pub async fn serve(self, gateway: Gateway) -> Result<(), Error> {
        self.serve_with_shutdown(gateway, shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight connections.
    pub async fn serve_with_shutdown(
        self,
        gateway: Gateway,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        Self::serve_listener(listener, gateway, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve_listener(
        listener: TcpListener,
        gateway: Gateway,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr = listener.local_addr()?;
        let gateway = Arc::new(gateway);

        info!(%addr, prefix = gateway.prefix(), "apigate listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown is checked first so a signal stops accepting even
                // while connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let gateway = Arc::clone(&gateway);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req: hyper::Request<Incoming>| {
                            let gateway = Arc::clone(&gateway);
                            async move { serve_request(gateway, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow on long runs.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("apigate stopped");
        Ok(())
    }
}

/// One request in, one response out. Failures are answered as HTTP
/// responses, so hyper never sees an error.
async fn serve_request<B>(
    gateway: Arc<Gateway>,
    req: http::Request<B>,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let mut writer = BufferedWriter::new();

    match Limited::new(body, gateway.max_body_size()).collect().await {
        Ok(collected) => {
            let req = Request::from_parts(parts, collected.to_bytes());
            gateway.handle(req, &mut writer).await;
        }
        Err(e) => {
            let status = if e.is::<LengthLimitError>() {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            warn!(path = parts.uri.path(), %status, "failed to read request body: {e}");
            let req = Request::from_parts(parts, Bytes::new());
            gateway.reject(req, status, &mut writer).await;
        }
    }

    Ok(writer.into_http())
}

/// Resolves on SIGTERM (Kubernetes, `kill`) or SIGINT (Ctrl-C). If a handler
/// cannot be installed that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use futures_util::stream;
    use http_body_util::StreamBody;
    use hyper::body::Frame;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::context::Endpoint;
    use crate::gateway::GatewayBuilder;
    use crate::middleware::{AccessLog, AccessRecord};
    use crate::router::RouteTree;

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<AccessRecord>>>);

    impl AccessLog for Collect {
        fn record(&self, record: &AccessRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    impl Collect {
        fn all(&self) -> Vec<AccessRecord> {
            self.0.lock().unwrap().clone()
        }
    }

    async fn tasks(req: Request) -> String {
        format!("{} bytes", req.body().len())
    }

    fn gateway(max_body_size: usize, log: Collect) -> Arc<Gateway> {
        let config = GatewayConfig { max_body_size, ..GatewayConfig::default() };
        let gateway = GatewayBuilder::new(config)
            .primary(RouteTree::new().any("/tasks", tasks))
            .secondary(RouteTree::new())
            .access_log(log)
            .build()
            .unwrap();
        Arc::new(gateway)
    }

    type Broken = StreamBody<stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, io::Error>>>>;

    fn broken_body() -> Broken {
        StreamBody::new(stream::iter(vec![
            Ok(Frame::data(Bytes::from_static(b"ab"))),
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad chunk size")),
        ]))
    }

    #[tokio::test]
    async fn body_within_limit_is_dispatched() {
        let log = Collect::default();
        let req = http::Request::post("/api/v2/tasks")
            .body(Full::new(Bytes::from_static(b"hello")))
            .unwrap();

        let res = serve_request(gateway(16, log.clone()), req).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"5 bytes");
        assert_eq!(log.all().len(), 1);
    }

    #[tokio::test]
    async fn oversized_body_is_413_and_logged() {
        let log = Collect::default();
        let req = http::Request::post("/api/v2/tasks")
            .body(Full::new(Bytes::from(vec![b'a'; 64])))
            .unwrap();

        let res = serve_request(gateway(16, log.clone()), req).await.unwrap();

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(res.headers().contains_key("x-request-id"));
        let records = log.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, 413);
        assert_eq!(records[0].endpoint, Endpoint::Primary);
    }

    #[tokio::test]
    async fn unreadable_body_is_400_and_logged() {
        let log = Collect::default();
        let req = http::Request::post("/api/v2/tasks").body(broken_body()).unwrap();

        let res = serve_request(gateway(1024, log.clone()), req).await.unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let records = log.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, 400);
        assert!(records[0].request_id.is_some());
    }

    #[tokio::test]
    async fn rate_gate_wins_over_unreadable_body() {
        let log = Collect::default();
        let req = http::Request::post("/api/v2/tasks")
            .header("x-ratelimit-me", "1")
            .body(broken_body())
            .unwrap();

        let res = serve_request(gateway(1024, log.clone()), req).await.unwrap();

        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(log.all()[0].status, 429);
    }

    #[tokio::test]
    async fn unreadable_body_outside_prefix_is_404() {
        let log = Collect::default();
        let req = http::Request::post("/unknown/path").body(broken_body()).unwrap();

        let res = serve_request(gateway(1024, log.clone()), req).await.unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let records = log.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].endpoint, Endpoint::NonProxied);
    }
}
