//! Access logging interceptor.
//!
//! Wraps the writer in a [`ResponseRecorder`], runs the rest of the chain,
//! then emits exactly one [`AccessRecord`]. The downstream future runs under
//! `catch_unwind`, so a short-circuit, an early return or a handler panic all
//! reach the emit below it. A panic is answered `500` if nothing was written
//! yet. The sink itself can never disturb the response: a panicking sink
//! loses the record, nothing else.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::{error, info};

use super::{BoxFuture, Interceptor, Next};
use crate::context::{Endpoint, RequestContext};
use crate::recorder::ResponseRecorder;
use crate::request::Request;
use crate::response::{Response, ResponseWriter};

/// One completed request, as seen by the gateway.
#[derive(Clone, Debug)]
pub struct AccessRecord {
    pub status: u16,
    pub endpoint: Endpoint,
    pub request_id: Option<String>,
    pub method: String,
    pub path: String,
    pub bytes: usize,
    pub elapsed: Duration,
}

/// Destination for access records.
pub trait AccessLog: Send + Sync + 'static {
    fn record(&self, record: &AccessRecord);
}

/// Emits access records as structured `tracing` events on target
/// `apigate::access`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn record(&self, record: &AccessRecord) {
        info!(
            target: "apigate::access",
            status = record.status,
            endpoint = %record.endpoint,
            request_id = record.request_id.as_deref(),
            method = %record.method,
            path = %record.path,
            bytes = record.bytes,
            elapsed_ms = u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX),
            "handled request"
        );
    }
}

pub struct Logging {
    sink: Arc<dyn AccessLog>,
}

impl Logging {
    pub fn new(sink: impl AccessLog) -> Self {
        Self { sink: Arc::new(sink) }
    }

    pub fn with_shared(sink: Arc<dyn AccessLog>) -> Self {
        Self { sink }
    }

    fn emit(&self, record: &AccessRecord) {
        let sink = &self.sink;
        if std::panic::catch_unwind(AssertUnwindSafe(|| sink.record(record))).is_err() {
            error!(request_id = record.request_id.as_deref(), "access log sink panicked, record dropped");
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self::new(TracingAccessLog)
    }
}

impl Interceptor for Logging {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn intercept<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let method = req.method().to_string();
            let path = req.path().to_owned();
            let mut recorder = ResponseRecorder::new(res);

            let outcome = AssertUnwindSafe(next.run(cx, req, &mut recorder))
                .catch_unwind()
                .await;

            if let Err(panic) = outcome {
                error!(
                    request_id = cx.request_id(),
                    panic = panic_message(panic.as_ref()),
                    "request handling panicked"
                );
                if !recorder.written() {
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR).write_to(&mut recorder);
                }
            }

            self.emit(&AccessRecord {
                status: recorder.status().as_u16(),
                endpoint: cx.endpoint(),
                request_id: cx.request_id().map(str::to_owned),
                method,
                path,
                bytes: recorder.bytes_written(),
                elapsed: cx.started().elapsed(),
            });
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::RoutingDecision;
    use crate::middleware::{Chain, Terminal};
    use crate::response::BufferedWriter;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AccessRecord>>);

    impl AccessLog for Arc<Collect> {
        fn record(&self, record: &AccessRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    struct Exploding;

    impl AccessLog for Exploding {
        fn record(&self, _: &AccessRecord) {
            panic!("sink unavailable");
        }
    }

    enum Behaviour {
        Respond(StatusCode),
        Silent,
        Panic,
    }

    impl Terminal for Behaviour {
        fn call<'a>(
            &'a self,
            _cx: &'a mut RequestContext,
            _req: Request,
            res: &'a mut dyn ResponseWriter,
        ) -> BoxFuture<'a> {
            Box::pin(async move {
                match self {
                    Self::Respond(status) => {
                        Response::builder().status(*status).text("body").write_to(res);
                    }
                    Self::Silent => {}
                    Self::Panic => panic!("handler exploded"),
                }
            })
        }
    }

    async fn run(terminal: Behaviour, route: Option<RoutingDecision>) -> (Vec<AccessRecord>, BufferedWriter) {
        let collect = Arc::new(Collect::default());
        let chain = Chain::new().with(Logging::new(Arc::clone(&collect)));

        let mut cx = RequestContext::new();
        if let Some(route) = route {
            cx.set_route(route);
        }
        let mut writer = BufferedWriter::new();
        let req = Request::new(http::Method::GET, "/api/v2/calls");
        chain.run(&mut cx, req, &mut writer, &terminal).await;

        let records = collect.0.lock().unwrap().clone();
        (records, writer)
    }

    #[tokio::test]
    async fn records_final_status_and_endpoint() {
        let (records, _) = run(Behaviour::Respond(StatusCode::CREATED), Some(RoutingDecision::Secondary)).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, 201);
        assert_eq!(records[0].endpoint, Endpoint::Secondary);
        assert_eq!(records[0].bytes, 4);
        assert_eq!(records[0].method, "GET");
        assert_eq!(records[0].path, "/api/v2/calls");
    }

    #[tokio::test]
    async fn silent_handler_logs_default_ok() {
        let (records, writer) = run(Behaviour::Silent, Some(RoutingDecision::Primary)).await;
        assert_eq!(records[0].status, 200);
        assert_eq!(records[0].endpoint, Endpoint::Primary);
        assert_eq!(writer.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_decision_logs_non_proxied() {
        let (records, _) = run(Behaviour::Respond(StatusCode::NOT_FOUND), None).await;
        assert_eq!(records[0].endpoint.as_str(), "non-proxied");
    }

    #[tokio::test]
    async fn panic_is_answered_500_and_still_logged() {
        let (records, writer) = run(Behaviour::Panic, Some(RoutingDecision::Primary)).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, 500);
        assert_eq!(writer.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn panicking_sink_does_not_disturb_response() {
        let chain = Chain::new().with(Logging::new(Exploding));
        let terminal = Behaviour::Respond(StatusCode::ACCEPTED);
        let mut cx = RequestContext::new();
        let mut writer = BufferedWriter::new();

        chain
            .run(&mut cx, Request::new(http::Method::POST, "/"), &mut writer, &terminal)
            .await;

        assert_eq!(writer.status(), StatusCode::ACCEPTED);
        assert_eq!(writer.body(), b"body");
    }
}
