//! The assembled gateway.
//!
//! Two branches, chosen by path:
//!
//! ```text
//! /api/v2/...  → decide route → [RequestId, Logging, RateGate] → RouterCore → tree
//! elsewhere    →                [Logging]                      → 404
//! ```
//!
//! Both branches share the same [`Logging`] interceptor, so every request
//! produces exactly one access record. A request whose body could not be read
//! takes the same branches; only the terminal changes, answering 400 or 413
//! in place of the route tree.

use std::sync::Arc;

use http::StatusCode;
use tracing::warn;

use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::dispatch::RouterCore;
use crate::error::Error;
use crate::middleware::{
    AccessLog, BoxFuture, Chain, Gate, HeaderTrigger, Interceptor, Logging, RateGate, RequestId,
    Terminal, TracingAccessLog,
};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};
use crate::router::{RouteMatcher, RouteTree};

/// Immutable after [`GatewayBuilder::build`]; share it as `Arc<Gateway>`.
pub struct Gateway {
    core: RouterCore,
    chain: Chain,
    fallback: Chain,
    not_proxied: NotProxied,
    max_body_size: usize,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new(GatewayConfig::default())
    }

    pub fn prefix(&self) -> &str {
        self.core.prefix()
    }

    /// Interceptor names of the prefix branch, outermost first.
    pub fn interceptors(&self) -> Vec<&'static str> {
        self.chain.names()
    }

    /// Largest request body the server should buffer for this gateway.
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Serves one request, writing the response into `res`.
    pub async fn handle(&self, req: Request, res: &mut dyn ResponseWriter) {
        self.serve(req, res, &self.core).await;
    }

    /// Serves a request whose body could not be read. It runs through the
    /// same interceptors as [`handle`](Gateway::handle), so it is still
    /// correlated, rate gated and logged, but answers `status` instead of
    /// dispatching. `req` carries the head only.
    pub async fn reject(&self, req: Request, status: StatusCode, res: &mut dyn ResponseWriter) {
        let rejected = BodyRejected { status };
        self.serve(req, res, &rejected).await;
    }

    async fn serve(&self, req: Request, res: &mut dyn ResponseWriter, terminal: &dyn Terminal) {
        let mut cx = RequestContext::new();
        if self.core.relative_path(req.path()).is_some() {
            cx.set_route(self.core.decide(&req));
            self.chain.run(&mut cx, req, res, terminal).await;
        } else {
            self.fallback.run(&mut cx, req, res, &self.not_proxied).await;
        }
    }
}

/// Stands in for the route tree when the request body was unreadable.
struct BodyRejected {
    status: StatusCode,
}

impl Terminal for BodyRejected {
    fn call<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            warn!(
                request_id = cx.request_id(),
                path = req.path(),
                status = self.status.as_u16(),
                "request body rejected"
            );
            Response::status(self.status).write_to(res);
        })
    }
}

/// Catch-all for paths outside the prefix.
struct NotProxied {
    prefix: String,
}

impl Terminal for NotProxied {
    fn call<'a>(
        &'a self,
        _cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            warn!(path = req.path(), prefix = %self.prefix, "route is not under the gateway prefix, responding 404");
            Response::status(StatusCode::NOT_FOUND).write_to(res);
        })
    }
}

/// Collects the two route trees and optional overrides, then validates
/// everything at once in [`build`](GatewayBuilder::build).
///
/// ```rust
/// use apigate::{Gateway, Method, Request, RouteTree};
///
/// async fn tasks(_: Request) -> &'static str { "tasks" }
/// async fn calls(_: Request) -> &'static str { "calls" }
///
/// let gateway = Gateway::builder()
///     .primary(RouteTree::new().any("/tasks", tasks))
///     .secondary(RouteTree::new().on(Method::Get, "/calls", calls))
///     .build()
///     .unwrap();
/// assert_eq!(gateway.prefix(), "/api/v2");
/// ```
pub struct GatewayBuilder {
    config: GatewayConfig,
    primary: Option<Result<Box<dyn RouteMatcher>, Error>>,
    secondary: Option<Result<Box<dyn RouteMatcher>, Error>>,
    access_log: Arc<dyn AccessLog>,
    gate: Option<RateGate>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            primary: None,
            secondary: None,
            access_log: Arc::new(TracingAccessLog),
            gate: None,
        }
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Tree served when the routing hint is absent or does not match.
    pub fn primary(mut self, tree: RouteTree) -> Self {
        self.primary = Some(boxed(tree));
        self
    }

    /// Tree served when the routing hint matches the token.
    pub fn secondary(mut self, tree: RouteTree) -> Self {
        self.secondary = Some(boxed(tree));
        self
    }

    /// Uses a custom matcher for the primary backend.
    pub fn primary_matcher(mut self, matcher: impl RouteMatcher) -> Self {
        self.primary = Some(Ok(Box::new(matcher)));
        self
    }

    /// Uses a custom matcher for the secondary backend.
    pub fn secondary_matcher(mut self, matcher: impl RouteMatcher) -> Self {
        self.secondary = Some(Ok(Box::new(matcher)));
        self
    }

    /// Replaces the `tracing` access log sink.
    pub fn access_log(mut self, sink: impl AccessLog) -> Self {
        self.access_log = Arc::new(sink);
        self
    }

    /// Replaces the header-triggered rate gate.
    pub fn gate(mut self, gate: impl Gate) -> Self {
        self.gate = Some(RateGate::new(gate));
        self
    }

    pub fn build(self) -> Result<Gateway, Error> {
        let config = self.config;
        config.validate()?;

        let primary = self.primary.ok_or(Error::MissingRouteTree("primary"))??;
        let secondary = self.secondary.ok_or(Error::MissingRouteTree("secondary"))??;

        let gate = match self.gate {
            Some(gate) => gate,
            None => RateGate::new(HeaderTrigger::new(config.rate_limit_header()?)),
        };
        let logging: Arc<dyn Interceptor> = Arc::new(Logging::with_shared(self.access_log));

        let chain = Chain::new()
            .with(RequestId::new(config.request_id_header()?))
            .with_shared(Arc::clone(&logging))
            .with(gate);
        let fallback = Chain::new().with_shared(logging);

        let core = RouterCore::new(
            config.prefix.clone(),
            config.route_header()?,
            config.route_token.clone(),
            primary,
            secondary,
            config.dispatch_timeout(),
        );

        Ok(Gateway {
            core,
            chain,
            fallback,
            not_proxied: NotProxied { prefix: config.prefix },
            max_body_size: config.max_body_size,
        })
    }
}

fn boxed(tree: RouteTree) -> Result<Box<dyn RouteMatcher>, Error> {
    tree.finish().map(|tree| Box::new(tree) as Box<dyn RouteMatcher>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    async fn noop(_: Request) -> &'static str { "ok" }

    #[test]
    fn chain_order_is_request_id_logging_rate_gate() {
        let gateway = Gateway::builder()
            .primary(RouteTree::new())
            .secondary(RouteTree::new())
            .build()
            .unwrap();
        assert_eq!(gateway.interceptors(), ["request_id", "logging", "rate_gate"]);
    }

    #[tokio::test]
    async fn rejected_body_still_passes_the_chain() {
        use crate::response::BufferedWriter;

        let gateway = Gateway::builder()
            .primary(RouteTree::new().any("/tasks", noop))
            .secondary(RouteTree::new())
            .build()
            .unwrap();

        let mut res = BufferedWriter::new();
        let req = Request::new(http::Method::POST, "/api/v2/tasks");
        gateway.reject(req, StatusCode::PAYLOAD_TOO_LARGE, &mut res).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(res.headers().contains_key("x-request-id"));

        let mut res = BufferedWriter::new();
        let req = Request::new(http::Method::POST, "/api/v2/tasks").with_header("X-RateLimit-Me", "1");
        gateway.reject(req, StatusCode::BAD_REQUEST, &mut res).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        let mut res = BufferedWriter::new();
        let req = Request::new(http::Method::POST, "/elsewhere");
        gateway.reject(req, StatusCode::BAD_REQUEST, &mut res).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn missing_tree_fails_build() {
        let result = Gateway::builder().primary(RouteTree::new()).build();
        assert!(matches!(result, Err(Error::MissingRouteTree("secondary"))));
    }

    #[test]
    fn conflicting_registration_fails_build() {
        let result = Gateway::builder()
            .primary(RouteTree::new())
            .secondary(
                RouteTree::new()
                    .on(Method::Post, "/calls", noop)
                    .on(Method::Post, "/calls", noop),
            )
            .build();
        assert!(matches!(result, Err(Error::InvalidRoute { .. })));
    }

    #[test]
    fn invalid_config_fails_build() {
        let config = GatewayConfig { prefix: "api".to_owned(), ..GatewayConfig::default() };
        let result = GatewayBuilder::new(config)
            .primary(RouteTree::new())
            .secondary(RouteTree::new())
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
