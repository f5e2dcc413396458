//! Routing decision and dispatch to one of two route trees.
//!
//! [`RouterCore`] owns the gateway prefix, the routing header and the two
//! backend trees. It keeps no per-request state: the gateway writes the
//! decision into the [`RequestContext`] when the request enters the prefix,
//! and dispatch copies it onto the [`Request`] the handler receives.

use std::time::Duration;

use http::header::{ALLOW, HeaderName, HeaderValue};
use http::StatusCode;
use tracing::{debug, error, warn};

use crate::context::{RequestContext, RoutingDecision};
use crate::handler::BoxedHandler;
use crate::middleware::{BoxFuture, Terminal};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};
use crate::router::{RouteMatch, RouteMatcher};

pub(crate) struct RouterCore {
    prefix: String,
    route_header: HeaderName,
    route_token: String,
    primary: Box<dyn RouteMatcher>,
    secondary: Box<dyn RouteMatcher>,
    timeout: Option<Duration>,
}

impl RouterCore {
    pub(crate) fn new(
        prefix: String,
        route_header: HeaderName,
        route_token: String,
        primary: Box<dyn RouteMatcher>,
        secondary: Box<dyn RouteMatcher>,
        timeout: Option<Duration>,
    ) -> Self {
        Self { prefix, route_header, route_token, primary, secondary, timeout }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Secondary when the routing header equals the token, ignoring ASCII
    /// case. Anything else, absence included, is Primary.
    pub(crate) fn decide(&self, req: &Request) -> RoutingDecision {
        let hint = req.headers().get(&self.route_header).and_then(|v| v.to_str().ok());
        match hint {
            Some(value) if value.eq_ignore_ascii_case(&self.route_token) => RoutingDecision::Secondary,
            _ => RoutingDecision::Primary,
        }
    }

    /// The path relative to the prefix, or `None` when `path` is outside it.
    ///
    /// `/api/v2` and `/api/v2/` map to `/`; one trailing slash is dropped
    /// from anything longer, so `/api/v2/calls/` maps to `/calls`.
    pub(crate) fn relative_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        match rest {
            "" | "/" => Some("/"),
            _ if rest.starts_with('/') => Some(rest.strip_suffix('/').unwrap_or(rest)),
            _ => None,
        }
    }

    fn tree(&self, decision: RoutingDecision) -> &dyn RouteMatcher {
        match decision {
            RoutingDecision::Primary   => self.primary.as_ref(),
            RoutingDecision::Secondary => self.secondary.as_ref(),
        }
    }

    async fn dispatch(&self, cx: &mut RequestContext, mut req: Request) -> Response {
        let Some(decision) = cx.route() else {
            error!(request_id = cx.request_id(), path = req.path(), "no routing decision on request context");
            return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
        };

        let Some(path) = self.relative_path(req.path()).map(str::to_owned) else {
            return Response::status(StatusCode::NOT_FOUND);
        };

        let tree = self.tree(decision);
        debug!(
            endpoint = %decision.endpoint(),
            request_id = cx.request_id(),
            method = %req.method(),
            path = %path,
            "dispatching"
        );

        match tree.route(req.method(), &path) {
            Some(RouteMatch { handler, params }) => {
                req.params = params;
                req.route = Some(decision);
                self.invoke(handler, req, cx).await
            }
            None => unmatched(tree, &path),
        }
    }

    async fn invoke(&self, handler: BoxedHandler, req: Request, cx: &RequestContext) -> Response {
        let call = handler.call(req);
        let Some(limit) = self.timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(response) => response,
            Err(_) => {
                warn!(
                    request_id = cx.request_id(),
                    timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    "handler exceeded dispatch deadline"
                );
                Response::status(StatusCode::GATEWAY_TIMEOUT)
            }
        }
    }
}

/// 405 with an `Allow` header when the path exists under other methods,
/// 404 otherwise.
fn unmatched(tree: &dyn RouteMatcher, path: &str) -> Response {
    let allowed = tree.allowed_methods(path);
    if allowed.is_empty() {
        return Response::status(StatusCode::NOT_FOUND);
    }
    let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
    let mut response = Response::status(StatusCode::METHOD_NOT_ALLOWED);
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers.insert(ALLOW, value);
    }
    response
}

impl Terminal for RouterCore {
    fn call<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            self.dispatch(cx, req).await.write_to(res);
        })
    }
}
