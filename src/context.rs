//! Per-request state threaded through the interceptor chain.
//!
//! A [`RequestContext`] is created by the gateway for every inbound request
//! and passed down the chain by `&mut` reference. Nothing in it outlives the
//! request, and nothing in it is reachable from the shared router.

use std::fmt;
use std::time::Instant;

/// Which backend route tree serves a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoutingDecision {
    Primary,
    Secondary,
}

impl RoutingDecision {
    pub fn endpoint(self) -> Endpoint {
        match self {
            Self::Primary   => Endpoint::Primary,
            Self::Secondary => Endpoint::Secondary,
        }
    }
}

/// The endpoint label written on every access record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endpoint {
    Primary,
    Secondary,
    /// Traffic outside the gateway prefix. Never proxied, always 404.
    NonProxied,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary    => "primary",
            Self::Secondary  => "secondary",
            Self::NonProxied => "non-proxied",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-scoped state shared by interceptors and the dispatcher.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Option<String>,
    route: Option<RoutingDecision>,
    started: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        Self { request_id: None, route: None, started: Instant::now() }
    }

    /// Correlation id assigned or propagated by the request-id interceptor.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.request_id = Some(id.into());
    }

    /// Routing decision, present once the request entered the gateway prefix.
    pub fn route(&self) -> Option<RoutingDecision> {
        self.route
    }

    pub(crate) fn set_route(&mut self, decision: RoutingDecision) {
        debug_assert!(self.route.is_none(), "routing decision computed twice");
        self.route = Some(decision);
    }

    /// Label for the access log. Requests without a decision never entered
    /// the prefix scope.
    pub fn endpoint(&self) -> Endpoint {
        self.route.map_or(Endpoint::NonProxied, RoutingDecision::endpoint)
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

impl Default for RequestContext {
    fn default() -> Self { Self::new() }
}
