//! Pass/reject gate in front of dispatch.
//!
//! [`RateGate`] asks its [`Gate`] for one independent decision per request. A
//! rejected request is answered `429 Too Many Requests` and never reaches a
//! route tree. No accounting state is kept here; a real limiter plugs in as
//! another [`Gate`].

use http::StatusCode;
use http::header::HeaderName;
use tracing::warn;

use super::{BoxFuture, Interceptor, Next};
use crate::context::RequestContext;
use crate::request::Request;
use crate::response::{Response, ResponseWriter};

/// The default trigger header for [`HeaderTrigger`].
pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-me";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    Pass,
    Reject,
}

/// Decides whether a single request may proceed.
pub trait Gate: Send + Sync + 'static {
    fn admit(&self, req: &Request) -> Admission;
}

/// Rejects any request that carries a non-empty trigger header.
#[derive(Debug, Clone)]
pub struct HeaderTrigger {
    header: HeaderName,
}

impl HeaderTrigger {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for HeaderTrigger {
    fn default() -> Self {
        Self::new(HeaderName::from_static(RATE_LIMIT_HEADER))
    }
}

impl Gate for HeaderTrigger {
    fn admit(&self, req: &Request) -> Admission {
        match req.headers().get(&self.header) {
            Some(v) if !v.is_empty() => Admission::Reject,
            _ => Admission::Pass,
        }
    }
}

pub struct RateGate {
    gate: Box<dyn Gate>,
}

impl RateGate {
    pub fn new(gate: impl Gate) -> Self {
        Self { gate: Box::new(gate) }
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(HeaderTrigger::default())
    }
}

impl Interceptor for RateGate {
    fn name(&self) -> &'static str {
        "rate_gate"
    }

    fn intercept<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            match self.gate.admit(&req) {
                Admission::Pass => next.run(cx, req, res).await,
                Admission::Reject => {
                    warn!(request_id = cx.request_id(), path = req.path(), "request rate limited");
                    Response::status(StatusCode::TOO_MANY_REQUESTS).write_to(res);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new(http::Method::GET, "/api/v2/calls")
    }

    #[test]
    fn passes_without_trigger() {
        assert_eq!(HeaderTrigger::default().admit(&request()), Admission::Pass);
    }

    #[test]
    fn passes_with_empty_trigger() {
        let req = request().with_header(RATE_LIMIT_HEADER, "");
        assert_eq!(HeaderTrigger::default().admit(&req), Admission::Pass);
    }

    #[test]
    fn rejects_non_empty_trigger() {
        let req = request().with_header("X-RateLimit-Me", "1");
        assert_eq!(HeaderTrigger::default().admit(&req), Admission::Reject);
    }
}
