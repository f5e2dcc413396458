//! Interceptor chain.
//!
//! An [`Interceptor`] sees the request on its way in and the writer on its
//! way out. It either hands control on with [`Next::run`] (exactly once) or
//! short-circuits by writing a response itself. Interceptors are composed
//! once at startup into a [`Chain`]; composition order is registration order,
//! and each interceptor wraps everything registered after it:
//!
//! ```text
//! chain [A, B, C] + terminal T
//!
//! A.before → B.before → C.before → T → C.after → B.after → A.after
//! ```
//!
//! Built-in interceptors:
//! - [`RequestId`]: assigns or propagates the correlation id
//! - [`Logging`]: records the final status and emits one access record
//! - [`RateGate`]: one pass/reject decision per request

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::request::Request;
use crate::response::ResponseWriter;

mod logging;
mod rate_gate;
mod request_id;

pub use logging::{AccessLog, AccessRecord, Logging, TracingAccessLog};
pub use rate_gate::{Admission, Gate, HeaderTrigger, RateGate};
pub use request_id::RequestId;

/// A heap-allocated, type-erased future.
///
/// `Send` lets tokio move it between worker threads; the lifetime lets it
/// borrow the request context and writer for the duration of the call.
pub type BoxFuture<'a, T = ()> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One unit of middleware logic around the rest of the chain.
pub trait Interceptor: Send + Sync + 'static {
    /// Stable name, used in debug events.
    fn name(&self) -> &'static str;

    fn intercept<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a>;
}

/// The end of a chain: whatever produces the response once every
/// interceptor has passed the request on.
pub trait Terminal: Send + Sync {
    fn call<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a>;
}

/// The remainder of the chain after the current interceptor.
///
/// Consumed by [`Next::run`], so it can be invoked at most once.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    pub fn run(
        self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                tracing::trace!(interceptor = head.name(), "entering");
                head.intercept(cx, req, res, Next { rest, terminal: self.terminal })
            }
            None => self.terminal.call(cx, req, res),
        }
    }
}

/// An immutable, ordered list of interceptors.
#[derive(Clone, Default)]
pub struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor. It runs inside every interceptor added before it.
    pub fn with(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub(crate) fn with_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Drives one request through the chain and into `terminal`.
    pub fn run<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        req: Request,
        res: &'a mut dyn ResponseWriter,
        terminal: &'a dyn Terminal,
    ) -> BoxFuture<'a> {
        Next { rest: &self.interceptors, terminal }.run(cx, req, res)
    }
}
