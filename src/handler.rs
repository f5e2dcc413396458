//! Backend handler trait and type erasure.
//!
//! A route tree stores handlers of many concrete types side by side, so each
//! one is erased behind `Arc<dyn ErasedHandler>`:
//!
//! ```text
//! async fn list_calls(req: Request) -> Response { … }
//!        ↓ RouteTree::on(Method::Get, "/calls", list_calls)
//! list_calls.into_boxed_handler()  → Arc<FnHandler<_>>
//!        ↓ at dispatch
//! handler.call(req)                → BoxFuture<'static, Response>
//! ```
//!
//! Dispatch costs one `Arc` clone and one virtual call.

use std::sync::Arc;

use crate::middleware::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Response>;
}

/// A type-erased handler shared by every request that routes to it.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid backend handler: any
/// `async fn(Request) -> impl IntoResponse`.
///
/// Sealed; only the blanket impl below satisfies it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
