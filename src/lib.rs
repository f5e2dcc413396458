//! # apigate
//!
//! The dispatch and middleware core of a small API gateway. Each request
//! under the gateway prefix is:
//!
//! 1. given a routing decision from the `X-Route-To` header (`GQL`, any
//!    case, selects the secondary backend; anything else the primary),
//! 2. tagged with a correlation id (`X-Request-Id`, generated if absent),
//! 3. passed through a rate gate (`X-RateLimit-Me` present ⇒ 429),
//! 4. dispatched to exactly one of two route trees,
//! 5. logged once with its final status and endpoint label.
//!
//! Anything outside the prefix is answered 404 and logged as `non-proxied`.
//!
//! The routing decision lives in a per-request [`RequestContext`], never on
//! the shared router, so concurrent requests cannot see each other's choice.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use apigate::{Gateway, Method, Request, RouteTree, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), apigate::Error> {
//!     let gateway = Gateway::builder()
//!         .primary(RouteTree::new().any("/webhooks", webhooks))
//!         .secondary(
//!             RouteTree::new()
//!                 .on(Method::Get, "/calls", list_calls)
//!                 .on(Method::Get, "/webhooks/{id:[0-9]+}", get_webhook),
//!         )
//!         .build()?;
//!
//!     Server::bind("0.0.0.0:3000".parse().unwrap()).serve(gateway).await
//! }
//!
//! async fn webhooks(_req: Request) -> &'static str { "webhooks" }
//! async fn list_calls(_req: Request) -> &'static str { "calls" }
//! async fn get_webhook(req: Request) -> String {
//!     format!("webhook {}", req.param("id").unwrap_or_default())
//! }
//! ```

mod config;
mod context;
mod dispatch;
mod error;
mod gateway;
mod handler;
mod method;
mod recorder;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod telemetry;

pub use config::{GatewayConfig, LogFormat};
pub use context::{Endpoint, RequestContext, RoutingDecision};
pub use error::Error;
pub use gateway::{Gateway, GatewayBuilder};
pub use handler::Handler;
pub use method::Method;
pub use recorder::ResponseRecorder;
pub use request::Request;
pub use response::{BufferedWriter, IntoResponse, Response, ResponseBuilder, ResponseWriter};
pub use router::{RouteMatch, RouteMatcher, RouteTree};
pub use server::Server;
