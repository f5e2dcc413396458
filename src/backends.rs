//! Demo backends served by the `apigate` binary.
//!
//! Handlers only log which backend answered; a real deployment replaces
//! these trees with proxies to the actual services.

use apigate::{Method, Request, Response, RouteTree};
use tracing::info;

/// Primary backend: coarse resources, any method.
pub fn primary() -> RouteTree {
    RouteTree::new()
        .any("/webhooks", webhooks)
        .any("/tasks", tasks)
}

/// Secondary backend: GraphQL-fronted resources with per-method handlers.
pub fn secondary() -> RouteTree {
    RouteTree::new()
        .on(Method::Get,   "/calls",                list_calls)
        .on(Method::Post,  "/calls",                create_call)
        .on(Method::Patch, "/calls/{id}",           patch_call)
        .on(Method::Get,   "/webhooks",             list_webhooks)
        .on(Method::Get,   "/webhooks/{id:[0-9]+}", get_webhook)
}

async fn webhooks(req: Request) -> &'static str {
    info!(method = %req.method(), "webhooks (primary)");
    "webhooks primary"
}

async fn tasks(req: Request) -> &'static str {
    info!(method = %req.method(), "tasks (primary)");
    "tasks primary"
}

async fn list_calls(_req: Request) -> &'static str {
    info!("calls collection (secondary)");
    "calls collection secondary"
}

async fn create_call(_req: Request) -> &'static str {
    info!("calls post (secondary)");
    "calls post secondary"
}

async fn patch_call(req: Request) -> String {
    let id = req.param("id").unwrap_or_default();
    info!(id, "calls patch (secondary)");
    format!("calls patch {id} secondary")
}

async fn list_webhooks(_req: Request) -> &'static str {
    info!("webhooks collection (secondary)");
    "webhooks collection secondary"
}

async fn get_webhook(req: Request) -> Response {
    let id = req.param("id").unwrap_or_default();
    info!(id, "webhook by id (secondary)");
    Response::json(format!(r#"{{"id":{id},"backend":"secondary"}}"#))
}
