//! Correlation id interceptor.
//!
//! Every request leaving the gateway carries an id that backends and
//! downstream services log alongside their own records. An incoming non-empty
//! id is propagated untouched; otherwise a UUID v4 is assigned. The id is
//! also echoed on the response.

use http::header::{HeaderName, HeaderValue};
use uuid::Uuid;

use super::{BoxFuture, Interceptor, Next};
use crate::context::RequestContext;
use crate::request::Request;
use crate::response::ResponseWriter;

/// The default correlation header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestId {
    header: HeaderName,
}

impl RequestId {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// Existing non-empty id, or a freshly generated one written onto the
    /// request headers.
    fn assign(&self, req: &mut Request) -> HeaderValue {
        if let Some(existing) = req.headers().get(&self.header).filter(|v| !v.is_empty()) {
            return existing.clone();
        }
        let value = HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("invalid-uuid"));
        req.headers_mut().insert(self.header.clone(), value.clone());
        value
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new(HeaderName::from_static(REQUEST_ID_HEADER))
    }
}

impl Interceptor for RequestId {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn intercept<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        mut req: Request,
        res: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let id = self.assign(&mut req);
            cx.set_request_id(String::from_utf8_lossy(id.as_bytes()));
            res.headers_mut().insert(self.header.clone(), id);
            next.run(cx, req, res).await;
        })
    }
}
