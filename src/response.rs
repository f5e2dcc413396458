//! Outgoing responses and the writer they are committed to.
//!
//! Handlers build a [`Response`] value. The dispatcher commits it to a
//! [`ResponseWriter`], the surface interceptors observe and short-circuit
//! through. [`BufferedWriter`] is the transport side: it collects what was
//! written and becomes the `http::Response` hyper sends.

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

enum ContentType {
    Json,
    Text,
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use apigate::Response;
/// use http::StatusCode;
///
/// Response::text("calls collection");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/calls/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK` with `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().finish(ContentType::Json.as_str(), body.into())
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: code }
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Commits the response: headers first, then the status line, then the
    /// body (skipped when empty).
    pub fn write_to(self, writer: &mut dyn ResponseWriter) {
        writer.headers_mut().extend(self.headers);
        writer.write_status(self.status);
        if !self.body.is_empty() {
            writer.write_body(&self.body);
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Invalid names or values are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json.as_str(), body.into())
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), Bytes::from(body.into()))
    }

    fn finish(mut self, content_type: &'static str, body: Bytes) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { body, headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`]. Handlers may return any implementor.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for () {
    fn into_response(self) -> Response { Response::status(StatusCode::OK) }
}

/// Return a bare status from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The outbound side of a request, as seen by interceptors.
///
/// Transport semantics: the first status write commits the status line and
/// later status writes are ignored; a body write before any status write
/// commits `200 OK`.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_status(&mut self, status: StatusCode);

    /// Appends body bytes, returning how many were accepted.
    fn write_body(&mut self, chunk: &[u8]) -> usize;
}

/// In-memory transport writer. One per request.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, or `200 OK` when nothing was written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let status = self.status();
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        match self.status {
            Some(committed) => {
                tracing::debug!(%committed, ignored = %status, "superfluous status write");
            }
            None => self.status = Some(status),
        }
    }

    fn write_body(&mut self, chunk: &[u8]) -> usize {
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(chunk);
        chunk.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_write_wins() {
        let mut writer = BufferedWriter::new();
        writer.write_status(StatusCode::TOO_MANY_REQUESTS);
        writer.write_status(StatusCode::OK);
        assert_eq!(writer.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn body_write_commits_ok() {
        let mut writer = BufferedWriter::new();
        assert_eq!(writer.write_body(b"hello"), 5);
        writer.write_status(StatusCode::NOT_FOUND);

        let response = writer.into_http();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn write_to_copies_headers_status_and_body() {
        let mut writer = BufferedWriter::new();
        Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/calls/42")
            .json(r#"{"id":42}"#)
            .write_to(&mut writer);

        assert_eq!(writer.status(), StatusCode::CREATED);
        assert_eq!(writer.headers()["location"], "/calls/42");
        assert_eq!(writer.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(writer.body(), br#"{"id":42}"#);
    }
}
