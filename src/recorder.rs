//! Observational wrapper around a [`ResponseWriter`].

use http::header::HeaderMap;
use http::StatusCode;

use crate::response::ResponseWriter;

/// Records the final status and body size of a response while forwarding
/// every call, unmodified, to the wrapped writer.
///
/// The recorder borrows the writer for the remainder of the chain, so it is
/// request-scoped by construction. Status is `200 OK` until an explicit
/// status write; after the first write (status or body) it is fixed, the
/// same way the transport fixes it.
pub struct ResponseRecorder<'w> {
    inner: &'w mut dyn ResponseWriter,
    status: StatusCode,
    bytes_written: usize,
    written: bool,
}

impl<'w> ResponseRecorder<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self { inner, status: StatusCode::OK, bytes_written: 0, written: false }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn bytes_written(&self) -> usize { self.bytes_written }
    pub fn written(&self) -> bool { self.written }
}

impl ResponseWriter for ResponseRecorder<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if !self.written {
            self.status = status;
            self.written = true;
        }
        self.inner.write_status(status);
    }

    fn write_body(&mut self, chunk: &[u8]) -> usize {
        self.written = true;
        let n = self.inner.write_body(chunk);
        self.bytes_written += n;
        n
    }
}
