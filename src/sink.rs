//! The response side of the transport seam.
//!
//! Finishers write through a [`ResponseSink`]: a status writer, a header
//! map and a byte writer, nothing else. [`HttpSink`] is the implementation
//! the built-in server uses; it buffers everything and converts into an
//! `http::Response` at the end of dispatch. Tests and alternative
//! transports supply their own sink.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;
use tracing::warn;

/// Where a finisher writes the terminal response.
///
/// One status, any number of headers, body bytes. `write_body` is the only
/// fallible operation; a sink that rejects a write gets a warning logged
/// against it, never a panic.
pub trait ResponseSink: Send {
    fn write_status(&mut self, code: u16);

    fn insert_header(&mut self, name: &str, value: &str);

    fn write_body(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// Buffered sink backing the built-in hyper server.
///
/// Defaults to status 200 with no headers and no body, the same resting
/// state an `http.ResponseWriter` has before anyone touches it.
#[derive(Debug)]
pub struct HttpSink {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpSink {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts the buffered response into the hyper-facing form.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut res = Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        *res.headers_mut() = self.headers;
        res
    }
}

impl Default for HttpSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for HttpSink {
    fn write_status(&mut self, code: u16) {
        self.status = code;
    }

    fn insert_header(&mut self, name: &str, value: &str) {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %name, "invalid header name: {e}");
                return;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %name, "invalid header value: {e}");
                return;
            }
        };
        self.headers.insert(name, value);
    }

    fn write_body(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.body.extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_200_empty() {
        let sink = HttpSink::new();
        assert_eq!(sink.status(), 200);
        assert!(sink.body().is_empty());
        assert!(sink.headers().is_empty());
    }

    #[test]
    fn records_status_headers_body() {
        let mut sink = HttpSink::new();
        sink.write_status(201);
        sink.insert_header("location", "/users/99");
        sink.write_body(b"created").unwrap();
        assert_eq!(sink.status(), 201);
        assert_eq!(sink.headers().get("location").unwrap(), "/users/99");
        assert_eq!(sink.body(), b"created");
    }

    #[test]
    fn invalid_header_is_skipped_not_fatal() {
        let mut sink = HttpSink::new();
        sink.insert_header("bad name", "v");
        sink.insert_header("x-ok", "line\nbreak");
        assert!(sink.headers().is_empty());
    }

    #[test]
    fn into_response_carries_everything() {
        let mut sink = HttpSink::new();
        sink.write_status(204);
        sink.insert_header("x-test", "yes");
        let res = sink.into_response();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(res.headers().get("x-test").unwrap(), "yes");
    }

    #[test]
    fn out_of_range_status_degrades_to_500() {
        let mut sink = HttpSink::new();
        sink.write_status(9999);
        assert_eq!(sink.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
