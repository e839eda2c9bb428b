//! Terminal operations on an exchange.
//!
//! Every finisher does three things, in order: writes exactly one response
//! through the sink, logs the outcome through the enriched entry with a
//! `status` field, and enqueues the response-observed telemetry event
//! (route, status, elapsed). The telemetry enqueue never blocks; the hook
//! itself runs on the telemetry worker, possibly after the handler has
//! already returned.
//!
//! Log severity follows the status code: anything below 300 is info,
//! 300 to 499 is warning, 500 and up is error. Two deliberate exceptions
//! survive from long-standing behavior: [`Exchange::finish`] logs at info
//! whatever the code says, and [`Exchange::file`] does the same.
//!
//! Finishers consume the exchange. A [`Finished`] value is the only thing
//! left afterwards, so "one terminal response per request" is not a
//! convention here, it is ownership.

use std::fmt;

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::lifecycle::Exchange;
use crate::sink::{HttpSink, ResponseSink};

/// Log severity for a status code: < 300 info, 300..=499 warning,
/// >= 500 error.
pub fn severity(status: u16) -> Level {
    if status < 300 {
        Level::INFO
    } else if status < 500 {
        Level::WARN
    } else {
        Level::ERROR
    }
}

/// Proof that a finisher ran. Carries the sink so the transport can pull
/// the written response back out.
pub struct Finished<S: ResponseSink = HttpSink> {
    sink: S,
}

impl<S: ResponseSink> Finished<S> {
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl Finished<HttpSink> {
    /// The buffered response, ready for hyper.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        self.sink.into_response()
    }
}

impl<S: ResponseSink> Exchange<S> {
    /// 200 with a plain-text body.
    pub fn ok(self, msg: impl fmt::Display) -> Finished<S> {
        self.text(StatusCode::OK, Level::INFO, msg.to_string())
    }

    /// 400 with a plain-text body, logged at warning.
    pub fn bad_request(self, msg: impl fmt::Display) -> Finished<S> {
        self.text(StatusCode::BAD_REQUEST, Level::WARN, msg.to_string())
    }

    /// 500 with a plain-text body, logged at error.
    pub fn server_error(self, msg: impl fmt::Display) -> Finished<S> {
        self.text(StatusCode::INTERNAL_SERVER_ERROR, Level::ERROR, msg.to_string())
    }

    /// Arbitrary status with a plain-text body. Logs at info regardless of
    /// the code.
    pub fn finish(self, code: StatusCode, msg: impl fmt::Display) -> Finished<S> {
        self.text(code, Level::INFO, msg.to_string())
    }

    /// 204, no body.
    pub fn no_content(mut self) -> Finished<S> {
        let code = StatusCode::NO_CONTENT.as_u16();
        self.log().with_status(code).info("response: no content");
        self.sink.write_status(code);
        self.observe(code);
        Finished { sink: self.sink }
    }

    /// Serializes `payload` and responds with it as `application/json`.
    ///
    /// A payload that will not serialize is logged and turned into a plain
    /// 500; the requested status code is discarded in that case. On
    /// success the serialized body is attached to the response log line
    /// when response-body logging is on and the body is under the ceiling.
    pub fn json<T>(mut self, code: StatusCode, payload: &T) -> Finished<S>
    where
        T: Serialize + ?Sized,
    {
        let data = match serde_json::to_vec(payload) {
            Ok(data) => data,
            Err(e) => {
                self.log()
                    .error(format!("unable to serialize response payload: {e}"));
                return self.server_error(format!("unable to serialize response payload: {e}"));
            }
        };

        self.sink.insert_header("content-type", "application/json");
        self.sink.write_status(code.as_u16());
        if let Err(e) = self.sink.write_body(&data) {
            self.log().warn(format!("unable to write response: {e}"));
            return Finished { sink: self.sink };
        }

        let mut entry = self.log().with_status(code.as_u16());
        if self.telemetry.log_response_bodies() && data.len() < self.telemetry.body_log_limit() {
            entry = entry.with_response_body(String::from_utf8_lossy(&data).into_owned());
        }
        entry.at(severity(code.as_u16()), "response");

        self.observe(code.as_u16());
        Finished { sink: self.sink }
    }

    /// Responds with raw bytes offered as a download: sets
    /// `content-disposition: attachment` with the given filename and the
    /// given content type. Logs at info regardless of the code.
    pub fn file(
        mut self,
        code: StatusCode,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Finished<S> {
        self.sink
            .insert_header("content-disposition", &format!("attachment; filename={filename}"));
        self.sink.insert_header("content-type", content_type);
        self.sink.write_status(code.as_u16());
        if let Err(e) = self.sink.write_body(data) {
            self.log().warn(format!("unable to write file response: {e}"));
            return Finished { sink: self.sink };
        }
        self.log().with_status(code.as_u16()).info("response");
        self.observe(code.as_u16());
        Finished { sink: self.sink }
    }

    /// Responds with a redirect to `location`. Reports telemetry like any
    /// finisher but skips the enriched response log line.
    pub fn redirect(mut self, code: StatusCode, location: &str) -> Finished<S> {
        self.sink.insert_header("location", location);
        self.sink.write_status(code.as_u16());
        self.observe(code.as_u16());
        Finished { sink: self.sink }
    }

    /// A structured error payload echoing this request's id, for use with
    /// [`Exchange::json`].
    pub fn error_response(&self, msg: impl fmt::Display) -> ErrorResponse {
        ErrorResponse {
            has_error: true,
            message: msg.to_string(),
            request_id: self.context.request_id().to_owned(),
        }
    }

    fn text(mut self, code: StatusCode, level: Level, msg: String) -> Finished<S> {
        self.log()
            .with_status(code.as_u16())
            .at(level, format!("response: {msg}"));
        self.sink.write_status(code.as_u16());
        if let Err(e) = self.sink.write_body(msg.as_bytes()) {
            self.log().warn(format!("unable to write response: {e}"));
        }
        self.observe(code.as_u16());
        Finished { sink: self.sink }
    }

    fn observe(&self, code: u16) {
        self.telemetry
            .observe_response(self.metrics_route(), code, self.elapsed());
    }
}

/// Error payload for JSON responses.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub has_error: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ErrorResponse {}
