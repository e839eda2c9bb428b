//! One in-flight HTTP exchange.
//!
//! An [`Exchange`] is constructed at request arrival via
//! [`Exchange::capture`] and lives until a finisher consumes it. Capture
//! does the one-time expensive work up front: it drains the request body
//! fully into memory and rebuilds the request with a replayable copy, so
//! the body can be read any number of times afterwards, by this layer or by
//! anything downstream. Everything the transport resolved about the request
//! (route template, path parameters, peer address, identity context)
//! arrives as typed extensions on the request itself.
//!
//! [`Exchange::log`] is the single enrichment point: every log line about a
//! request, at any severity, goes through the [`LogEntry`] it returns, so
//! the fields are the same everywhere.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HOST};
use http::{Extensions, HeaderMap, Method, Request, Uri, Version};
use http_body_util::{BodyExt, Full};
use tracing::{Level, error};
use url::form_urlencoded;

use crate::context::RequestContext;
use crate::sink::{HttpSink, ResponseSink};
use crate::telemetry::Telemetry;
use crate::value::Value;

// ── Transport-supplied extensions ─────────────────────────────────────────────

/// The route the transport resolved for this request: the registered
/// template and the decoded path parameters.
#[derive(Clone, Debug, Default)]
pub struct RouteInfo {
    pub template: String,
    pub params: Vec<(String, String)>,
}

impl RouteInfo {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attach(self, extensions: &mut Extensions) {
        extensions.insert(self);
    }
}

/// The remote peer address, as seen by the transport.
#[derive(Clone, Copy, Debug)]
pub struct Peer(pub SocketAddr);

impl Peer {
    pub fn attach(self, extensions: &mut Extensions) {
        extensions.insert(self);
    }
}

// ── Exchange ──────────────────────────────────────────────────────────────────

/// One HTTP exchange: the captured request plus the response sink it will
/// be finished through.
///
/// Finishers (see the methods in `finish`) take `self` by value, so the
/// type system guarantees a finished exchange cannot be written to again.
pub struct Exchange<S: ResponseSink = HttpSink> {
    pub(crate) request: Request<Full<Bytes>>,
    pub(crate) sink: S,
    pub(crate) body: Bytes,
    pub(crate) route: RouteInfo,
    pub(crate) remote_addr: String,
    pub(crate) begin: Instant,
    pub(crate) context: RequestContext,
    pub(crate) telemetry: Arc<Telemetry>,
}

impl<S: ResponseSink> Exchange<S> {
    /// Captures one inbound request.
    ///
    /// Drains the body fully, then rebuilds the request around a fresh
    /// [`Full`] copy so any downstream consumer still reads the complete
    /// original bytes. If the body cannot be read, the error is logged and
    /// the exchange proceeds with an empty body; construction itself never
    /// fails. Fires the request-observed telemetry event (a non-blocking
    /// enqueue) and emits a debug log line.
    pub async fn capture<B>(request: Request<B>, sink: S, telemetry: Arc<Telemetry>) -> Self
    where
        B: http_body::Body,
        B::Error: fmt::Display,
    {
        let begin = Instant::now();
        let (mut parts, raw_body) = request.into_parts();

        let body = match raw_body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                error!(
                    method = %parts.method,
                    request_uri = %parts.uri,
                    "unable to read request body: {e}"
                );
                Bytes::new()
            }
        };

        let route = parts.extensions.remove::<RouteInfo>().unwrap_or_default();
        let remote_addr = parts
            .extensions
            .get::<Peer>()
            .map(|p| p.0.to_string())
            .unwrap_or_default();
        let context = RequestContext::from_extensions(&parts.extensions);
        let request = Request::from_parts(parts, Full::new(body.clone()));

        let exchange = Self {
            request,
            sink,
            body,
            route,
            remote_addr,
            begin,
            context,
            telemetry,
        };
        exchange.telemetry.observe_request(exchange.metrics_route());
        exchange.log().debug("request");
        exchange
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// The resolved route template; empty when the transport resolved none.
    pub fn route(&self) -> &str {
        &self.route.template
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Time since capture began.
    pub fn elapsed(&self) -> Duration {
        self.begin.elapsed()
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Replaces the bound context. For middleware that resolves identity
    /// after capture, and for tests.
    pub fn set_context(&mut self, context: RequestContext) {
        self.context = context;
    }

    /// The captured body, unchanged, as many times as asked.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The rebuilt request. Its body is a replayable copy yielding the full
    /// original bytes, so downstream consumers are none the wiser about the
    /// capture.
    pub fn request(&self) -> &Request<Full<Bytes>> {
        &self.request
    }

    // ── Typed input readers ───────────────────────────────────────────────────

    /// The named query parameter, as a [`Value`]. Absent reads as empty.
    pub fn query_value(&self, name: &str) -> Value {
        let raw = self.request.uri().query().unwrap_or("");
        form_urlencoded::parse(raw.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| Value::from(v.into_owned()))
            .unwrap_or_default()
    }

    /// The named path parameter, as a [`Value`]. Absent reads as empty.
    pub fn path_value(&self, name: &str) -> Value {
        self.route
            .param(name)
            .map(Value::from)
            .unwrap_or_default()
    }

    /// The named cookie, as a [`Value`]. Absent reads as empty.
    pub fn cookie_value(&self, name: &str) -> Value {
        for header in self.request.headers().get_all(COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            for pair in raw.split(';') {
                if let Some((k, v)) = pair.split_once('=')
                    && k.trim() == name
                {
                    return Value::from(v.trim().trim_matches('"'));
                }
            }
        }
        Value::default()
    }

    // ── Log enrichment ────────────────────────────────────────────────────────

    /// A structured log entry pre-populated with everything known about
    /// this request. Fields that are empty (or bodies over the configured
    /// ceiling) are left out.
    pub fn log(&self) -> LogEntry {
        let limit = self.telemetry.body_log_limit();
        LogEntry {
            method: self.request.method().to_string(),
            host: self.host().to_owned(),
            proto: self.request.version(),
            remote_addr: self.remote_addr.clone(),
            request_uri: self.request.uri().to_string(),
            route: self.route.template.clone(),
            duration: self.begin.elapsed(),
            status: None,
            request_body: (!self.body.is_empty() && self.body.len() < limit)
                .then(|| String::from_utf8_lossy(&self.body).into_owned()),
            request_id: non_empty(self.context.request_id()),
            username: non_empty(self.context.session_username()),
            token: non_empty(self.context.session_token()),
            query_args: non_empty(&self.encoded_query()),
            form_data: non_empty(&self.encoded_form()),
            body: None,
        }
    }

    fn host(&self) -> &str {
        if let Some(host) = self.request.headers().get(HOST)
            && let Ok(host) = host.to_str()
        {
            return host;
        }
        self.request
            .uri()
            .authority()
            .map(|a| a.as_str())
            .unwrap_or("")
    }

    /// The query string, decoded and re-encoded with sorted keys so log
    /// output is deterministic.
    fn encoded_query(&self) -> String {
        let raw = self.request.uri().query().unwrap_or("");
        encode_sorted(form_urlencoded::parse(raw.as_bytes()))
    }

    /// The body decoded as a form, when the content type says it is one,
    /// re-encoded with sorted keys.
    fn encoded_form(&self) -> String {
        let is_form = self
            .request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if !is_form || self.body.is_empty() {
            return String::new();
        }
        encode_sorted(form_urlencoded::parse(&self.body))
    }

    pub(crate) fn metrics_route(&self) -> String {
        if self.telemetry.route_with_method() {
            format!("{} {}", self.request.method(), self.route.template)
        } else {
            self.route.template.clone()
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

fn encode_sorted<'a>(pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>) -> String {
    let mut pairs: Vec<(String, String)> = pairs
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    let mut encoder = form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        encoder.append_pair(k, v);
    }
    encoder.finish()
}

// ── LogEntry ──────────────────────────────────────────────────────────────────

/// A snapshot of one request's log fields, emitted as a single `tracing`
/// event at the severity of your choosing.
///
/// Optional fields are only recorded when present, so a request without a
/// session simply has no `username` field rather than an empty one.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub(crate) method: String,
    pub(crate) host: String,
    pub(crate) proto: Version,
    pub(crate) remote_addr: String,
    pub(crate) request_uri: String,
    pub(crate) route: String,
    pub(crate) duration: Duration,
    pub(crate) status: Option<u16>,
    pub(crate) request_body: Option<String>,
    pub(crate) request_id: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) token: Option<String>,
    pub(crate) query_args: Option<String>,
    pub(crate) form_data: Option<String>,
    pub(crate) body: Option<String>,
}

impl LogEntry {
    pub fn with_status(mut self, code: u16) -> Self {
        self.status = Some(code);
        self
    }

    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.at(Level::DEBUG, msg);
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.at(Level::INFO, msg);
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        self.at(Level::WARN, msg);
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.at(Level::ERROR, msg);
    }

    /// Emits the entry at a runtime-chosen level. `tracing` events carry
    /// their level in static metadata, hence the level fan-out.
    pub fn at(&self, level: Level, msg: impl fmt::Display) {
        let msg = msg.to_string();
        macro_rules! emit {
            ($lvl:expr) => {
                tracing::event!(
                    $lvl,
                    method = %self.method,
                    host = %self.host,
                    proto = ?self.proto,
                    remote_addr = %self.remote_addr,
                    request_uri = %self.request_uri,
                    route = %self.route,
                    duration = ?self.duration,
                    status = self.status,
                    request_body = self.request_body.as_deref(),
                    request_id = self.request_id.as_deref(),
                    username = self.username.as_deref(),
                    token = self.token.as_deref(),
                    query_args = self.query_args.as_deref(),
                    form_data = self.form_data.as_deref(),
                    body = self.body.as_deref(),
                    "{msg}"
                )
            };
        }
        if level == Level::ERROR {
            emit!(Level::ERROR);
        } else if level == Level::WARN {
            emit!(Level::WARN);
        } else if level == Level::INFO {
            emit!(Level::INFO);
        } else if level == Level::DEBUG {
            emit!(Level::DEBUG);
        } else {
            emit!(Level::TRACE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method("GET")
            .uri("http://localhost/test/uri")
            .header("host", "localhost")
            .body(Full::new(Bytes::from(body.to_owned())))
            .unwrap()
    }

    async fn capture(req: Request<Full<Bytes>>) -> Exchange {
        Exchange::capture(req, HttpSink::new(), Arc::new(Telemetry::disabled())).await
    }

    #[tokio::test]
    async fn body_capture_is_idempotent() {
        let ex = capture(request("Some body")).await;
        assert_eq!(ex.body(), b"Some body");
        assert_eq!(ex.body(), b"Some body");
    }

    #[tokio::test]
    async fn rebuilt_request_body_replays_in_full() {
        let ex = capture(request("Some body")).await;
        let replayed = ex.request().body().clone().collect().await.unwrap().to_bytes();
        assert_eq!(&replayed[..], b"Some body");
        // and the capture is unaffected
        assert_eq!(ex.body(), b"Some body");
    }

    #[tokio::test]
    async fn extensions_feed_route_peer_and_context() {
        let mut req = request("");
        RouteInfo::new("/test/{name}")
            .with_params(vec![("name".into(), "uri".into())])
            .attach(req.extensions_mut());
        Peer("127.0.0.1:12345".parse().unwrap()).attach(req.extensions_mut());
        RequestContext::new()
            .with_request_id("req-9")
            .attach(req.extensions_mut());

        let ex = capture(req).await;
        assert_eq!(ex.route(), "/test/{name}");
        assert_eq!(ex.path_value("name").as_str(), "uri");
        assert_eq!(ex.remote_addr(), "127.0.0.1:12345");
        assert_eq!(ex.context().request_id(), "req-9");
    }

    #[tokio::test]
    async fn missing_extensions_degrade_to_defaults() {
        let ex = capture(request("")).await;
        assert_eq!(ex.route(), "");
        assert_eq!(ex.remote_addr(), "");
        assert_eq!(ex.context().request_id(), "");
        assert_eq!(ex.path_value("anything").as_str(), "");
    }

    #[tokio::test]
    async fn query_values_read_typed() {
        let req = Request::builder()
            .uri("http://localhost/items?limit=25&active=true&junk=abc")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let ex = capture(req).await;
        assert_eq!(ex.query_value("limit").to_i64(), 25);
        assert!(ex.query_value("active").to_bool());
        assert_eq!(ex.query_value("junk").to_i64(), 0);
        assert_eq!(ex.query_value("missing").as_str(), "");
    }

    #[tokio::test]
    async fn cookie_values_handle_quoting_and_multiple_headers() {
        let req = Request::builder()
            .uri("http://localhost/")
            .header("cookie", "a=1; session=\"abc\"")
            .header("cookie", "b=2")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let ex = capture(req).await;
        assert_eq!(ex.cookie_value("a").to_i64(), 1);
        assert_eq!(ex.cookie_value("session").as_str(), "abc");
        assert_eq!(ex.cookie_value("b").to_i64(), 2);
        assert_eq!(ex.cookie_value("nope").as_str(), "");
    }

    #[tokio::test]
    async fn log_entry_attaches_only_present_fields() {
        let ex = capture(request("Some body")).await;
        let entry = ex.log();
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.host, "localhost");
        assert_eq!(entry.request_body.as_deref(), Some("Some body"));
        assert_eq!(entry.request_id, None);
        assert_eq!(entry.username, None);
        assert_eq!(entry.query_args, None);
        assert_eq!(entry.form_data, None);
        entry.with_status(200).info("response");
    }

    #[tokio::test]
    async fn oversized_body_stays_out_of_the_log() {
        let telemetry = Arc::new(Telemetry::builder().body_log_limit(4).build());
        let ex = Exchange::capture(request("Some body"), HttpSink::new(), telemetry).await;
        assert_eq!(ex.log().request_body, None);
        // the capture itself is unaffected by the log ceiling
        assert_eq!(ex.body(), b"Some body");
    }

    #[tokio::test]
    async fn query_and_form_are_sorted_and_reencoded() {
        let req = Request::builder()
            .method("POST")
            .uri("http://localhost/submit?b=2&a=1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from("z=last&a=first")))
            .unwrap();
        let ex = capture(req).await;
        let entry = ex.log();
        assert_eq!(entry.query_args.as_deref(), Some("a=1&b=2"));
        assert_eq!(entry.form_data.as_deref(), Some("a=first&z=last"));
    }

    #[tokio::test]
    async fn non_form_body_is_not_parsed_as_form() {
        let req = Request::builder()
            .method("POST")
            .uri("http://localhost/submit")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from("{\"a\":1}")))
            .unwrap();
        let ex = capture(req).await;
        assert_eq!(ex.log().form_data, None);
    }

    #[tokio::test]
    async fn metrics_route_respects_method_toggle() {
        let telemetry = Arc::new(Telemetry::builder().route_with_method(true).build());
        let mut req = request("");
        RouteInfo::new("/test/uri").attach(req.extensions_mut());
        let ex = Exchange::capture(req, HttpSink::new(), telemetry).await;
        assert_eq!(ex.metrics_route(), "GET /test/uri");
    }
}
