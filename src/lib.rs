//! # kiroku
//!
//! Per-request instrumentation for HTTP services. Every response logged
//! and metered, exactly once, off the hot path. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! Handlers receive an [`Exchange`] — one captured request — and must
//! return a [`Finished`], and the only way to make one is to run a
//! finisher ([`ok`](Exchange::ok), [`json`](Exchange::json),
//! [`no_content`](Exchange::no_content), ...). Each finisher writes the
//! response, emits one enriched log line at a severity matching the status
//! code, and enqueues a metrics event on a bounded queue drained by a
//! background worker. Forgetting to log a response is a type error, and a
//! slow metrics backend cannot slow a response down.
//!
//! What the exchange does for you up front:
//!
//! - **Body capture, once** — the body is drained at capture time and
//!   rebuilt, so [`Exchange::body`] is repeatable and downstream readers
//!   of [`Exchange::request`] still see every byte.
//! - **Enriched logs** — method, host, route template, duration, request
//!   id, session fields, query and form data, all on every line, empty
//!   fields skipped. One enrichment point, [`Exchange::log`].
//! - **Typed inputs** — [`query_value`](Exchange::query_value),
//!   [`path_value`](Exchange::path_value),
//!   [`cookie_value`](Exchange::cookie_value) return a [`Value`]: a raw
//!   string with best-effort conversions where missing and malformed both
//!   read as zero, and strict `parse_*` variants when the difference
//!   matters.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiroku::{Exchange, Finished, Router, Server, StatusCode, Telemetry};
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     let telemetry = Arc::new(
//!         Telemetry::builder()
//!             .on_response(|route, status, elapsed| {
//!                 // feed your metrics pipeline here
//!                 let _ = (route, status, elapsed);
//!             })
//!             .build(),
//!     );
//!
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .delete("/users/{id}", delete_user);
//!
//!     Server::bind("0.0.0.0:3000")
//!         .telemetry(telemetry)
//!         .serve(app)
//!         .await
//!         .unwrap();
//! }
//!
//! async fn get_user(ex: Exchange) -> Finished {
//!     let id = ex.path_value("id").to_u64();
//!     ex.json(StatusCode::OK, &serde_json::json!({ "id": id }))
//! }
//!
//! async fn delete_user(ex: Exchange) -> Finished {
//!     ex.no_content()
//! }
//! ```

mod context;
mod error;
mod finish;
mod handler;
mod lifecycle;
mod router;
mod server;
mod sink;
mod telemetry;
mod value;

pub mod health;

pub use context::RequestContext;
pub use error::Error;
pub use finish::{ErrorResponse, Finished, severity};
pub use handler::Handler;
pub use lifecycle::{Exchange, LogEntry, Peer, RouteInfo};
pub use router::Router;
pub use server::Server;
pub use sink::{HttpSink, ResponseSink};
pub use telemetry::{RequestHook, ResponseHook, Telemetry, TelemetryBuilder};
pub use value::Value;

// The http types that appear in kiroku's own API.
pub use http::{Method, StatusCode};
