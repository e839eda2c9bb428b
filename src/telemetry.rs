//! Instrumentation configuration and the metrics event queue.
//!
//! A [`Telemetry`] value carries everything the exchange machinery needs to
//! know about observability: the two metrics hooks (request observed,
//! response observed), whether the HTTP method is prefixed to the route
//! string handed to them, and the body-logging toggles. It is built once,
//! wrapped in an `Arc`, and handed to every exchange. There is no global
//! state to race on; reconfiguring means building another value.
//!
//! Hooks never run on the request path. Emission is a `try_send` onto a
//! bounded channel drained by a detached worker task, so a slow hook can
//! delay other hooks but never a response. A full queue drops the event and
//! says so at debug level. [`Telemetry::shutdown`] closes the channel and
//! waits for the worker, draining whatever is queued.
//!
//! With no hooks installed there is no channel and no worker; emission is a
//! no-op and construction works outside any async runtime.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Called for every request at capture time, with the metrics route.
pub type RequestHook = Box<dyn Fn(&str) + Send + Sync>;

/// Called for every finished response, with the metrics route, the status
/// code and the elapsed time since capture.
pub type ResponseHook = Box<dyn Fn(&str, u16, Duration) + Send + Sync>;

enum Event {
    Request {
        route: String,
    },
    Response {
        route: String,
        status: u16,
        elapsed: Duration,
    },
}

/// Immutable instrumentation configuration, shared across exchanges.
pub struct Telemetry {
    tx: Mutex<Option<mpsc::Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    route_with_method: bool,
    log_response_bodies: bool,
    body_log_limit: usize,
}

impl Telemetry {
    pub fn builder() -> TelemetryBuilder {
        TelemetryBuilder::default()
    }

    /// A configuration with no hooks and default toggles. Emission is a
    /// no-op. This is what a server gets when the application never wires
    /// telemetry up.
    pub fn disabled() -> Self {
        TelemetryBuilder::default().build()
    }

    pub(crate) fn route_with_method(&self) -> bool {
        self.route_with_method
    }

    pub(crate) fn log_response_bodies(&self) -> bool {
        self.log_response_bodies
    }

    pub(crate) fn body_log_limit(&self) -> usize {
        self.body_log_limit
    }

    pub(crate) fn observe_request(&self, route: String) {
        self.emit(Event::Request { route });
    }

    pub(crate) fn observe_response(&self, route: String, status: u16, elapsed: Duration) {
        self.emit(Event::Response {
            route,
            status,
            elapsed,
        });
    }

    fn emit(&self, event: Event) {
        let guard = self.tx.lock().expect("telemetry sender lock poisoned");
        let Some(tx) = guard.as_ref() else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("telemetry queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("telemetry queue closed, dropping event");
            }
        }
    }

    /// Closes the queue and waits for the worker to drain it. Call once at
    /// process shutdown; events emitted afterwards are dropped.
    pub async fn shutdown(&self) {
        drop(
            self.tx
                .lock()
                .expect("telemetry sender lock poisoned")
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .expect("telemetry worker lock poisoned")
            .take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Builder for [`Telemetry`].
pub struct TelemetryBuilder {
    on_request: Option<RequestHook>,
    on_response: Option<ResponseHook>,
    route_with_method: bool,
    log_response_bodies: bool,
    body_log_limit: usize,
    queue_depth: usize,
}

impl Default for TelemetryBuilder {
    fn default() -> Self {
        Self {
            on_request: None,
            on_response: None,
            route_with_method: false,
            log_response_bodies: true,
            body_log_limit: 1 << 20,
            queue_depth: 256,
        }
    }
}

impl TelemetryBuilder {
    /// Hook invoked once per captured request.
    pub fn on_request(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_request = Some(Box::new(hook));
        self
    }

    /// Hook invoked once per finished response.
    pub fn on_response(
        mut self,
        hook: impl Fn(&str, u16, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_response = Some(Box::new(hook));
        self
    }

    /// Prefix the HTTP method to the route string handed to the hooks
    /// (`GET /users/{id}` instead of `/users/{id}`).
    pub fn route_with_method(mut self, enabled: bool) -> Self {
        self.route_with_method = enabled;
        self
    }

    /// Attach successful response bodies to the response log line.
    /// Defaults to on.
    pub fn log_response_bodies(mut self, enabled: bool) -> Self {
        self.log_response_bodies = enabled;
        self
    }

    /// Size ceiling, in bytes, above which request and response bodies are
    /// left out of log lines. Defaults to 1 MiB.
    pub fn body_log_limit(mut self, bytes: usize) -> Self {
        self.body_log_limit = bytes;
        self
    }

    /// Capacity of the event queue. Defaults to 256.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Builds the configuration. If any hook is installed this spawns the
    /// drain worker and therefore must run inside a tokio runtime; a
    /// hook-free build spawns nothing.
    pub fn build(self) -> Telemetry {
        let (tx, worker) = if self.on_request.is_some() || self.on_response.is_some() {
            let (tx, mut rx) = mpsc::channel(self.queue_depth);
            let on_request = self.on_request;
            let on_response = self.on_response;
            let worker = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        Event::Request { route } => {
                            if let Some(hook) = &on_request {
                                hook(&route);
                            }
                        }
                        Event::Response {
                            route,
                            status,
                            elapsed,
                        } => {
                            if let Some(hook) = &on_response {
                                hook(&route, status, elapsed);
                            }
                        }
                    }
                }
            });
            (Some(tx), Some(worker))
        } else {
            (None, None)
        };

        Telemetry {
            tx: Mutex::new(tx),
            worker: Mutex::new(worker),
            route_with_method: self.route_with_method,
            log_response_bodies: self.log_response_bodies,
            body_log_limit: self.body_log_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // No runtime here on purpose: a hook-free build must not need one.
    #[test]
    fn hook_free_build_is_inert() {
        let telemetry = Telemetry::disabled();
        telemetry.observe_request("/x".to_owned());
        telemetry.observe_response("/x".to_owned(), 200, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn hooks_observe_queued_events_after_shutdown() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(Mutex::new(Vec::new()));
        let (req_log, resp_log) = (Arc::clone(&requests), Arc::clone(&responses));

        let telemetry = Telemetry::builder()
            .on_request(move |route| req_log.lock().unwrap().push(route.to_owned()))
            .on_response(move |route, status, elapsed| {
                resp_log
                    .lock()
                    .unwrap()
                    .push((route.to_owned(), status, elapsed))
            })
            .build();

        for i in 0..10 {
            telemetry.observe_request(format!("/r/{i}"));
            telemetry.observe_response(format!("/r/{i}"), 200, Duration::from_millis(i));
        }
        telemetry.shutdown().await;

        assert_eq!(requests.lock().unwrap().len(), 10);
        let responses = responses.lock().unwrap();
        assert_eq!(responses.len(), 10);
        assert_eq!(responses[3].0, "/r/3");
        assert_eq!(responses[3].1, 200);
    }

    #[tokio::test]
    async fn emission_after_shutdown_is_dropped() {
        let telemetry = Telemetry::builder().on_request(|_| {}).build();
        telemetry.shutdown().await;
        telemetry.observe_request("/late".to_owned());
    }
}
