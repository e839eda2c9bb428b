//! HTTP server, dispatch and graceful shutdown.
//!
//! The serve loop is deliberately thin: accept, hand the connection to
//! hyper, dispatch each request through the router and into an
//! [`Exchange`]. The interesting guarantees live elsewhere; what this
//! module adds is ordering at the edges.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()` — no new connections.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Drains the telemetry queue, so metrics for the final requests are
//!    delivered before the process exits.
//!
//! Kubernetes sends SIGTERM and waits `terminationGracePeriodSeconds`
//! (default 30 s) before SIGKILL; set it longer than your slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::context::RequestContext;
use crate::error::Error;
use crate::lifecycle::{Exchange, Peer};
use crate::router::Router;
use crate::sink::HttpSink;
use crate::telemetry::Telemetry;

type ContextFn = dyn Fn(&HeaderMap) -> RequestContext + Send + Sync;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    telemetry: Arc<Telemetry>,
    context: Option<Arc<ContextFn>>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Telemetry defaults to disabled.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self {
            addr,
            telemetry: Arc::new(Telemetry::disabled()),
            context: None,
        }
    }

    /// Installs the instrumentation configuration every exchange will use.
    pub fn telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Installs a context extractor, run once per request against the
    /// request headers before capture. Whatever it returns becomes the
    /// exchange's [`RequestContext`]; without one, requests carry the
    /// default, all-empty context.
    pub fn context_from(
        mut self,
        extract: impl Fn(&HeaderMap) -> RequestContext + Send + Sync + 'static,
    ) -> Self {
        self.context = Some(Arc::new(extract));
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown: signal, in-flight
    /// requests drained, telemetry queue drained.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);

        info!(addr = %self.addr, "kiroku listening");

        // JoinSet tracks every spawned connection task so shutdown can wait
        // for them all.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops the accept loop
                // even when connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let telemetry = Arc::clone(&self.telemetry);
                    let context = self.context.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection, not
                        // once per connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            let telemetry = Arc::clone(&telemetry);
                            let context = context.clone();
                            async move { dispatch(router, telemetry, context, req, remote_addr).await }
                        });

                        // auto::Builder serves HTTP/1.1 and HTTP/2 alike.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not
                // grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}
        self.telemetry.shutdown().await;

        info!("kiroku stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: routes one request, captures it, runs the handler.
///
/// The error type is [`Infallible`]: every failure is turned into a
/// response here, hyper never sees one. Unmatched paths go through the
/// same finisher machinery as everything else, so a 404 is logged and
/// metered like any response.
async fn dispatch(
    router: Arc<Router>,
    telemetry: Arc<Telemetry>,
    context: Option<Arc<ContextFn>>,
    mut req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let matched = router.lookup(req.method(), req.uri().path());
    if let Some(m) = &matched {
        m.info.clone().attach(req.extensions_mut());
    }
    Peer(remote_addr).attach(req.extensions_mut());
    if let Some(extract) = &context {
        extract(req.headers()).attach(req.extensions_mut());
    }

    let ex = Exchange::capture(req, HttpSink::new(), telemetry).await;
    let finished = match matched {
        Some(m) => m.handler.call(ex).await,
        None => ex.finish(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(finished.into_response())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal: SIGTERM or SIGINT on Unix,
/// Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
