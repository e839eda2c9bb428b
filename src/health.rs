//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on your router:
//!
//! ```rust,no_run
//! use kiroku::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Both run through the normal finisher path, so probes show up in logs
//! and metrics like any other request. Override `readiness` with your own
//! handler to gate on dependency availability.

use crate::finish::Finished;
use crate::lifecycle::Exchange;

/// Liveness probe handler. Always `200 OK` with body `"ok"`: if the
/// process can respond to HTTP at all, it is alive.
pub async fn liveness(ex: Exchange) -> Finished {
    ex.ok("ok")
}

/// Readiness probe handler (default implementation). Always `200 OK` with
/// body `"ready"`; replace it if your application needs a warm-up period.
pub async fn readiness(ex: Exchange) -> Finished {
    ex.ok("ready")
}
