//! Built-in health-check handlers.
//!
//! Every [`Registry`](crate::Registry) is seeded with two probes before any
//! route source loads, so they answer even when the routes tree is empty or
//! fails to load entirely:
//!
//! | Probe | Path | Body |
//! |---|---|---|
//! | **Liveness** | `/health` | `{"status":"ok","ts":<ms>,"up":<seconds>}` |
//! | **Readiness** | `/health/ready` | `{"status":"ready","ts":<ms>}` |
//!
//! Both answer any method with `200 OK`. A route file at `health.rs` or
//! `health/ready.rs` replaces the built-in, e.g. to gate readiness on a
//! database connection.

use std::sync::LazyLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

use crate::{Context, Request};

static STARTED: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Marks the process start for the liveness uptime. Called when the server
/// starts; otherwise uptime counts from the first probe.
pub(crate) fn mark_started() {
    LazyLock::force(&STARTED);
}

/// Liveness probe: if the process can answer HTTP at all, it is alive.
pub async fn liveness(_req: Request, _ctx: Context) -> Value {
    json!({
        "status": "ok",
        "ts": now_millis(),
        "up": STARTED.elapsed().as_secs_f64(),
    })
}

/// Readiness probe (default implementation): always ready.
pub async fn readiness(_req: Request, _ctx: Context) -> Value {
    json!({ "status": "ready", "ts": now_millis() })
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
