//! Health check endpoints.

use std::time::Duration;

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::kv::KvStore;
use crate::state::AppState;

const PROBE_KEY: &str = "health:probe";
const PROBE_TTL: Duration = Duration::from_secs(30);

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Writes and reads back a KV entry. Returns 503 Service Unavailable if the
/// store is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    let kv = state.kv();
    let probe = async {
        kv.set(PROBE_KEY, "ok", PROBE_TTL).await?;
        kv.get(PROBE_KEY).await
    };

    match probe.await {
        Ok(Some(_)) => StatusCode::OK,
        Ok(None) => {
            warn!(backend = kv.name(), "KV probe value vanished");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(e) => {
            warn!(backend = kv.name(), error = %e, "KV probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
