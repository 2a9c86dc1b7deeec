use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Service status with version and the configured backends.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "jobscout-api",
        "store": state.store.backend(),
        "inference": state.inference_backend,
        "alerts": state.notifier_backend,
    }))
}
