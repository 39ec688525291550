mod activate;
mod deactivate;

pub use activate::*;
pub use deactivate::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Client-facing endpoints. Rate limiting is layered on by the binary.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/activate", post(activate))
        .route("/validate", post(validate))
        .route("/deactivate", post(deactivate))
}
