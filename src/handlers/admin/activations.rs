use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::Serialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::licensing::binder::{self, ActivationChange};
use crate::middleware::AdminContext;
use crate::util::extract_request_info;

#[derive(Debug, Serialize)]
pub struct DeactivationResponse {
    #[serde(flatten)]
    pub change: ActivationChange,
    pub warning: &'static str,
}

/// DELETE /activations/{id}
/// Frees the slot. The machine can bind again on its next request unless it
/// is blacklisted instead.
pub async fn deactivate_activation(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeactivationResponse>> {
    let mut conn = state.db.get()?;
    let client = extract_request_info(&headers);
    let change = binder::deactivate(&mut conn, &state.engine, &id, ctx.actor.as_deref(), &client)?;

    Ok(Json(DeactivationResponse {
        change,
        warning: "The machine may register again on its next validation. Blacklist it to block it permanently.",
    }))
}

/// POST /activations/{id}/blacklist
pub async fn blacklist_activation(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ActivationChange>> {
    let mut conn = state.db.get()?;
    let client = extract_request_info(&headers);
    let change = binder::blacklist(&mut conn, &state.engine, &id, ctx.actor.as_deref(), &client)?;
    Ok(Json(change))
}
