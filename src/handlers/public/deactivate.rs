use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::licensing::binder;
use crate::util::extract_request_info;

#[derive(Debug, Deserialize)]
pub struct DeactivationRequest {
    pub serial_number: String,
    pub machine_code: String,
}

#[derive(Debug, Serialize)]
pub struct DeactivationResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// POST /deactivate
/// Release this machine's slot so the license can move to another machine.
pub async fn deactivate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DeactivationRequest>,
) -> Result<Json<DeactivationResponse>> {
    let mut conn = state.db.get()?;
    let client = extract_request_info(&headers);
    binder::deactivate_by_machine(
        &mut conn,
        &state.engine,
        body.serial_number.trim(),
        &body.machine_code,
        &client,
    )?;

    Ok(Json(DeactivationResponse {
        status: "success",
        message: "License deactivated on this machine.",
    }))
}
