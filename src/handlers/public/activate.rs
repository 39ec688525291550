use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::license_file;
use crate::licensing::HardwareDescriptor;
use crate::licensing::binder::{self, BindOutcome, BindRequest, LicenseLookup};
use crate::util::extract_request_info;

/// Body of `/activate` and `/validate`.
#[derive(Debug, Deserialize)]
pub struct ActivationRequest {
    pub serial_number: String,
    pub machine_code: String,
    #[serde(flatten)]
    pub hardware: HardwareDescriptor,
    #[serde(default)]
    pub app_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivationResponse {
    pub status: &'static str,
    pub message: String,
    pub is_new: bool,
    pub hardware_changed: bool,
    /// Base64 `.lic` content for the client to store
    pub license_file_content: String,
}

fn bind_request(state: &AppState, headers: &HeaderMap, body: &ActivationRequest) -> Result<(BindOutcome, String)> {
    let mut conn = state.db.get()?;
    let client = extract_request_info(headers);

    let outcome = binder::bind(
        &mut conn,
        &state.engine,
        &BindRequest {
            license: LicenseLookup::Serial(body.serial_number.trim()),
            machine_code: &body.machine_code,
            hardware: &body.hardware,
            app_version: body.app_version.as_deref(),
            client: &client,
        },
    )?;

    let customer = queries::get_customer_by_id(&conn, &outcome.license.customer_id)?
        .ok_or_else(|| AppError::Internal("Customer of license missing".into()))?;
    let content = license_file::build(
        &state.license_keys,
        &outcome.license,
        &customer,
        &outcome.activation.machine_code,
        Some(&outcome.activation.hardware()),
        outcome.activation.app_version.as_deref(),
    )?;
    let content = String::from_utf8(content)
        .map_err(|e| AppError::Internal(format!("License file is not UTF-8: {}", e)))?;

    Ok((outcome, content))
}

/// POST /activate
pub async fn activate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ActivationRequest>,
) -> Result<Json<ActivationResponse>> {
    let (outcome, license_file_content) = bind_request(&state, &headers, &body)?;

    let message = if outcome.is_new {
        "License activated successfully."
    } else {
        "License already activated on this machine."
    };
    Ok(Json(ActivationResponse {
        status: "success",
        message: message.to_string(),
        is_new: outcome.is_new,
        hardware_changed: outcome.hardware_changed(),
        license_file_content,
    }))
}

/// POST /validate
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ActivationRequest>,
) -> Result<Json<ActivationResponse>> {
    let (outcome, license_file_content) = bind_request(&state, &headers, &body)?;

    let message = if outcome.hardware_changed() {
        "License is valid. Hardware changes were recorded."
    } else {
        "License is valid."
    };
    Ok(Json(ActivationResponse {
        status: "success",
        message: message.to_string(),
        is_new: outcome.is_new,
        hardware_changed: outcome.hardware_changed(),
        license_file_content,
    }))
}
