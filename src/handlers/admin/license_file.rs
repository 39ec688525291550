use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Path;
use crate::license_file;
use crate::models::ActivationStatus;

#[derive(Debug, Deserialize)]
pub struct LicenseFilePath {
    pub license_id: String,
    pub machine_code: String,
}

/// GET /license-file/{license_id}/{machine_code}
/// Re-issue the license file for a machine bound to the license.
pub async fn download_license_file(
    State(state): State<AppState>,
    Path(path): Path<LicenseFilePath>,
) -> Result<Response> {
    let conn = state.db.get()?;

    let license = queries::get_license_by_id(&conn, &path.license_id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    let activation = queries::get_activation_for_machine(&conn, &license.id, &path.machine_code)?
        .filter(|a| a.status == ActivationStatus::Active)
        .ok_or_else(|| AppError::NotFound("No active activation for this machine".into()))?;
    let customer = queries::get_customer_by_id(&conn, &license.customer_id)?
        .ok_or_else(|| AppError::Internal("Customer of license missing".into()))?;

    let content = license_file::build(
        &state.license_keys,
        &license,
        &customer,
        &activation.machine_code,
        Some(&activation.hardware()),
        activation.app_version.as_deref(),
    )?;
    let file_name = license_file::file_name(&customer, queries::now());

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                license_file::content_disposition(&file_name),
            ),
        ],
        content,
    )
        .into_response())
}
