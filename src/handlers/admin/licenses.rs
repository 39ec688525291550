use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::licensing::{binder, lifecycle};
use crate::middleware::AdminContext;
use crate::models::{
    Activation, CreateLicense, LicenseDetail, LicenseQuery, LicenseStatus, LicenseWithRelations,
    ManualActivation, UpdateLicense,
};
use crate::pagination::{Page, Paginated};
use crate::util::extract_request_info;

pub(super) fn load_detail(conn: &Connection, id: &str) -> Result<LicenseDetail> {
    let license = queries::get_license_with_relations(conn, id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    let activations = queries::list_activations_for_license(conn, id)?;
    Ok(LicenseDetail {
        license,
        activations,
    })
}

/// GET /licenses
pub async fn list_licenses(
    State(state): State<AppState>,
    Query(query): Query<LicenseQuery>,
) -> Result<Json<Paginated<LicenseWithRelations>>> {
    let conn = state.db.get()?;
    let page = Page::new(query.page, query.limit);
    let (items, total) = queries::list_licenses(&conn, &query, page)?;
    Ok(Json(Paginated::new(items, total, page)))
}

/// POST /licenses
pub async fn create_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLicense>,
) -> Result<(StatusCode, Json<LicenseDetail>)> {
    let mut conn = state.db.get()?;
    let client = extract_request_info(&headers);
    let (license, _) = lifecycle::create(&mut conn, &state.engine, &body, &client)?;
    Ok((StatusCode::CREATED, Json(load_detail(&conn, &license.id)?)))
}

/// GET /licenses/{id}
pub async fn get_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseDetail>> {
    let conn = state.db.get()?;
    Ok(Json(load_detail(&conn, &id)?))
}

/// PUT /licenses/{id}
pub async fn update_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateLicense>,
) -> Result<Json<LicenseDetail>> {
    let conn = state.db.get()?;
    lifecycle::update(&conn, &id, &body)?;
    Ok(Json(load_detail(&conn, &id)?))
}

/// DELETE /licenses/{id}
pub async fn delete_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    lifecycle::delete(&conn, &id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /licenses/{id}/renew
pub async fn renew_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseDetail>> {
    let conn = state.db.get()?;
    lifecycle::renew(&conn, &id)?;
    Ok(Json(load_detail(&conn, &id)?))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
    pub status: LicenseStatus,
}

/// POST /licenses/{id}/status
pub async fn set_license_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<LicenseDetail>> {
    let conn = state.db.get()?;
    lifecycle::set_status(&conn, &id, body.status)?;
    Ok(Json(load_detail(&conn, &id)?))
}

/// GET /licenses/{id}/activations
pub async fn list_license_activations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Activation>>> {
    let conn = state.db.get()?;
    queries::get_license_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(Json(queries::list_activations_for_license(&conn, &id)?))
}

/// POST /licenses/{id}/activations
/// Bind a machine code by hand. The activation quota still applies.
pub async fn create_manual_activation(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ManualActivation>,
) -> Result<(StatusCode, Json<Activation>)> {
    let mut conn = state.db.get()?;
    let client = extract_request_info(&headers);
    let outcome = binder::bind_manual(&mut conn, &state.engine, &id, &body.machine_code, &client)?;

    tracing::info!(
        "Manual activation of {} on license {} by {}",
        outcome.activation.machine_code,
        outcome.license.serial_number,
        ctx.actor.as_deref().unwrap_or("anonymous admin")
    );
    Ok((StatusCode::CREATED, Json(outcome.activation)))
}
