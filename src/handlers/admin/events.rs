use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::licensing::classifier;
use crate::licensing::ledger::{self, BatchConfirmation, Confirmation};
use crate::models::{ConfirmEvent, ConfirmEvents, Event, EventQuery, EventWithCustomer};
use crate::pagination::{Page, Paginated};

fn require_license(conn: &rusqlite::Connection, id: &str) -> Result<()> {
    queries::get_license_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct LicenseEventsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /licenses/{id}/events
pub async fn list_license_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LicenseEventsQuery>,
) -> Result<Json<Vec<Event>>> {
    let conn = state.db.get()?;
    require_license(&conn, &id)?;
    let events = classifier::events_for_license(&conn, &id, query.limit.unwrap_or(50))?;
    Ok(Json(events))
}

/// GET /licenses/{id}/events/unconfirmed
pub async fn list_unconfirmed_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Event>>> {
    let conn = state.db.get()?;
    require_license(&conn, &id)?;
    Ok(Json(classifier::unconfirmed_for(&conn, &id)?))
}

#[derive(Debug, Serialize)]
pub struct UnconfirmedCount {
    pub license_id: String,
    pub count: i64,
}

/// GET /licenses/{id}/events/unconfirmed/count
pub async fn count_unconfirmed_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UnconfirmedCount>> {
    let conn = state.db.get()?;
    require_license(&conn, &id)?;
    let count = classifier::unconfirmed_count_for(&conn, &id)?;
    Ok(Json(UnconfirmedCount {
        license_id: id,
        count,
    }))
}

/// GET /events
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<Json<Paginated<EventWithCustomer>>> {
    let conn = state.db.get()?;
    let page = Page::new(query.page, query.limit);
    let (items, total) = queries::list_events(&conn, &query, page)?;
    Ok(Json(Paginated::new(items, total, page)))
}

#[derive(Debug, Deserialize)]
pub struct SuspiciousQuery {
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /events/suspicious
pub async fn list_suspicious_events(
    State(state): State<AppState>,
    Query(query): Query<SuspiciousQuery>,
) -> Result<Json<Vec<EventWithCustomer>>> {
    let conn = state.db.get()?;
    let events = classifier::suspicious(
        &conn,
        query.days.unwrap_or(7),
        query.limit.unwrap_or(100),
    )?;
    Ok(Json(events))
}

/// POST /events/{id}/confirm
pub async fn confirm_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmEvent>,
) -> Result<Json<Confirmation>> {
    let conn = state.db.get()?;
    Ok(Json(ledger::confirm(&conn, &id, &body.confirmed_by)?))
}

/// POST /events/confirm
pub async fn confirm_events(
    State(state): State<AppState>,
    Json(body): Json<ConfirmEvents>,
) -> Result<Json<BatchConfirmation>> {
    let conn = state.db.get()?;
    Ok(Json(ledger::confirm_many(&conn, &body.event_ids, &body.confirmed_by)?))
}
