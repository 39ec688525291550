//! Operator acknowledgement of events.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::Event;

#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    #[serde(flatten)]
    pub event: Event,
    /// False when the event had already been confirmed; the stored
    /// confirmation is returned untouched.
    pub newly_confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationFailure {
    pub event_id: String,
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BatchConfirmation {
    pub confirmed: Vec<Confirmation>,
    pub failed: Vec<ConfirmationFailure>,
}

fn require_actor(confirmed_by: &str) -> Result<&str> {
    let actor = confirmed_by.trim();
    if actor.is_empty() {
        return Err(AppError::Validation("confirmed_by is required".into()));
    }
    Ok(actor)
}

/// Confirm an event. Repeating the call is a no-op that reports
/// `newly_confirmed: false`.
pub fn confirm(conn: &Connection, event_id: &str, confirmed_by: &str) -> Result<Confirmation> {
    let actor = require_actor(confirmed_by)?;

    let newly_confirmed = queries::try_confirm_event(conn, event_id, actor)?;
    let event = queries::get_event_by_id(conn, event_id)?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

    if newly_confirmed {
        tracing::info!("Event {} confirmed by {}", event.id, actor);
    }
    Ok(Confirmation {
        event,
        newly_confirmed,
    })
}

/// Confirm each id independently. Unknown ids are reported, not fatal.
pub fn confirm_many(conn: &Connection, event_ids: &[String], confirmed_by: &str) -> Result<BatchConfirmation> {
    require_actor(confirmed_by)?;

    let mut batch = BatchConfirmation {
        confirmed: Vec::with_capacity(event_ids.len()),
        failed: Vec::new(),
    };
    for event_id in event_ids {
        match confirm(conn, event_id, confirmed_by) {
            Ok(confirmation) => batch.confirmed.push(confirmation),
            Err(err @ AppError::NotFound(_)) => batch.failed.push(ConfirmationFailure {
                event_id: event_id.clone(),
                error: err.to_string(),
                code: err.code(),
            }),
            Err(err) => return Err(err),
        }
    }
    Ok(batch)
}
