mod activations;
mod events;
mod license_file;
mod licenses;

pub use activations::*;
pub use events::*;
pub use license_file::*;
pub use licenses::*;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Licenses
        .route("/licenses", get(list_licenses).post(create_license))
        .route(
            "/licenses/{id}",
            get(get_license).put(update_license).delete(delete_license),
        )
        .route("/licenses/{id}/renew", post(renew_license))
        .route("/licenses/{id}/status", post(set_license_status))
        // Activations
        .route(
            "/licenses/{id}/activations",
            get(list_license_activations).post(create_manual_activation),
        )
        .route("/activations/{id}", delete(deactivate_activation))
        .route("/activations/{id}/blacklist", post(blacklist_activation))
        // Events
        .route("/licenses/{id}/events", get(list_license_events))
        .route("/licenses/{id}/events/unconfirmed", get(list_unconfirmed_events))
        .route(
            "/licenses/{id}/events/unconfirmed/count",
            get(count_unconfirmed_events),
        )
        .route("/events", get(list_events))
        .route("/events/suspicious", get(list_suspicious_events))
        .route("/events/confirm", post(confirm_events))
        .route("/events/{id}/confirm", post(confirm_event))
        // License files
        .route(
            "/license-file/{license_id}/{machine_code}",
            get(download_license_file),
        )
        .layer(middleware::from_fn_with_state(state, admin_auth))
}
