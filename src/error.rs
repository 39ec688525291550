use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input. Surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// License is expired, disabled, or past expiry while still pending.
    #[error("{0}")]
    LicenseInactive(String),

    #[error("Maximum activation limit reached ({used}/{max})")]
    QuotaExceeded { used: i32, max: i32 },

    #[error("This machine has been blacklisted for this license")]
    Blacklisted,

    #[error("Cannot change {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_transition(
        entity: &'static str,
        from: impl AsRef<str>,
        to: impl AsRef<str>,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.as_ref().to_string(),
            to: to.as_ref().to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::LicenseInactive(_) | Self::QuotaExceeded { .. } | Self::Blacklisted => {
                StatusCode::FORBIDDEN
            }
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Database(_) | Self::Pool(_) | Self::Json(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::LicenseInactive(_) => "LICENSE_INACTIVE",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::Blacklisted => "BLACKLISTED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Database(_) | Self::Pool(_) | Self::Json(_) | Self::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details go to the log, not the client
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message, "code": self.code() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
