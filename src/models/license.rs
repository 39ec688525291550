use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::Activation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseStatus {
    Pending,
    Active,
    Expired,
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Network,
    Standalone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub serial_number: String,
    pub customer_id: String,
    pub product_id: String,
    pub status: LicenseStatus,
    pub connection_type: ConnectionType,
    pub max_activations: i32,
    pub expires_at: Option<i64>,
    /// Granted features, always a subset of the product's features
    pub features: Vec<String>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// License row joined with the catalog names the admin UI displays.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseWithRelations {
    #[serde(flatten)]
    pub license: License,
    pub customer_name: String,
    pub customer_tax_id: String,
    pub product_name: String,
    pub active_activations: i32,
}

#[derive(Debug, Serialize)]
pub struct LicenseDetail {
    #[serde(flatten)]
    pub license: LicenseWithRelations,
    pub activations: Vec<Activation>,
}

fn default_max_activations() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CreateLicense {
    pub customer_id: String,
    pub product_id: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_max_activations")]
    pub max_activations: i32,
    #[serde(default)]
    pub features: Vec<String>,
    /// Only `pending` (default) and `active` are accepted at creation
    #[serde(default)]
    pub status: Option<LicenseStatus>,
    #[serde(default)]
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub notes: Option<String>,
    /// Required when `status` is `active`; bound atomically with creation
    #[serde(default)]
    pub machine_code: Option<String>,
}

/// Partial update. Status changes go through the lifecycle transition table instead.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateLicense {
    #[serde(default, deserialize_with = "super::nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub features: Option<Vec<String>>,
    #[serde(default)]
    pub connection_type: Option<ConnectionType>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub expires_at: Option<Option<i64>>,
    #[serde(default)]
    pub max_activations: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LicenseOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    UpdatedAtDesc,
    UpdatedAtAsc,
    ExpiresAtDesc,
    ExpiresAtAsc,
}

impl LicenseOrder {
    /// Parse an `order_by` parameter, falling back to newest-first for unknown values.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::CreatedAtDesc => "l.created_at DESC, l.rowid DESC",
            Self::CreatedAtAsc => "l.created_at ASC, l.rowid ASC",
            Self::UpdatedAtDesc => "l.updated_at DESC, l.rowid DESC",
            Self::UpdatedAtAsc => "l.updated_at ASC, l.rowid ASC",
            Self::ExpiresAtDesc => "l.expires_at DESC, l.rowid DESC",
            Self::ExpiresAtAsc => "l.expires_at ASC, l.rowid ASC",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LicenseQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    /// Case-insensitive substring of customer name or tax id
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<LicenseStatus>,
    #[serde(default)]
    pub order_by: Option<String>,
}
