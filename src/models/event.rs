use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Activation,
    ReActivation,
    HardwareChange,
    Validation,
    Deactivation,
}

/// Ordered from least to most alarming.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Suspicious,
    Critical,
}

impl Severity {
    /// Severities surfaced by the suspicious-activity feed.
    pub const ALARMING: [Severity; 2] = [Severity::Suspicious, Severity::Critical];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub license_id: String,
    pub activation_id: Option<String>,
    pub serial_number: String,
    pub event_type: EventType,
    pub event_subtype: Option<String>,
    pub severity: Severity,
    pub details: Option<serde_json::Value>,
    pub machine_code: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub is_confirmed: bool,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub license_id: String,
    pub activation_id: Option<String>,
    pub serial_number: String,
    pub event_type: EventType,
    pub event_subtype: Option<String>,
    pub severity: Severity,
    pub details: Option<serde_json::Value>,
    pub machine_code: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Set to record the event as already confirmed by this actor
    pub confirmed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventWithCustomer {
    #[serde(flatten)]
    pub event: Event,
    pub customer_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEvent {
    pub confirmed_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEvents {
    pub event_ids: Vec<String>,
    pub confirmed_by: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    SeverityDesc,
    SeverityAsc,
}

const SEVERITY_RANK: &str =
    "CASE e.severity WHEN 'info' THEN 0 WHEN 'warning' THEN 1 WHEN 'suspicious' THEN 2 ELSE 3 END";

impl EventOrder {
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    pub fn sql(&self) -> String {
        match self {
            Self::CreatedAtDesc => "e.created_at DESC, e.rowid DESC".to_string(),
            Self::CreatedAtAsc => "e.created_at ASC, e.rowid ASC".to_string(),
            Self::SeverityDesc => format!("{} DESC, e.created_at DESC, e.rowid DESC", SEVERITY_RANK),
            Self::SeverityAsc => format!("{} ASC, e.created_at DESC, e.rowid DESC", SEVERITY_RANK),
        }
    }
}

/// Filters for the event log listing. Text filters are case-insensitive substrings.
#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub is_confirmed: Option<bool>,
    #[serde(default)]
    pub order_by: Option<String>,
}
