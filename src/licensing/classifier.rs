//! Turns binder outcomes into audit events.
//!
//! `classify` is the single place that decides an event's type, subtype and
//! severity. `record` writes the result; events are never updated afterwards
//! except for confirmation (see `ledger`).

use chrono::Utc;
use rusqlite::Connection;
use serde_json::{Value, json};

use super::fingerprint::Component;
use super::{ClientInfo, FingerprintComparison};
use crate::db::queries;
use crate::error::Result;
use crate::models::{CreateEvent, Event, EventType, EventWithCustomer, License, LicenseStatus, Severity};

/// Actor recorded on events confirmed automatically.
pub const SYSTEM_ACTOR: &str = "system";

pub mod subtype {
    pub const NEW_ACTIVATION: &str = "new_activation";
    pub const MANUAL_ACTIVATION: &str = "manual_activation";
    pub const MACHINE_CODE_MATCH: &str = "machine_code_match";
    pub const NORMAL_VALIDATION: &str = "normal_validation";
    pub const VALIDATION_HARDWARE_CHANGE: &str = "validation_hardware_change";
    pub const LICENSE_INACTIVE: &str = "license_inactive";
    pub const QUOTA_EXCEEDED: &str = "quota_exceeded";
    pub const BLACKLISTED_MACHINE: &str = "blacklisted_machine";
    pub const ADMIN_DEACTIVATION: &str = "admin_deactivation";
    pub const CLIENT_DEACTIVATION: &str = "client_deactivation";
    pub const BLACKLISTED: &str = "blacklisted";
    pub const HARDWARE_ID_MATCH: &str = "hardware_id_match";
}

/// Another binding of the same license that reports the submitted hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareMatch {
    pub activation_id: String,
    pub machine_code: String,
    pub components: Vec<Component>,
}

impl HardwareMatch {
    fn to_json(&self, blacklisted: bool) -> Value {
        let components: Vec<&str> = self.components.iter().map(|c| c.field_name()).collect();
        json!({
            "matched_activation_id": self.activation_id,
            "matched_machine_code": self.machine_code,
            "matched_components": components,
            "blacklisted": blacklisted,
        })
    }
}

/// Everything the binder can decide about a request.
#[derive(Debug, Clone, PartialEq)]
pub enum BindDecision {
    NewActivation,
    /// New machine code whose hardware is already bound under another code
    NewActivationMatchingHardware(HardwareMatch),
    ManualActivation,
    Reactivated,
    Validated(FingerprintComparison),
    LicenseInactive {
        status: LicenseStatus,
        expires_at: Option<i64>,
    },
    QuotaExceeded {
        used: i32,
        max: i32,
        reactivation: bool,
    },
    BlacklistedMachine,
    /// Unknown machine code carrying a blacklisted machine's hardware
    BlacklistedHardware(HardwareMatch),
    AdminDeactivation {
        actor: Option<String>,
    },
    ClientDeactivation,
    Blacklisted {
        actor: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub event_type: EventType,
    pub subtype: &'static str,
    pub severity: Severity,
    pub details: Option<Value>,
}

impl Classification {
    fn new(event_type: EventType, subtype: &'static str, severity: Severity) -> Self {
        Self {
            event_type,
            subtype,
            severity,
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Routine traffic that needs no human review.
    pub fn is_routine(&self) -> bool {
        self.event_type == EventType::Validation && self.severity == Severity::Info
    }
}

pub fn classify(decision: &BindDecision) -> Classification {
    use EventType as T;
    use Severity as S;

    match decision {
        BindDecision::NewActivation => Classification::new(T::Activation, subtype::NEW_ACTIVATION, S::Info),
        BindDecision::NewActivationMatchingHardware(matched) => {
            Classification::new(T::Activation, subtype::HARDWARE_ID_MATCH, S::Suspicious)
                .with_details(matched.to_json(false))
        }
        BindDecision::ManualActivation => {
            Classification::new(T::Activation, subtype::MANUAL_ACTIVATION, S::Info)
        }
        BindDecision::Reactivated => {
            Classification::new(T::ReActivation, subtype::MACHINE_CODE_MATCH, S::Info)
        }
        BindDecision::Validated(comparison) => match comparison.changed_count() {
            0 => Classification::new(T::Validation, subtype::NORMAL_VALIDATION, S::Info),
            changed => {
                let severity = if changed == 1 { S::Warning } else { S::Suspicious };
                Classification::new(T::HardwareChange, subtype::VALIDATION_HARDWARE_CHANGE, severity)
                    .with_details(json!({
                        "hardware_changes": comparison.changes_json(),
                        "changed_count": changed,
                    }))
            }
        },
        BindDecision::LicenseInactive { status, expires_at } => {
            Classification::new(T::Validation, subtype::LICENSE_INACTIVE, S::Warning)
                .with_details(json!({ "status": status.as_ref(), "expires_at": expires_at }))
        }
        BindDecision::QuotaExceeded { used, max, reactivation } => {
            let event_type = if *reactivation { T::ReActivation } else { T::Activation };
            Classification::new(event_type, subtype::QUOTA_EXCEEDED, S::Warning)
                .with_details(json!({ "used": used, "max": max }))
        }
        BindDecision::BlacklistedMachine => {
            Classification::new(T::Validation, subtype::BLACKLISTED_MACHINE, S::Critical)
        }
        BindDecision::BlacklistedHardware(matched) => {
            Classification::new(T::Validation, subtype::HARDWARE_ID_MATCH, S::Critical)
                .with_details(matched.to_json(true))
        }
        BindDecision::AdminDeactivation { actor } => {
            let c = Classification::new(T::Deactivation, subtype::ADMIN_DEACTIVATION, S::Info);
            match actor {
                Some(actor) => c.with_details(json!({ "actor": actor })),
                None => c,
            }
        }
        BindDecision::ClientDeactivation => {
            Classification::new(T::Deactivation, subtype::CLIENT_DEACTIVATION, S::Info)
        }
        BindDecision::Blacklisted { actor } => {
            let c = Classification::new(T::Deactivation, subtype::BLACKLISTED, S::Warning);
            match actor {
                Some(actor) => c.with_details(json!({ "actor": actor })),
                None => c,
            }
        }
    }
}

/// What an event is attached to.
pub struct EventSource<'a> {
    pub license: &'a License,
    pub activation_id: Option<&'a str>,
    pub machine_code: Option<&'a str>,
    pub client: &'a ClientInfo,
}

pub fn record(
    conn: &Connection,
    source: &EventSource,
    classification: Classification,
    auto_confirm_routine: bool,
) -> Result<Event> {
    let confirmed_by = (auto_confirm_routine && classification.is_routine())
        .then(|| SYSTEM_ACTOR.to_string());

    queries::create_event(
        conn,
        &CreateEvent {
            license_id: source.license.id.clone(),
            activation_id: source.activation_id.map(String::from),
            serial_number: source.license.serial_number.clone(),
            event_type: classification.event_type,
            event_subtype: Some(classification.subtype.to_string()),
            severity: classification.severity,
            details: classification.details,
            machine_code: source.machine_code.map(String::from),
            ip_address: source.client.ip_address.clone(),
            user_agent: source.client.user_agent.clone(),
            confirmed_by,
        },
    )
}

// ============ Review queries ============

pub fn events_for_license(conn: &Connection, license_id: &str, limit: i64) -> Result<Vec<Event>> {
    queries::list_events_for_license(conn, license_id, limit.clamp(1, 500))
}

pub fn unconfirmed_for(conn: &Connection, license_id: &str) -> Result<Vec<Event>> {
    queries::list_unconfirmed_events_for_license(conn, license_id)
}

pub fn unconfirmed_count_for(conn: &Connection, license_id: &str) -> Result<i64> {
    queries::count_unconfirmed_events_for_license(conn, license_id)
}

/// Longest look-back accepted by `suspicious`, about ten years.
pub const MAX_SUSPICIOUS_DAYS: i64 = 3650;

/// Suspicious and critical events from the last `since_days` days.
pub fn suspicious(conn: &Connection, since_days: i64, limit: i64) -> Result<Vec<EventWithCustomer>> {
    let since = Utc::now().timestamp() - since_days.clamp(0, MAX_SUSPICIOUS_DAYS) * 86_400;
    queries::list_alarming_events(conn, since, limit.clamp(1, 1000))
}
