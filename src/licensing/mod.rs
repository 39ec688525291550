//! The license engine: lifecycle rules, machine binding, fingerprint
//! comparison, event classification and operator confirmation.
//!
//! Functions here take a `rusqlite::Connection` and do their own
//! transaction handling; handlers only translate HTTP in and out.

pub mod binder;
pub mod classifier;
pub mod fingerprint;
pub mod ledger;
pub mod lifecycle;

pub use fingerprint::{ComponentChange, FingerprintComparison, HardwareDescriptor};

/// Engine behaviour toggles, built from `Config` at startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Prefix for generated serial numbers (`PREFIX-XXXXXXXX-XXXXXXXX`)
    pub serial_prefix: String,
    /// Record routine info-level validations as already confirmed by `system`
    pub auto_confirm_routine: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            serial_prefix: "LIC".to_string(),
            auto_confirm_routine: true,
        }
    }
}

/// Where a request came from, copied onto the events it produces.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
