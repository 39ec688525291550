use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::licensing::HardwareDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActivationStatus {
    Active,
    Deactivated,
    Blacklisted,
}

impl ActivationStatus {
    /// Whether a row in this status occupies one of the license's slots.
    /// Blacklisted rows keep their slot so a banned machine can't be swapped for a new one.
    pub fn consumes_quota(&self) -> bool {
        matches!(self, Self::Active | Self::Blacklisted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub id: String,
    pub license_id: String,
    pub machine_code: String,
    pub keypro_id: Option<String>,
    pub motherboard_id: Option<String>,
    pub disk_id: Option<String>,
    pub app_version: Option<String>,
    pub status: ActivationStatus,
    pub ip_address: Option<String>,
    pub activated_at: i64,
    pub last_validated_at: Option<i64>,
    pub deactivated_at: Option<i64>,
    pub blacklisted_at: Option<i64>,
}

impl Activation {
    /// Last known secondary fingerprint snapshot.
    pub fn hardware(&self) -> HardwareDescriptor {
        HardwareDescriptor {
            keypro_id: self.keypro_id.clone(),
            motherboard_id: self.motherboard_id.clone(),
            disk_id: self.disk_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ManualActivation {
    pub machine_code: String,
}
