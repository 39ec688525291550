//! Secondary hardware fingerprint comparison.
//!
//! The primary machine code identifies an activation; the secondary
//! components (dongle, motherboard, disk) are compared on every validation to
//! spot hardware churn and cloned installs. Everything here is pure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Disk identifiers some drivers report when the real serial is unavailable.
/// They collide across unrelated machines, so they carry no identity.
const PLACEHOLDER_DISK_IDS: &[&str] = &["DAHA"];
const PLACEHOLDER_DISK_PREFIX: &str = "Volume";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Keypro,
    Motherboard,
    Disk,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Keypro, Component::Motherboard, Component::Disk];

    pub fn field_name(&self) -> &'static str {
        match self {
            Component::Keypro => "keypro_id",
            Component::Motherboard => "motherboard_id",
            Component::Disk => "disk_id",
        }
    }

    /// Reduce a raw reported value to something usable for identity, or None.
    fn normalize<'a>(&self, raw: Option<&'a str>) -> Option<&'a str> {
        let value = raw.map(str::trim).filter(|v| !v.is_empty())?;
        if matches!(self, Component::Disk)
            && (value.starts_with(PLACEHOLDER_DISK_PREFIX) || PLACEHOLDER_DISK_IDS.contains(&value))
        {
            return None;
        }
        Some(value)
    }
}

/// Secondary hardware identifiers reported by a client. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareDescriptor {
    #[serde(default)]
    pub keypro_id: Option<String>,
    #[serde(default)]
    pub motherboard_id: Option<String>,
    #[serde(default)]
    pub disk_id: Option<String>,
}

impl HardwareDescriptor {
    pub fn get(&self, component: Component) -> Option<&str> {
        match component {
            Component::Keypro => self.keypro_id.as_deref(),
            Component::Motherboard => self.motherboard_id.as_deref(),
            Component::Disk => self.disk_id.as_deref(),
        }
    }

    fn slot(&mut self, component: Component) -> &mut Option<String> {
        match component {
            Component::Keypro => &mut self.keypro_id,
            Component::Motherboard => &mut self.motherboard_id,
            Component::Disk => &mut self.disk_id,
        }
    }

    /// The snapshot to store after a validation: submitted values where the
    /// client reported a usable one, the stored value otherwise.
    pub fn merged_onto(&self, stored: &HardwareDescriptor) -> HardwareDescriptor {
        let mut merged = stored.clone();
        for component in Component::ALL {
            if component.normalize(self.get(component)).is_some() {
                *merged.slot(component) = self.get(component).map(String::from);
            }
        }
        merged
    }

    pub fn to_json(&self) -> Value {
        json!({
            "keypro_id": self.keypro_id,
            "motherboard_id": self.motherboard_id,
            "disk_id": self.disk_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentChange {
    Unchanged,
    Changed { old: String, new: String },
    /// Missing (or meaningless) on at least one side.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintComparison {
    pub keypro_id: ComponentChange,
    pub motherboard_id: ComponentChange,
    pub disk_id: ComponentChange,
}

impl FingerprintComparison {
    pub fn get(&self, component: Component) -> &ComponentChange {
        match component {
            Component::Keypro => &self.keypro_id,
            Component::Motherboard => &self.motherboard_id,
            Component::Disk => &self.disk_id,
        }
    }

    pub fn changed_count(&self) -> usize {
        Component::ALL
            .iter()
            .filter(|c| matches!(self.get(**c), ComponentChange::Changed { .. }))
            .count()
    }

    pub fn is_identical(&self) -> bool {
        self.changed_count() == 0
    }

    /// `{ "<component>": { "old": .., "new": .. } }` for each changed component.
    pub fn changes_json(&self) -> Value {
        let mut changes = Map::new();
        for component in Component::ALL {
            if let ComponentChange::Changed { old, new } = self.get(component) {
                changes.insert(
                    component.field_name().to_string(),
                    json!({ "old": old, "new": new }),
                );
            }
        }
        Value::Object(changes)
    }
}

/// Compare a submitted descriptor against the last stored snapshot.
pub fn compare(stored: &HardwareDescriptor, submitted: &HardwareDescriptor) -> FingerprintComparison {
    let diff = |component: Component| {
        match (
            component.normalize(stored.get(component)),
            component.normalize(submitted.get(component)),
        ) {
            (Some(old), Some(new)) if old == new => ComponentChange::Unchanged,
            (Some(old), Some(new)) => ComponentChange::Changed {
                old: old.to_string(),
                new: new.to_string(),
            },
            _ => ComponentChange::NotApplicable,
        }
    };

    FingerprintComparison {
        keypro_id: diff(Component::Keypro),
        motherboard_id: diff(Component::Motherboard),
        disk_id: diff(Component::Disk),
    }
}

/// Components reporting the same usable value on both descriptors.
pub fn shared_components(a: &HardwareDescriptor, b: &HardwareDescriptor) -> Vec<Component> {
    Component::ALL
        .into_iter()
        .filter(|component| {
            matches!(
                (component.normalize(a.get(*component)), component.normalize(b.get(*component))),
                (Some(x), Some(y)) if x == y
            )
        })
        .collect()
}
