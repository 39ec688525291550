//! Binds machines to license slots.
//!
//! Every operation runs in one `BEGIN IMMEDIATE` transaction: SQLite takes the
//! write lock up front, so the quota check and the insert that follows can't
//! interleave with another binder. Rejections are committed together with the
//! event that records them, then returned as errors.

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use super::classifier::{self, BindDecision, EventSource, HardwareMatch};
use super::fingerprint::{self, HardwareDescriptor};
use super::lifecycle::evaluate_expiry;
use super::{ClientInfo, EngineSettings};
use crate::db::queries::{self, now};
use crate::error::{AppError, Result};
use crate::models::{Activation, ActivationStatus, Event, EventType, License, LicenseStatus};

/// How a bind request names its license.
#[derive(Debug, Clone, Copy)]
pub enum LicenseLookup<'a> {
    Id(&'a str),
    Serial(&'a str),
}

#[derive(Debug)]
pub struct BindRequest<'a> {
    pub license: LicenseLookup<'a>,
    pub machine_code: &'a str,
    pub hardware: &'a HardwareDescriptor,
    pub app_version: Option<&'a str>,
    pub client: &'a ClientInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindOutcome {
    pub license: License,
    pub activation: Activation,
    /// A new activation row was created for this machine
    pub is_new: bool,
    pub event: Event,
}

impl BindOutcome {
    pub fn hardware_changed(&self) -> bool {
        self.event.event_type == EventType::HardwareChange
    }
}

/// Result of an admin or client action on a single activation.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationChange {
    pub activation: Activation,
    pub event: Event,
}

/// Business rejections still commit (the event must survive); infrastructure
/// errors roll everything back.
enum Verdict<T> {
    Accepted(T),
    Rejected(AppError),
}

impl<T> Verdict<T> {
    fn into_result(self) -> Result<T> {
        match self {
            Verdict::Accepted(value) => Ok(value),
            Verdict::Rejected(err) => Err(err),
        }
    }
}

/// Run `f` inside an IMMEDIATE transaction, committing unless `f` fails outright.
fn in_write_tx<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<Verdict<T>>,
) -> Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let verdict = f(&tx)?;
    tx.commit()?;
    verdict.into_result()
}

fn require_machine_code(machine_code: &str) -> Result<&str> {
    let machine_code = machine_code.trim();
    if machine_code.is_empty() {
        return Err(AppError::Validation("machine_code is required".into()));
    }
    Ok(machine_code)
}

fn resolve_license(conn: &Connection, lookup: LicenseLookup) -> Result<License> {
    let license = match lookup {
        LicenseLookup::Id(id) => queries::get_license_by_id(conn, id)?,
        LicenseLookup::Serial(serial) => queries::get_license_by_serial(conn, serial)?,
    };
    license.ok_or_else(|| {
        tracing::warn!("Bind attempt for unknown license {:?}", lookup);
        AppError::NotFound("License not found".into())
    })
}

fn reload_activation(conn: &Connection, id: &str) -> Result<Activation> {
    queries::get_activation_by_id(conn, id)?
        .ok_or_else(|| AppError::Internal(format!("Activation {} vanished mid-transaction", id)))
}

/// A new machine code whose hardware is already bound to the license.
enum HardwareClash {
    Blacklisted(HardwareMatch),
    Active(HardwareMatch),
}

struct Binding<'a> {
    conn: &'a Connection,
    settings: &'a EngineSettings,
    client: &'a ClientInfo,
    machine_code: &'a str,
}

impl Binding<'_> {
    fn record(&self, license: &License, activation_id: Option<&str>, decision: &BindDecision) -> Result<Event> {
        classifier::record(
            self.conn,
            &EventSource {
                license,
                activation_id,
                machine_code: Some(self.machine_code),
                client: self.client,
            },
            classifier::classify(decision),
            self.settings.auto_confirm_routine,
        )
    }

    fn reject<T>(
        &self,
        license: &License,
        activation_id: Option<&str>,
        decision: BindDecision,
        err: AppError,
    ) -> Result<Verdict<T>> {
        self.record(license, activation_id, &decision)?;
        tracing::warn!(
            "Rejected bind of {} to license {}: {}",
            self.machine_code,
            license.serial_number,
            err
        );
        Ok(Verdict::Rejected(err))
    }

    /// Persist a lapsed expiry and refuse licenses that can't take binds.
    fn check_license(&self, mut license: License) -> Result<Verdict<License>> {
        let now = now();
        if license.status == LicenseStatus::Active
            && evaluate_expiry(&license, now) == LicenseStatus::Expired
        {
            queries::set_license_status(self.conn, &license.id, LicenseStatus::Expired)?;
            license.status = LicenseStatus::Expired;
            tracing::info!("License {} expired", license.serial_number);
        }

        let lapsed_while_pending = license.status == LicenseStatus::Pending
            && license.expires_at.is_some_and(|expires_at| expires_at < now);
        let message = match license.status {
            LicenseStatus::Expired => "License has expired".to_string(),
            LicenseStatus::Pending if lapsed_while_pending => "License has expired".to_string(),
            LicenseStatus::Disabled => "License is disabled".to_string(),
            _ => return Ok(Verdict::Accepted(license)),
        };

        let decision = BindDecision::LicenseInactive {
            status: license.status,
            expires_at: license.expires_at,
        };
        self.reject(&license, None, decision, AppError::LicenseInactive(message))
    }

    /// Refuse a new slot when active plus blacklisted rows fill the quota.
    fn check_quota(&self, license: &License, activation_id: Option<&str>, reactivation: bool) -> Result<Option<Verdict<BindOutcome>>> {
        let used = queries::count_quota_activations(self.conn, &license.id)?;
        if used < license.max_activations {
            return Ok(None);
        }
        let max = license.max_activations;
        let decision = BindDecision::QuotaExceeded { used, max, reactivation };
        self.reject(license, activation_id, decision, AppError::QuotaExceeded { used, max })
            .map(Some)
    }

    /// Record the event for a successful bind, activating a pending license.
    fn accept(
        &self,
        mut license: License,
        activation: Activation,
        is_new: bool,
        decision: BindDecision,
    ) -> Result<Verdict<BindOutcome>> {
        if license.status == LicenseStatus::Pending {
            queries::set_license_status(self.conn, &license.id, LicenseStatus::Active)?;
            license.status = LicenseStatus::Active;
            tracing::info!(
                "License {} activated by first bind from {}",
                license.serial_number,
                self.machine_code
            );
        }

        let event = self.record(&license, Some(&activation.id), &decision)?;
        Ok(Verdict::Accepted(BindOutcome {
            license,
            activation,
            is_new,
            event,
        }))
    }

    /// Compare submitted hardware against the license's other live bindings.
    /// A blacklisted match wins over an active one.
    fn hardware_clash(&self, license: &License, hardware: &HardwareDescriptor) -> Result<Option<HardwareClash>> {
        let mut clash = None;
        for activation in queries::list_activations_for_license(self.conn, &license.id)? {
            let status = activation.status;
            if status == ActivationStatus::Deactivated {
                continue;
            }
            let components = fingerprint::shared_components(&activation.hardware(), hardware);
            if components.is_empty() {
                continue;
            }
            let matched = HardwareMatch {
                activation_id: activation.id,
                machine_code: activation.machine_code,
                components,
            };
            if status == ActivationStatus::Blacklisted {
                return Ok(Some(HardwareClash::Blacklisted(matched)));
            }
            if clash.is_none() {
                clash = Some(HardwareClash::Active(matched));
            }
        }
        Ok(clash)
    }

    fn blacklisted<T>(&self, license: &License, activation: &Activation) -> Result<Verdict<T>> {
        self.reject(
            license,
            Some(&activation.id),
            BindDecision::BlacklistedMachine,
            AppError::Blacklisted,
        )
    }
}

/// Bind (or re-validate) a machine against a license.
pub fn bind(conn: &mut Connection, settings: &EngineSettings, request: &BindRequest) -> Result<BindOutcome> {
    let machine_code = require_machine_code(request.machine_code)?;

    in_write_tx(conn, |tx| {
        let b = Binding {
            conn: tx,
            settings,
            client: request.client,
            machine_code,
        };
        let license = match b.check_license(resolve_license(tx, request.license)?)? {
            Verdict::Accepted(license) => license,
            Verdict::Rejected(err) => return Ok(Verdict::Rejected(err)),
        };

        let existing = queries::get_activation_for_machine(tx, &license.id, machine_code)?;
        let Some(activation) = existing else {
            let decision = match b.hardware_clash(&license, request.hardware)? {
                Some(HardwareClash::Blacklisted(matched)) => {
                    let banned_id = matched.activation_id.clone();
                    let decision = BindDecision::BlacklistedHardware(matched);
                    return b.reject(&license, Some(&banned_id), decision, AppError::Blacklisted);
                }
                Some(HardwareClash::Active(matched)) => {
                    tracing::warn!(
                        "Machine {} reports the hardware of {} on license {}",
                        machine_code,
                        matched.machine_code,
                        license.serial_number
                    );
                    BindDecision::NewActivationMatchingHardware(matched)
                }
                None => BindDecision::NewActivation,
            };
            if let Some(rejected) = b.check_quota(&license, None, false)? {
                return Ok(rejected);
            }
            let activation = queries::create_activation(
                tx,
                &license.id,
                machine_code,
                request.hardware,
                request.app_version,
                request.client.ip_address.as_deref(),
            )?;
            return b.accept(license, activation, true, decision);
        };

        match activation.status {
            ActivationStatus::Blacklisted => b.blacklisted(&license, &activation),
            ActivationStatus::Deactivated => {
                if let Some(rejected) = b.check_quota(&license, Some(&activation.id), true)? {
                    return Ok(rejected);
                }
                queries::reactivate_activation(
                    tx,
                    &activation.id,
                    request.hardware,
                    request.app_version,
                    request.client.ip_address.as_deref(),
                )?;
                let activation = reload_activation(tx, &activation.id)?;
                b.accept(license, activation, false, BindDecision::Reactivated)
            }
            ActivationStatus::Active => {
                let stored = activation.hardware();
                let comparison = fingerprint::compare(&stored, request.hardware);
                let snapshot = request.hardware.merged_onto(&stored);
                queries::record_activation_validation(
                    tx,
                    &activation.id,
                    &snapshot,
                    request.app_version,
                    request.client.ip_address.as_deref(),
                )?;
                let activation = reload_activation(tx, &activation.id)?;
                b.accept(license, activation, false, BindDecision::Validated(comparison))
            }
        }
    })
}

/// Operator-initiated bind of a machine code. Same quota rule as a client bind.
pub fn bind_manual(
    conn: &mut Connection,
    settings: &EngineSettings,
    license_id: &str,
    machine_code: &str,
    client: &ClientInfo,
) -> Result<BindOutcome> {
    let machine_code = require_machine_code(machine_code)?;

    in_write_tx(conn, |tx| {
        let b = Binding {
            conn: tx,
            settings,
            client,
            machine_code,
        };
        let license = match b.check_license(resolve_license(tx, LicenseLookup::Id(license_id))?)? {
            Verdict::Accepted(license) => license,
            Verdict::Rejected(err) => return Ok(Verdict::Rejected(err)),
        };

        match queries::get_activation_for_machine(tx, &license.id, machine_code)? {
            None => {
                if let Some(rejected) = b.check_quota(&license, None, false)? {
                    return Ok(rejected);
                }
                let activation = queries::create_activation(
                    tx,
                    &license.id,
                    machine_code,
                    &HardwareDescriptor::default(),
                    None,
                    client.ip_address.as_deref(),
                )?;
                b.accept(license, activation, true, BindDecision::ManualActivation)
            }
            Some(activation) => match activation.status {
                ActivationStatus::Active => Err(AppError::Validation(
                    "This machine is already bound to the license".into(),
                )),
                ActivationStatus::Blacklisted => b.blacklisted(&license, &activation),
                ActivationStatus::Deactivated => {
                    if let Some(rejected) = b.check_quota(&license, Some(&activation.id), true)? {
                        return Ok(rejected);
                    }
                    queries::reactivate_activation(
                        tx,
                        &activation.id,
                        &activation.hardware(),
                        None,
                        client.ip_address.as_deref(),
                    )?;
                    let activation = reload_activation(tx, &activation.id)?;
                    b.accept(license, activation, false, BindDecision::ManualActivation)
                }
            },
        }
    })
}

/// Bind the initial machine of a license created as active. Runs inside the
/// caller's transaction.
pub(crate) fn attach_initial(
    tx: &Connection,
    settings: &EngineSettings,
    license: &License,
    machine_code: &str,
    client: &ClientInfo,
) -> Result<Activation> {
    let activation = queries::create_activation(
        tx,
        &license.id,
        machine_code,
        &HardwareDescriptor::default(),
        None,
        client.ip_address.as_deref(),
    )?;
    let b = Binding {
        conn: tx,
        settings,
        client,
        machine_code,
    };
    b.record(license, Some(&activation.id), &BindDecision::NewActivation)?;
    Ok(activation)
}

fn license_of(conn: &Connection, activation: &Activation) -> Result<License> {
    queries::get_license_by_id(conn, &activation.license_id)?
        .ok_or_else(|| AppError::Internal(format!("License of activation {} missing", activation.id)))
}

fn record_change(
    conn: &Connection,
    settings: &EngineSettings,
    client: &ClientInfo,
    activation: &Activation,
    decision: BindDecision,
) -> Result<Event> {
    let license = license_of(conn, activation)?;
    classifier::record(
        conn,
        &EventSource {
            license: &license,
            activation_id: Some(&activation.id),
            machine_code: Some(&activation.machine_code),
            client,
        },
        classifier::classify(&decision),
        settings.auto_confirm_routine,
    )
}

/// Release an active binding and free its slot. Blacklisted rows stay
/// blacklisted.
pub fn deactivate(
    conn: &mut Connection,
    settings: &EngineSettings,
    activation_id: &str,
    actor: Option<&str>,
    client: &ClientInfo,
) -> Result<ActivationChange> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let activation = queries::get_activation_by_id(&tx, activation_id)?
        .ok_or_else(|| AppError::NotFound("Activation not found".into()))?;
    if !queries::deactivate_activation(&tx, activation_id)? {
        return Err(AppError::invalid_transition(
            "activation",
            activation.status,
            ActivationStatus::Deactivated,
        ));
    }
    let activation = reload_activation(&tx, activation_id)?;
    let decision = BindDecision::AdminDeactivation {
        actor: actor.map(String::from),
    };
    let event = record_change(&tx, settings, client, &activation, decision)?;

    tx.commit()?;
    tracing::info!("Deactivated machine {} ({})", activation.machine_code, activation.id);
    Ok(ActivationChange { activation, event })
}

/// Client self-service release of its own active binding.
pub fn deactivate_by_machine(
    conn: &mut Connection,
    settings: &EngineSettings,
    serial_number: &str,
    machine_code: &str,
    client: &ClientInfo,
) -> Result<ActivationChange> {
    let machine_code = require_machine_code(machine_code)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license = resolve_license(&tx, LicenseLookup::Serial(serial_number))?;
    let activation = queries::get_activation_for_machine(&tx, &license.id, machine_code)?
        .filter(|a| a.status == ActivationStatus::Active)
        .ok_or_else(|| AppError::NotFound("No active activation for this machine".into()))?;

    queries::deactivate_activation(&tx, &activation.id)?;
    let activation = reload_activation(&tx, &activation.id)?;
    let event = record_change(&tx, settings, client, &activation, BindDecision::ClientDeactivation)?;

    tx.commit()?;
    tracing::info!(
        "Machine {} released its slot on license {}",
        machine_code,
        license.serial_number
    );
    Ok(ActivationChange { activation, event })
}

/// Permanently ban a machine from a license. The row keeps its quota slot.
pub fn blacklist(
    conn: &mut Connection,
    settings: &EngineSettings,
    activation_id: &str,
    actor: Option<&str>,
    client: &ClientInfo,
) -> Result<ActivationChange> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let activation = queries::get_activation_by_id(&tx, activation_id)?
        .ok_or_else(|| AppError::NotFound("Activation not found".into()))?;
    if !queries::blacklist_activation(&tx, activation_id)? {
        return Err(AppError::invalid_transition(
            "activation",
            activation.status,
            ActivationStatus::Blacklisted,
        ));
    }
    let activation = reload_activation(&tx, activation_id)?;
    let decision = BindDecision::Blacklisted {
        actor: actor.map(String::from),
    };
    let event = record_change(&tx, settings, client, &activation, decision)?;

    tx.commit()?;
    tracing::info!("Blacklisted machine {} ({})", activation.machine_code, activation.id);
    Ok(ActivationChange { activation, event })
}
