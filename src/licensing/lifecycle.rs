//! License status rules and the operations that change a license row.

use chrono::{DateTime, Months};
use rusqlite::{Connection, TransactionBehavior};

use super::{ClientInfo, EngineSettings, binder};
use crate::db::queries::{self, now};
use crate::error::{AppError, Result};
use crate::models::{Activation, CreateLicense, License, LicenseStatus, Product, UpdateLicense};

/// Attempts at finding an unused serial number before giving up.
const SERIAL_ATTEMPTS: usize = 5;

/// Explicit status changes an operator may request.
pub fn can_transition(from: LicenseStatus, to: LicenseStatus) -> bool {
    use LicenseStatus::*;
    matches!(
        (from, to),
        (Pending, Active)
            | (Pending, Disabled)
            | (Active, Disabled)
            | (Active, Expired)
            | (Expired, Active)
            | (Expired, Disabled)
            | (Disabled, Active)
    )
}

/// The status a license effectively has at `now`. Only an active license
/// lapses; pending and disabled ones keep their status.
pub fn evaluate_expiry(license: &License, now: i64) -> LicenseStatus {
    match (license.status, license.expires_at) {
        (LicenseStatus::Active, Some(expires_at)) if expires_at < now => LicenseStatus::Expired,
        (status, _) => status,
    }
}

/// One calendar year after the later of `now` and the current expiry.
pub fn renewed_expiry(current: Option<i64>, now: i64) -> Result<i64> {
    let base = current.map_or(now, |expires_at| expires_at.max(now));
    DateTime::from_timestamp(base, 0)
        .and_then(|dt| dt.checked_add_months(Months::new(12)))
        .map(|dt| dt.timestamp())
        .ok_or_else(|| AppError::Internal(format!("Cannot extend expiry from {}", base)))
}

fn check_features(product: &Product, features: &[String]) -> Result<()> {
    let unknown = product.unknown_features(features);
    if !unknown.is_empty() {
        return Err(AppError::Validation(format!(
            "Features not offered by {}: {}",
            product.name,
            unknown.join(", ")
        )));
    }
    Ok(())
}

fn check_max_activations(max: i32) -> Result<()> {
    if max < 1 {
        return Err(AppError::Validation("max_activations must be at least 1".into()));
    }
    Ok(())
}

fn get_license(conn: &Connection, id: &str) -> Result<License> {
    queries::get_license_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))
}

/// Create a license. An `active` license is bound to its initial machine in
/// the same transaction, so it never exists without an activation.
pub fn create(
    conn: &mut Connection,
    settings: &EngineSettings,
    input: &CreateLicense,
    client: &ClientInfo,
) -> Result<(License, Option<Activation>)> {
    let status = input.status.unwrap_or(LicenseStatus::Pending);
    let machine_code = input
        .machine_code
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    match status {
        LicenseStatus::Pending => {}
        LicenseStatus::Active if machine_code.is_none() => {
            return Err(AppError::Validation(
                "machine_code is required to create an active license".into(),
            ));
        }
        LicenseStatus::Active => {}
        other => {
            return Err(AppError::Validation(format!(
                "A license can't be created as {}",
                other.as_ref()
            )));
        }
    }
    check_max_activations(input.max_activations)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    queries::get_customer_by_id(&tx, &input.customer_id)?
        .ok_or_else(|| AppError::NotFound("Customer not found".into()))?;
    let product = queries::get_product_by_id(&tx, &input.product_id)?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;
    check_features(&product, &input.features)?;

    let mut serial_number = None;
    for _ in 0..SERIAL_ATTEMPTS {
        let candidate = queries::generate_serial_number(&settings.serial_prefix);
        if !queries::serial_number_exists(&tx, &candidate)? {
            serial_number = Some(candidate);
            break;
        }
    }
    let serial_number = serial_number
        .ok_or_else(|| AppError::Internal("Could not generate a unique serial number".into()))?;

    let license = queries::create_license(&tx, &serial_number, status, input)?;
    let activation = match machine_code {
        Some(machine_code) if status == LicenseStatus::Active => {
            Some(binder::attach_initial(&tx, settings, &license, machine_code, client)?)
        }
        _ => None,
    };

    tx.commit()?;

    tracing::info!(
        "Created license {} ({}) for customer {}",
        license.serial_number,
        license.status.as_ref(),
        license.customer_id
    );
    Ok((license, activation))
}

/// Extend the expiry by a calendar year. An expired license comes back to
/// active; every other status is left alone.
pub fn renew(conn: &Connection, id: &str) -> Result<License> {
    let license = get_license(conn, id)?;
    let now = now();
    let expires_at = renewed_expiry(license.expires_at, now)?;
    let status = match evaluate_expiry(&license, now) {
        LicenseStatus::Expired => LicenseStatus::Active,
        _ => license.status,
    };

    queries::set_license_expiry(conn, id, expires_at, status)?;
    tracing::info!(
        "Renewed license {} until {} ({})",
        license.serial_number,
        expires_at,
        status.as_ref()
    );
    get_license(conn, id)
}

/// Apply an operator status change. Activating a license whose expiry has
/// passed is refused: the next bind would expire it again, so it needs `renew`.
pub fn set_status(conn: &Connection, id: &str, status: LicenseStatus) -> Result<License> {
    let license = get_license(conn, id)?;
    if !can_transition(license.status, status) {
        return Err(AppError::invalid_transition("license", license.status, status));
    }
    if status == LicenseStatus::Active && license.expires_at.is_some_and(|expires_at| expires_at < now()) {
        return Err(AppError::invalid_transition(
            "license",
            license.status,
            "active with a past expiry, renew it instead",
        ));
    }

    queries::set_license_status(conn, id, status)?;
    tracing::info!(
        "License {} status {} -> {}",
        license.serial_number,
        license.status.as_ref(),
        status.as_ref()
    );
    get_license(conn, id)
}

/// Edit the mutable attributes of a license. Status and serial number are
/// not editable here.
pub fn update(conn: &Connection, id: &str, patch: &UpdateLicense) -> Result<License> {
    let license = get_license(conn, id)?;

    if let Some(max) = patch.max_activations {
        check_max_activations(max)?;
    }
    if let Some(features) = &patch.features {
        let product = queries::get_product_by_id(conn, &license.product_id)?
            .ok_or_else(|| AppError::Internal("Product not found".into()))?;
        check_features(&product, features)?;
    }

    queries::update_license(conn, id, patch)?;
    get_license(conn, id)
}

/// Remove a license together with its activations and events.
pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    let license = get_license(conn, id)?;
    queries::delete_license(conn, id)?;
    tracing::info!("Deleted license {}", license.serial_number);
    Ok(())
}

/// Batch form of the expiry check done on every validation.
pub fn sweep_expired(conn: &Connection, at: i64) -> Result<usize> {
    let expired = queries::expire_overdue_licenses(conn, at)?;
    if expired > 0 {
        tracing::info!("Expired {} overdue licenses", expired);
    }
    Ok(expired)
}
