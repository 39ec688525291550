//! Builds the `.lic` artifact handed to a bound machine.
//!
//! Layout: the JSON payload is signed with Ed25519, the payload plus its
//! base64 signature is sealed with AES-256-GCM, and the sealed bytes are
//! base64-encoded.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};

use crate::crypto::LicenseKeys;
use crate::error::{AppError, Result};
use crate::licensing::HardwareDescriptor;
use crate::models::{ConnectionType, Customer, License};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensePayload {
    pub serial_number: String,
    pub machine_code: String,
    pub licensed_to: String,
    pub email: Option<String>,
    pub issued_at: i64,
    pub expires_at: Option<i64>,
    pub features: Vec<String>,
    pub connection_type: ConnectionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_ids: Option<HardwareDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignedPayload {
    payload: LicensePayload,
    signature: String,
}

pub fn build(
    keys: &LicenseKeys,
    license: &License,
    customer: &Customer,
    machine_code: &str,
    hardware_ids: Option<&HardwareDescriptor>,
    app_version: Option<&str>,
) -> Result<Vec<u8>> {
    let payload = LicensePayload {
        serial_number: license.serial_number.clone(),
        machine_code: machine_code.to_string(),
        licensed_to: customer.name.clone(),
        email: customer.email.clone(),
        issued_at: license.created_at,
        expires_at: license.expires_at,
        features: license.features.clone(),
        connection_type: license.connection_type,
        hardware_ids: hardware_ids.filter(|hw| **hw != HardwareDescriptor::default()).cloned(),
        app_version: app_version.map(String::from),
    };

    let message = serde_json::to_vec(&payload)?;
    let signature = keys.sign(&message);
    let envelope = serde_json::to_vec(&SignedPayload {
        payload,
        signature: STANDARD.encode(signature.to_bytes()),
    })?;

    let sealed = keys.seal(&envelope)?;
    Ok(STANDARD.encode(sealed).into_bytes())
}

/// Reverse of `build`: decrypt, then check the signature.
pub fn open(keys: &LicenseKeys, content: &[u8]) -> Result<LicensePayload> {
    let sealed = STANDARD
        .decode(content)
        .map_err(|_| AppError::Validation("License file is not valid base64".into()))?;
    let envelope: SignedPayload = serde_json::from_slice(&keys.open(&sealed)?)
        .map_err(|_| AppError::Validation("License file payload is malformed".into()))?;

    let signature_bytes: [u8; 64] = STANDARD
        .decode(&envelope.signature)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| AppError::Validation("License file signature is malformed".into()))?;
    let message = serde_json::to_vec(&envelope.payload)?;
    if !keys.verify(&message, &Signature::from_bytes(&signature_bytes)) {
        return Err(AppError::Validation("License file signature does not verify".into()));
    }
    Ok(envelope.payload)
}

/// `license_{tax_id}_{YYYYMMDD}.lic`
pub fn file_name(customer: &Customer, at: i64) -> String {
    let date = DateTime::<Utc>::from_timestamp(at, 0)
        .unwrap_or_default()
        .format("%Y%m%d");
    format!("license_{}_{}.lic", customer.tax_id, date)
}

/// `Content-Disposition` value with the file name percent-encoded.
pub fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}
