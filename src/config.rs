use std::env;

use crate::crypto::LicenseKeys;
use crate::error::{AppError, Result};
use crate::licensing::EngineSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    /// Bearer token for the admin API (None = admin API is unauthenticated)
    pub admin_api_token: Option<String>,
    pub serial_prefix: String,
    /// 64 hex chars (Ed25519 seed)
    pub license_signing_key: Option<String>,
    /// 64 hex chars (HKDF input for the license file cipher key)
    pub license_master_key: Option<String>,
    /// Seconds between expiry sweeps (0 = disabled)
    pub expiry_sweep_interval_secs: u64,
    pub auto_confirm_routine_validations: bool,
    pub public_rate_limit_per_second: u64,
    pub public_rate_limit_burst: u32,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("LICENSE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "licenses.db".to_string()),
            dev_mode,
            admin_api_token: non_empty("ADMIN_API_TOKEN"),
            serial_prefix: env::var("SERIAL_PREFIX").unwrap_or_else(|_| "LIC".to_string()),
            license_signing_key: non_empty("LICENSE_SIGNING_KEY"),
            license_master_key: non_empty("LICENSE_MASTER_KEY"),
            expiry_sweep_interval_secs: parse_or("EXPIRY_SWEEP_INTERVAL_SECS", 86_400),
            auto_confirm_routine_validations: flag("AUTO_CONFIRM_ROUTINE_VALIDATIONS", true),
            public_rate_limit_per_second: parse_or("PUBLIC_RATE_LIMIT_PER_SECOND", 1),
            public_rate_limit_burst: parse_or("PUBLIC_RATE_LIMIT_BURST", 30),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            serial_prefix: self.serial_prefix.clone(),
            auto_confirm_routine: self.auto_confirm_routine_validations,
        }
    }

    /// Configured license keys. Dev mode falls back to ephemeral keys;
    /// anywhere else both keys are required.
    pub fn license_keys(&self) -> Result<LicenseKeys> {
        match (&self.license_signing_key, &self.license_master_key) {
            (Some(signing), Some(master)) => LicenseKeys::from_hex(signing, master),
            _ if self.dev_mode => {
                tracing::warn!("License keys not configured, using ephemeral dev keys");
                LicenseKeys::generate()
            }
            _ => Err(AppError::Internal(
                "LICENSE_SIGNING_KEY and LICENSE_MASTER_KEY must be set".into(),
            )),
        }
    }
}
