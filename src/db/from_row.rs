use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, Params, Row};

use crate::error::Result;
use crate::models::*;

/// Column lists matching the `FromRow` impls below. Every query aliases its
/// tables (`l`, `a`, `e`, `c`, `p`) so these can be reused across joins.
pub const CUSTOMER_COLS: &str =
    "c.id, c.tax_id, c.name, c.email, c.phone, c.address, c.notes, c.created_at, c.updated_at";

pub const PRODUCT_COLS: &str =
    "p.id, p.name, p.version, p.description, p.features, p.created_at, p.updated_at";

pub const LICENSE_COLS: &str = "l.id, l.serial_number, l.customer_id, l.product_id, l.status, l.connection_type, l.max_activations, l.expires_at, l.features, l.notes, l.created_at, l.updated_at";

pub const LICENSE_WITH_RELATIONS_COLS: &str = "l.id, l.serial_number, l.customer_id, l.product_id, l.status, l.connection_type, l.max_activations, l.expires_at, l.features, l.notes, l.created_at, l.updated_at, c.name, c.tax_id, p.name, (SELECT COUNT(*) FROM activations a WHERE a.license_id = l.id AND a.status = 'active')";

pub const ACTIVATION_COLS: &str = "a.id, a.license_id, a.machine_code, a.keypro_id, a.motherboard_id, a.disk_id, a.app_version, a.status, a.ip_address, a.activated_at, a.last_validated_at, a.deactivated_at, a.blacklisted_at";

pub const EVENT_COLS: &str = "e.id, e.license_id, e.activation_id, e.serial_number, e.event_type, e.event_subtype, e.severity, e.details, e.machine_code, e.ip_address, e.user_agent, e.created_at, e.is_confirmed, e.confirmed_by, e.confirmed_at";

pub const EVENT_WITH_CUSTOMER_COLS: &str = "e.id, e.license_id, e.activation_id, e.serial_number, e.event_type, e.event_subtype, e.severity, e.details, e.machine_code, e.ip_address, e.user_agent, e.created_at, e.is_confirmed, e.confirmed_by, e.confirmed_at, c.name";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

pub fn query_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params, |row| T::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Read a strum-backed enum stored as TEXT.
fn get_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a JSON array of strings stored as TEXT.
fn get_string_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl FromRow for Customer {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Customer {
            id: row.get(0)?,
            tax_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            address: row.get(5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            version: row.get(2)?,
            description: row.get(3)?,
            features: get_string_list(row, 4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            serial_number: row.get(1)?,
            customer_id: row.get(2)?,
            product_id: row.get(3)?,
            status: get_enum(row, 4)?,
            connection_type: get_enum(row, 5)?,
            max_activations: row.get(6)?,
            expires_at: row.get(7)?,
            features: get_string_list(row, 8)?,
            notes: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for LicenseWithRelations {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseWithRelations {
            license: License::from_row(row)?,
            customer_name: row.get(12)?,
            customer_tax_id: row.get(13)?,
            product_name: row.get(14)?,
            active_activations: row.get(15)?,
        })
    }
}

impl FromRow for Activation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Activation {
            id: row.get(0)?,
            license_id: row.get(1)?,
            machine_code: row.get(2)?,
            keypro_id: row.get(3)?,
            motherboard_id: row.get(4)?,
            disk_id: row.get(5)?,
            app_version: row.get(6)?,
            status: get_enum(row, 7)?,
            ip_address: row.get(8)?,
            activated_at: row.get(9)?,
            last_validated_at: row.get(10)?,
            deactivated_at: row.get(11)?,
            blacklisted_at: row.get(12)?,
        })
    }
}

impl FromRow for Event {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(7)?;
        Ok(Event {
            id: row.get(0)?,
            license_id: row.get(1)?,
            activation_id: row.get(2)?,
            serial_number: row.get(3)?,
            event_type: get_enum(row, 4)?,
            event_subtype: row.get(5)?,
            severity: get_enum(row, 6)?,
            details: details.and_then(|s| serde_json::from_str(&s).ok()),
            machine_code: row.get(8)?,
            ip_address: row.get(9)?,
            user_agent: row.get(10)?,
            created_at: row.get(11)?,
            is_confirmed: row.get::<_, i32>(12)? != 0,
            confirmed_by: row.get(13)?,
            confirmed_at: row.get(14)?,
        })
    }
}

impl FromRow for EventWithCustomer {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(EventWithCustomer {
            event: Event::from_row(row)?,
            customer_name: row.get(15)?,
        })
    }
}
