use chrono::Utc;
use rusqlite::{Connection, ToSql, params, types::Value};
use uuid::Uuid;

use crate::error::Result;
use crate::licensing::HardwareDescriptor;
use crate::models::*;
use crate::pagination::Page;

use super::from_row::{
    ACTIVATION_COLS, CUSTOMER_COLS, EVENT_COLS, EVENT_WITH_CUSTOMER_COLS, LICENSE_COLS,
    LICENSE_WITH_RELATIONS_COLS, PRODUCT_COLS, query_all, query_one,
};

pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// `%term%` for a case-insensitive LIKE, with the LIKE wildcards escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value, NULL included.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Customers ============

pub fn create_customer(conn: &Connection, input: &CreateCustomer) -> Result<Customer> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO customers (id, tax_id, name, email, phone, address, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            &input.tax_id,
            &input.name,
            &input.email,
            &input.phone,
            &input.address,
            &input.notes,
            now,
            now
        ],
    )?;

    Ok(Customer {
        id,
        tax_id: input.tax_id.clone(),
        name: input.name.clone(),
        email: input.email.clone(),
        phone: input.phone.clone(),
        address: input.address.clone(),
        notes: input.notes.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_customer_by_id(conn: &Connection, id: &str) -> Result<Option<Customer>> {
    query_one(
        conn,
        &format!("SELECT {} FROM customers c WHERE c.id = ?1", CUSTOMER_COLS),
        &[&id],
    )
}

pub fn get_customer_by_tax_id(conn: &Connection, tax_id: &str) -> Result<Option<Customer>> {
    query_one(
        conn,
        &format!("SELECT {} FROM customers c WHERE c.tax_id = ?1", CUSTOMER_COLS),
        &[&tax_id],
    )
}

pub fn list_customers(conn: &Connection) -> Result<Vec<Customer>> {
    query_all(
        conn,
        &format!("SELECT {} FROM customers c ORDER BY c.name", CUSTOMER_COLS),
        params![],
    )
}

// ============ Products ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let id = gen_id();
    let now = now();
    let features = serde_json::to_string(&input.features)?;

    conn.execute(
        "INSERT INTO products (id, name, version, description, features, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![&id, &input.name, &input.version, &input.description, &features, now, now],
    )?;

    Ok(Product {
        id,
        name: input.name.clone(),
        version: input.version.clone(),
        description: input.description.clone(),
        features: input.features.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products p WHERE p.id = ?1", PRODUCT_COLS),
        &[&id],
    )
}

pub fn list_products(conn: &Connection) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!("SELECT {} FROM products p ORDER BY p.name", PRODUCT_COLS),
        params![],
    )
}

// ============ Licenses ============

/// Generate a serial number in the format PREFIX-XXXXXXXX-XXXXXXXX.
/// Ambiguous characters (0/O, 1/I) are excluded.
pub fn generate_serial_number(prefix: &str) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();

    let mut part = || -> String {
        (0..8)
            .map(|_| chars[rng.gen_range(0..chars.len())])
            .collect()
    };

    format!("{}-{}-{}", prefix, part(), part())
}

pub fn serial_number_exists(conn: &Connection, serial_number: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM licenses WHERE serial_number = ?1)",
        params![serial_number],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn create_license(
    conn: &Connection,
    serial_number: &str,
    status: LicenseStatus,
    input: &CreateLicense,
) -> Result<License> {
    let id = gen_id();
    let now = now();
    let features = serde_json::to_string(&input.features)?;

    conn.execute(
        "INSERT INTO licenses (id, serial_number, customer_id, product_id, status, connection_type, max_activations, expires_at, features, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            &id,
            serial_number,
            &input.customer_id,
            &input.product_id,
            status.as_ref(),
            input.connection_type.as_ref(),
            input.max_activations,
            input.expires_at,
            &features,
            &input.notes,
            now,
            now
        ],
    )?;

    Ok(License {
        id,
        serial_number: serial_number.to_string(),
        customer_id: input.customer_id.clone(),
        product_id: input.product_id.clone(),
        status,
        connection_type: input.connection_type,
        max_activations: input.max_activations,
        expires_at: input.expires_at,
        features: input.features.clone(),
        notes: input.notes.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses l WHERE l.id = ?1", LICENSE_COLS),
        &[&id],
    )
}

pub fn get_license_by_serial(conn: &Connection, serial_number: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses l WHERE l.serial_number = ?1", LICENSE_COLS),
        &[&serial_number],
    )
}

pub fn get_license_with_relations(
    conn: &Connection,
    id: &str,
) -> Result<Option<LicenseWithRelations>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses l
             JOIN customers c ON c.id = l.customer_id
             JOIN products p ON p.id = l.product_id
             WHERE l.id = ?1",
            LICENSE_WITH_RELATIONS_COLS
        ),
        &[&id],
    )
}

pub fn list_licenses(
    conn: &Connection,
    query: &LicenseQuery,
    page: Page,
) -> Result<(Vec<LicenseWithRelations>, i64)> {
    let mut where_clause = String::from("WHERE 1=1");
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        where_clause.push_str(
            " AND (LOWER(c.name) LIKE ? ESCAPE '\\' OR LOWER(c.tax_id) LIKE ? ESCAPE '\\')",
        );
        let pattern = like_pattern(search);
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }
    if let Some(status) = query.status {
        where_clause.push_str(" AND l.status = ?");
        params.push(Box::new(status.as_ref().to_string()));
    }

    let from = "FROM licenses l
         JOIN customers c ON c.id = l.customer_id
         JOIN products p ON p.id = l.product_id";

    let count_sql = format!("SELECT COUNT(*) {} {}", from, where_clause);
    let refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(&count_sql, refs.as_slice(), |row| row.get(0))?;

    let order = LicenseOrder::parse_or_default(query.order_by.as_deref());
    let select_sql = format!(
        "SELECT {} {} {} ORDER BY {} LIMIT ? OFFSET ?",
        LICENSE_WITH_RELATIONS_COLS,
        from,
        where_clause,
        order.sql()
    );
    params.push(Box::new(page.limit));
    params.push(Box::new(page.offset()));
    let refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let items = query_all(conn, &select_sql, refs.as_slice())?;

    Ok((items, total))
}

pub fn update_license(conn: &Connection, id: &str, input: &UpdateLicense) -> Result<bool> {
    let features = input
        .features
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut builder = UpdateBuilder::new("licenses", id)
        .with_updated_at()
        .set_opt("features", features)
        .set_opt(
            "connection_type",
            input.connection_type.map(|c| c.as_ref().to_string()),
        )
        .set_opt("max_activations", input.max_activations);

    if let Some(notes) = &input.notes {
        builder = builder.set_nullable("notes", notes.clone());
    }
    if let Some(expires_at) = input.expires_at {
        builder = builder.set_nullable("expires_at", expires_at);
    }

    builder.execute(conn)
}

pub fn set_license_status(conn: &Connection, id: &str, status: LicenseStatus) -> Result<bool> {
    UpdateBuilder::new("licenses", id)
        .with_updated_at()
        .set("status", status.as_ref().to_string())
        .execute(conn)
}

pub fn set_license_expiry(
    conn: &Connection,
    id: &str,
    expires_at: i64,
    status: LicenseStatus,
) -> Result<bool> {
    UpdateBuilder::new("licenses", id)
        .with_updated_at()
        .set("expires_at", expires_at)
        .set("status", status.as_ref().to_string())
        .execute(conn)
}

pub fn delete_license(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM licenses WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Flip every active license whose expiry has passed to expired.
/// Returns the number of licenses changed.
pub fn expire_overdue_licenses(conn: &Connection, at: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE licenses SET status = 'expired', updated_at = ?1
         WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < ?1",
        params![at],
    )?;
    Ok(changed)
}

// ============ Activations ============

pub fn get_activation_by_id(conn: &Connection, id: &str) -> Result<Option<Activation>> {
    query_one(
        conn,
        &format!("SELECT {} FROM activations a WHERE a.id = ?1", ACTIVATION_COLS),
        &[&id],
    )
}

pub fn get_activation_for_machine(
    conn: &Connection,
    license_id: &str,
    machine_code: &str,
) -> Result<Option<Activation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM activations a WHERE a.license_id = ?1 AND a.machine_code = ?2",
            ACTIVATION_COLS
        ),
        &[&license_id, &machine_code],
    )
}

/// All activations of a license in every status, newest first.
pub fn list_activations_for_license(conn: &Connection, license_id: &str) -> Result<Vec<Activation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM activations a WHERE a.license_id = ?1
             ORDER BY a.activated_at DESC, a.rowid DESC",
            ACTIVATION_COLS
        ),
        &[&license_id],
    )
}

/// Activations holding a slot: active and blacklisted rows.
pub fn count_quota_activations(conn: &Connection, license_id: &str) -> Result<i32> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM activations
         WHERE license_id = ?1 AND status IN ('active', 'blacklisted')",
        params![license_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn create_activation(
    conn: &Connection,
    license_id: &str,
    machine_code: &str,
    hardware: &HardwareDescriptor,
    app_version: Option<&str>,
    ip_address: Option<&str>,
) -> Result<Activation> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO activations (id, license_id, machine_code, keypro_id, motherboard_id, disk_id, app_version, status, ip_address, activated_at, last_validated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?9, ?10)",
        params![
            &id,
            license_id,
            machine_code,
            &hardware.keypro_id,
            &hardware.motherboard_id,
            &hardware.disk_id,
            app_version,
            ip_address,
            now,
            now
        ],
    )?;

    Ok(Activation {
        id,
        license_id: license_id.to_string(),
        machine_code: machine_code.to_string(),
        keypro_id: hardware.keypro_id.clone(),
        motherboard_id: hardware.motherboard_id.clone(),
        disk_id: hardware.disk_id.clone(),
        app_version: app_version.map(String::from),
        status: ActivationStatus::Active,
        ip_address: ip_address.map(String::from),
        activated_at: now,
        last_validated_at: Some(now),
        deactivated_at: None,
        blacklisted_at: None,
    })
}

/// Store the latest hardware snapshot after a validation.
/// `app_version` only overwrites when the client reported one.
pub fn record_activation_validation(
    conn: &Connection,
    id: &str,
    hardware: &HardwareDescriptor,
    app_version: Option<&str>,
    ip_address: Option<&str>,
) -> Result<bool> {
    UpdateBuilder::new("activations", id)
        .set_nullable("keypro_id", hardware.keypro_id.clone())
        .set_nullable("motherboard_id", hardware.motherboard_id.clone())
        .set_nullable("disk_id", hardware.disk_id.clone())
        .set_opt("app_version", app_version.map(String::from))
        .set_nullable("ip_address", ip_address.map(String::from))
        .set("last_validated_at", now())
        .execute(conn)
}

/// Bring a deactivated row back to active with a fresh hardware snapshot.
pub fn reactivate_activation(
    conn: &Connection,
    id: &str,
    hardware: &HardwareDescriptor,
    app_version: Option<&str>,
    ip_address: Option<&str>,
) -> Result<bool> {
    let now = now();
    let updated = conn.execute(
        "UPDATE activations
         SET status = 'active', keypro_id = ?1, motherboard_id = ?2, disk_id = ?3,
             app_version = COALESCE(?4, app_version), ip_address = ?5,
             activated_at = ?6, last_validated_at = ?6, deactivated_at = NULL
         WHERE id = ?7 AND status = 'deactivated'",
        params![
            &hardware.keypro_id,
            &hardware.motherboard_id,
            &hardware.disk_id,
            app_version,
            ip_address,
            now,
            id
        ],
    )?;
    Ok(updated > 0)
}

/// Active -> deactivated. Returns false if the row wasn't active.
pub fn deactivate_activation(conn: &Connection, id: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE activations SET status = 'deactivated', deactivated_at = ?1
         WHERE id = ?2 AND status = 'active'",
        params![now(), id],
    )?;
    Ok(updated > 0)
}

/// Any non-blacklisted status -> blacklisted. Returns false if already blacklisted.
pub fn blacklist_activation(conn: &Connection, id: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE activations SET status = 'blacklisted', blacklisted_at = ?1
         WHERE id = ?2 AND status != 'blacklisted'",
        params![now(), id],
    )?;
    Ok(updated > 0)
}

// ============ Events ============

pub fn create_event(conn: &Connection, input: &CreateEvent) -> Result<Event> {
    let id = gen_id();
    let now = now();
    let details = input.details.as_ref().map(|d| d.to_string());
    let confirmed_at = input.confirmed_by.as_ref().map(|_| now);

    conn.execute(
        "INSERT INTO events (id, license_id, activation_id, serial_number, event_type, event_subtype, severity, details, machine_code, ip_address, user_agent, created_at, is_confirmed, confirmed_by, confirmed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            &id,
            &input.license_id,
            &input.activation_id,
            &input.serial_number,
            input.event_type.as_ref(),
            &input.event_subtype,
            input.severity.as_ref(),
            &details,
            &input.machine_code,
            &input.ip_address,
            &input.user_agent,
            now,
            input.confirmed_by.is_some(),
            &input.confirmed_by,
            confirmed_at
        ],
    )?;

    Ok(Event {
        id,
        license_id: input.license_id.clone(),
        activation_id: input.activation_id.clone(),
        serial_number: input.serial_number.clone(),
        event_type: input.event_type,
        event_subtype: input.event_subtype.clone(),
        severity: input.severity,
        details: input.details.clone(),
        machine_code: input.machine_code.clone(),
        ip_address: input.ip_address.clone(),
        user_agent: input.user_agent.clone(),
        created_at: now,
        is_confirmed: input.confirmed_by.is_some(),
        confirmed_by: input.confirmed_by.clone(),
        confirmed_at,
    })
}

pub fn get_event_by_id(conn: &Connection, id: &str) -> Result<Option<Event>> {
    query_one(
        conn,
        &format!("SELECT {} FROM events e WHERE e.id = ?1", EVENT_COLS),
        &[&id],
    )
}

/// Most recent events of a license, newest first.
pub fn list_events_for_license(conn: &Connection, license_id: &str, limit: i64) -> Result<Vec<Event>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM events e WHERE e.license_id = ?1
             ORDER BY e.created_at DESC, e.rowid DESC LIMIT ?2",
            EVENT_COLS
        ),
        params![license_id, limit],
    )
}

pub fn list_unconfirmed_events_for_license(conn: &Connection, license_id: &str) -> Result<Vec<Event>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM events e WHERE e.license_id = ?1 AND e.is_confirmed = 0
             ORDER BY e.created_at DESC, e.rowid DESC",
            EVENT_COLS
        ),
        &[&license_id],
    )
}

pub fn count_unconfirmed_events_for_license(conn: &Connection, license_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE license_id = ?1 AND is_confirmed = 0",
        params![license_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Suspicious and critical events created at or after `since`, newest first.
pub fn list_alarming_events(conn: &Connection, since: i64, limit: i64) -> Result<Vec<EventWithCustomer>> {
    let severities: Vec<String> = Severity::ALARMING
        .iter()
        .map(|s| format!("'{}'", s.as_ref()))
        .collect();
    query_all(
        conn,
        &format!(
            "SELECT {} FROM events e
             JOIN licenses l ON l.id = e.license_id
             LEFT JOIN customers c ON c.id = l.customer_id
             WHERE e.severity IN ({}) AND e.created_at >= ?1
             ORDER BY e.created_at DESC, e.rowid DESC LIMIT ?2",
            EVENT_WITH_CUSTOMER_COLS,
            severities.join(", ")
        ),
        params![since, limit],
    )
}

pub fn list_events(
    conn: &Connection,
    query: &EventQuery,
    page: Page,
) -> Result<(Vec<EventWithCustomer>, i64)> {
    let mut where_clause = String::from("WHERE 1=1");
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    let text_filters = [
        ("e.serial_number", &query.serial_number),
        ("c.name", &query.customer_name),
        ("c.tax_id", &query.tax_id),
    ];
    for (column, value) in text_filters {
        if let Some(term) = value.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            where_clause.push_str(&format!(" AND LOWER({}) LIKE ? ESCAPE '\\'", column));
            params.push(Box::new(like_pattern(term)));
        }
    }
    if let Some(severity) = query.severity {
        where_clause.push_str(" AND e.severity = ?");
        params.push(Box::new(severity.as_ref().to_string()));
    }
    if let Some(event_type) = query.event_type {
        where_clause.push_str(" AND e.event_type = ?");
        params.push(Box::new(event_type.as_ref().to_string()));
    }
    if let Some(confirmed) = query.is_confirmed {
        where_clause.push_str(" AND e.is_confirmed = ?");
        params.push(Box::new(confirmed));
    }

    let from = "FROM events e
         JOIN licenses l ON l.id = e.license_id
         LEFT JOIN customers c ON c.id = l.customer_id";

    let count_sql = format!("SELECT COUNT(*) {} {}", from, where_clause);
    let refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(&count_sql, refs.as_slice(), |row| row.get(0))?;

    let order = EventOrder::parse_or_default(query.order_by.as_deref());
    let select_sql = format!(
        "SELECT {} {} {} ORDER BY {} LIMIT ? OFFSET ?",
        EVENT_WITH_CUSTOMER_COLS,
        from,
        where_clause,
        order.sql()
    );
    params.push(Box::new(page.limit));
    params.push(Box::new(page.offset()));
    let refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let items = query_all(conn, &select_sql, refs.as_slice())?;

    Ok((items, total))
}

/// Compare-and-swap confirmation. Only the first caller flips the row;
/// returns false when the event was already confirmed (or doesn't exist).
pub fn try_confirm_event(conn: &Connection, id: &str, confirmed_by: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE events SET is_confirmed = 1, confirmed_by = ?1, confirmed_at = ?2
         WHERE id = ?3 AND is_confirmed = 0",
        params![confirmed_by, now(), id],
    )?;
    Ok(updated > 0)
}
