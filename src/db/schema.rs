use rusqlite::Connection;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            tax_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            address TEXT,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            version TEXT,
            description TEXT,
            features TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            serial_number TEXT NOT NULL UNIQUE,
            customer_id TEXT NOT NULL REFERENCES customers(id),
            product_id TEXT NOT NULL REFERENCES products(id),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'active', 'expired', 'disabled')),
            connection_type TEXT NOT NULL DEFAULT 'network'
                CHECK (connection_type IN ('network', 'standalone')),
            max_activations INTEGER NOT NULL DEFAULT 1 CHECK (max_activations >= 1),
            expires_at INTEGER,
            features TEXT NOT NULL DEFAULT '[]',
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_customer ON licenses(customer_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_status_expiry ON licenses(status, expires_at);

        CREATE TABLE IF NOT EXISTS activations (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            machine_code TEXT NOT NULL,
            keypro_id TEXT,
            motherboard_id TEXT,
            disk_id TEXT,
            app_version TEXT,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'deactivated', 'blacklisted')),
            ip_address TEXT,
            activated_at INTEGER NOT NULL,
            last_validated_at INTEGER,
            deactivated_at INTEGER,
            blacklisted_at INTEGER,
            UNIQUE (license_id, machine_code)
        );

        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            activation_id TEXT REFERENCES activations(id) ON DELETE SET NULL,
            serial_number TEXT NOT NULL,
            event_type TEXT NOT NULL,
            event_subtype TEXT,
            severity TEXT NOT NULL
                CHECK (severity IN ('info', 'warning', 'suspicious', 'critical')),
            details TEXT,
            machine_code TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at INTEGER NOT NULL,
            is_confirmed INTEGER NOT NULL DEFAULT 0,
            confirmed_by TEXT,
            confirmed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_events_license ON events(license_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_severity ON events(severity, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_unconfirmed ON events(license_id, is_confirmed);
        "#,
    )
}
