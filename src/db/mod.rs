mod from_row;
pub mod queries;
mod schema;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::crypto::LicenseKeys;
use crate::licensing::EngineSettings;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Concurrent binders wait this long for SQLite's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub engine: EngineSettings,
    pub license_keys: Arc<LicenseKeys>,
    /// Bearer token for the admin API. `None` leaves it open.
    pub admin_token: Option<Arc<str>>,
}

fn manager(manager: SqliteConnectionManager) -> SqliteConnectionManager {
    manager.with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    })
}

/// Open a file-backed pool and make sure the schema exists.
pub fn create_pool(path: &str) -> Result<DbPool, r2d2::Error> {
    let pool = Pool::builder().build(manager(SqliteConnectionManager::file(path)))?;
    Ok(pool)
}

/// Single-connection in-memory pool. Every `:memory:` connection is its own
/// database, so the pool must never open a second one.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager(SqliteConnectionManager::memory()))
}

/// Apply journal settings and create tables.
pub fn prepare(pool: &DbPool) -> crate::error::Result<()> {
    let conn = pool.get()?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!("SQLite journal mode: {}", mode);
    init_db(&conn)?;
    Ok(())
}
