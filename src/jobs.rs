//! Background maintenance tasks.

use std::time::Duration;

use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::licensing::lifecycle;

/// Expire every overdue active license once.
pub fn sweep_expired_once(pool: &DbPool) -> Result<usize> {
    let conn = pool.get()?;
    lifecycle::sweep_expired(&conn, queries::now())
}

/// Run the expiry sweep every `interval` until the runtime shuts down.
/// Validation checks expiry on its own; this only keeps listings current.
pub fn spawn_expiry_sweep(pool: DbPool, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let pool = pool.clone();
            match tokio::task::spawn_blocking(move || sweep_expired_once(&pool)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!("Expiry sweep failed: {}", e),
                Err(e) => tracing::error!("Expiry sweep task panicked: {}", e),
            }
        }
    })
}
