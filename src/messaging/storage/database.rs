//! Shared `SQLite` connection setup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::messaging::core::config::StorageConfig;
use crate::messaging::core::errors::{TalkError, TalkResult};

/// Open the database every store shares.
///
/// All stores must use the same connection: the friends ranking reads users
/// and conversations written by different stores, and an in-memory database
/// only exists for the connection that created it.
///
/// # Errors
/// Returns an error if the database cannot be opened or configured.
pub async fn open_database(config: &StorageConfig) -> TalkResult<Arc<Connection>> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory().await?
    } else {
        Connection::open(&config.sqlite_path).await?
    };

    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let in_memory = config.is_in_memory();
    conn.call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        if !in_memory {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    })
    .await?;

    debug!(path = %config.sqlite_path.display(), "Opened talk room database");
    Ok(Arc::new(conn))
}

/// Decode a stored Unix-millisecond timestamp.
pub(crate) fn decode_timestamp(millis: i64) -> TalkResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| TalkError::CorruptRecord(format!("invalid timestamp: {millis}")))
}
