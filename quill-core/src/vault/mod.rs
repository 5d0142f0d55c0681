// quill-core/src/vault/mod.rs

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::BackupError;

pub mod schema;

pub const ROLLING_PREFIX: &str = "rolling:";
pub const EMERGENCY_PREFIX: &str = "emergency:";

const MAX_KEY_ATTEMPTS: u32 = 8;

// ════════════════════════════════════════════════════════════════════
// Data types
// ════════════════════════════════════════════════════════════════════

/// One stored snapshot. For rolling keys `content` is markup; for emergency
/// keys it is a JSON-encoded `EmergencyPayload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub key: String,
    pub content: String,
    /// Unix milliseconds.
    pub captured_at: i64,
}

/// Partial content rescued from a failed save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyPayload {
    pub session_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub reason: String,
    pub markup: String,
}

// ════════════════════════════════════════════════════════════════════
// BackupStore
// ════════════════════════════════════════════════════════════════════

/// Client-local key/value store for rolling and emergency backups.
///
/// Clones share one connection, so every session in the process sees the
/// same records. The public read/write methods never fail: errors are
/// logged and reported as "no backup".
#[derive(Debug, Clone)]
pub struct BackupStore {
    conn: Arc<Mutex<Connection>>,
    last_emergency: Arc<AtomicI64>,
}

impl BackupStore {
    /// Open the store at the specified path.
    /// Creates the database file and runs the migration if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackupError> {
        let conn = Connection::open(&path)?;

        // WAL mode so concurrent host processes can share the file
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(schema::MIGRATION_INIT)?;

        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, BackupError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::MIGRATION_INIT)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            last_emergency: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn rolling_key(session_id: &Uuid) -> String {
        format!("{ROLLING_PREFIX}{session_id}")
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ────────────────────────────────────────────────────────────────
    // Rolling backups
    // ────────────────────────────────────────────────────────────────

    /// Create or overwrite `key`. Returns false if the write failed.
    pub fn save(&self, key: &str, markup: &str) -> bool {
        match self.try_save(key, markup) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(op = "backup.save", key, at = %Utc::now(), error = %e, "backup write failed");
                false
            }
        }
    }

    fn try_save(&self, key: &str, markup: &str) -> Result<(), BackupError> {
        if key.starts_with(EMERGENCY_PREFIX) {
            return Err(BackupError::ProtectedKey(key.to_string()));
        }
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO backups (key, content, captured_at) VALUES (?1, ?2, ?3)",
            params![key, markup, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    pub fn load(&self, key: &str) -> Option<String> {
        self.record(key).map(|r| r.content)
    }

    pub fn record(&self, key: &str) -> Option<BackupRecord> {
        match self.try_record(key) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(op = "backup.load", key, at = %Utc::now(), error = %e, "backup read failed");
                None
            }
        }
    }

    fn try_record(&self, key: &str) -> Result<Option<BackupRecord>, BackupError> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT key, content, captured_at FROM backups WHERE key = ?1",
                params![key],
                |row| {
                    Ok(BackupRecord {
                        key: row.get(0)?,
                        content: row.get(1)?,
                        captured_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // ────────────────────────────────────────────────────────────────
    // Emergency backups
    // ────────────────────────────────────────────────────────────────

    /// Write a new emergency record and return its key. Never overwrites:
    /// the key's timestamp is strictly increasing per store, and a key taken
    /// by another process is retried with the next one.
    pub fn save_emergency(&self, payload: &EmergencyPayload) -> Option<String> {
        match self.try_save_emergency(payload) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(
                    op = "backup.emergency",
                    session_id = %payload.session_id,
                    at = %Utc::now(),
                    error = %e,
                    "emergency backup write failed"
                );
                None
            }
        }
    }

    fn try_save_emergency(&self, payload: &EmergencyPayload) -> Result<String, BackupError> {
        let content = serde_json::to_string(payload)?;
        let conn = self.lock();

        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = format!(
                "{EMERGENCY_PREFIX}{:020}",
                self.next_emergency_stamp(payload.captured_at.timestamp_micros())
            );
            let inserted = conn.execute(
                "INSERT INTO backups (key, content, captured_at) VALUES (?1, ?2, ?3)",
                params![key, content, payload.captured_at.timestamp_millis()],
            );
            match inserted {
                Ok(_) => return Ok(key),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    continue
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BackupError::KeyCollision(MAX_KEY_ATTEMPTS))
    }

    fn next_emergency_stamp(&self, now_micros: i64) -> i64 {
        let next = |last: i64| now_micros.max(last + 1);
        match self
            .last_emergency
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
        {
            Ok(prev) | Err(prev) => next(prev),
        }
    }

    pub fn load_emergency(&self, key: &str) -> Option<EmergencyPayload> {
        if !key.starts_with(EMERGENCY_PREFIX) {
            return None;
        }
        let record = self.record(key)?;
        match serde_json::from_str(&record.content) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(op = "backup.load_emergency", key, error = %e, "emergency record is not valid JSON");
                None
            }
        }
    }

    pub fn list_emergency(&self) -> Vec<BackupRecord> {
        self.list(EMERGENCY_PREFIX)
    }

    /// All records whose key starts with `prefix`, oldest first.
    pub fn list(&self, prefix: &str) -> Vec<BackupRecord> {
        match self.try_list(prefix) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(op = "backup.list", prefix, at = %Utc::now(), error = %e, "backup listing failed");
                Vec::new()
            }
        }
    }

    fn try_list(&self, prefix: &str) -> Result<Vec<BackupRecord>, BackupError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT key, content, captured_at FROM backups
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC",
        )?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok(BackupRecord {
                key: row.get(0)?,
                content: row.get(1)?,
                captured_at: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ────────────────────────────────────────────────────────────────
    // Reclamation
    // ────────────────────────────────────────────────────────────────

    /// Delete a record the host no longer needs. Returns true if one existed.
    pub fn reclaim(&self, key: &str) -> bool {
        let conn = self.lock();
        match conn.execute("DELETE FROM backups WHERE key = ?1", params![key]) {
            Ok(affected) => affected > 0,
            Err(e) => {
                tracing::warn!(op = "backup.reclaim", key, at = %Utc::now(), error = %e, "backup reclaim failed");
                false
            }
        }
    }
}
