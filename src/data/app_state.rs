//! App state data access object (key-value store)

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::Arc;
use tracing::warn;

/// Key under which recently applied preset keys are kept
const RECENT_PRESETS_KEY: &str = "recent-presets";
/// Number of recent presets remembered
const RECENT_PRESETS_MAX: usize = 3;

/// Data access object for app state (key-value store)
#[derive(Clone)]
pub struct AppStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl AppStateStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Set a value (insert or update)
    pub fn set(&self, key: &str, value: &str) -> SqliteResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO app_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> SqliteResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM app_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
    }

    /// Delete a key
    pub fn delete(&self, key: &str) -> SqliteResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM app_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Clear all state
    pub fn clear_all(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM app_state", [])?;
        Ok(())
    }

    /// Recently applied preset keys, most recent first
    pub fn recent_presets(&self) -> SqliteResult<Vec<String>> {
        let raw = self.get(RECENT_PRESETS_KEY)?;
        Ok(raw
            .and_then(|value| {
                serde_json::from_str::<Vec<String>>(&value)
                    .map_err(|e| warn!(error = %e, "Failed to deserialize recent presets"))
                    .ok()
            })
            .unwrap_or_default())
    }

    /// Move `key` to the front of the recent preset list
    pub fn record_recent_preset(&self, key: &str) -> SqliteResult<Vec<String>> {
        let mut recent = self.recent_presets()?;
        recent.retain(|existing| existing != key);
        recent.insert(0, key.to_string());
        recent.truncate(RECENT_PRESETS_MAX);

        let encoded = serde_json::to_string(&recent).unwrap_or_else(|_| "[]".to_string());
        self.set(RECENT_PRESETS_KEY, &encoded)?;
        Ok(recent)
    }
}
