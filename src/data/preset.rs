//! Prompt preset data access object

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tracing::warn;

use super::database::DatabaseError;
use super::models::{PromptPresetSummary, TaskType};
use crate::model::GenerationOptions;

/// Data access object for saved presets
#[derive(Clone)]
pub struct PresetStore {
    conn: Arc<Mutex<Connection>>,
}

impl PresetStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// All presets ordered by name
    pub fn list(&self) -> Result<Vec<PromptPresetSummary>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, name, task_type, options FROM presets ORDER BY name")?;
        let presets = stmt
            .query_map([], Self::row_to_preset)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(presets)
    }

    pub fn get(&self, id: &str) -> Result<Option<PromptPresetSummary>, DatabaseError> {
        let conn = self.conn.lock();
        let preset = conn
            .query_row(
                "SELECT id, name, task_type, options FROM presets WHERE id = ?1",
                params![id],
                Self::row_to_preset,
            )
            .optional()?;
        Ok(preset)
    }

    /// Look a preset up by id first, then by case-insensitive name
    pub fn find(&self, key: &str) -> Result<Option<PromptPresetSummary>, DatabaseError> {
        if let Some(preset) = self.get(key)? {
            return Ok(Some(preset));
        }
        Ok(self
            .list()?
            .into_iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(key)))
    }

    /// Insert or update a preset. Presets without an id are keyed by name.
    pub fn upsert(&self, preset: &PromptPresetSummary) -> Result<String, DatabaseError> {
        let id = preset
            .id
            .clone()
            .unwrap_or_else(|| preset.name.to_lowercase().replace(' ', "-"));
        let options = serde_json::to_string(&preset.options.clone().unwrap_or_default())?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO presets (id, name, task_type, options)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               task_type = excluded.task_type,
               options = excluded.options",
            params![id, preset.name, preset.task_type.as_str(), options],
        )?;
        Ok(id)
    }

    pub fn delete(&self, id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM presets WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn row_to_preset(row: &rusqlite::Row) -> rusqlite::Result<PromptPresetSummary> {
        let task_type: String = row.get("task_type")?;
        let options_json: String = row.get("options")?;
        let options = serde_json::from_str::<GenerationOptions>(&options_json)
            .map_err(|e| {
                warn!(error = %e, "Failed to deserialize preset options");
            })
            .ok();

        Ok(PromptPresetSummary {
            id: row.get("id")?,
            name: row.get("name")?,
            task_type: TaskType::parse(&task_type),
            options,
        })
    }
}
