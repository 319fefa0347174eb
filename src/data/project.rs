//! Project data access object

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::database::DatabaseError;
use super::models::{ChatMessage, LoadedProject, Project, ProjectSummary, Role};
use crate::version::VersionGraph;

/// Whole-project persistence used by the workbench
pub trait ProjectBackend {
    /// Create an empty project and return it
    fn create_project(&self, title: &str, preset_id: Option<&str>) -> Result<Project, DatabaseError>;

    /// Load a project with its newest `message_limit` messages, oldest first
    fn load_project(&self, id: &str, message_limit: usize) -> Result<LoadedProject, DatabaseError>;

    /// Persist messages and return them carrying their stored ids
    fn append_messages(
        &self,
        project_id: &str,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>, DatabaseError>;

    fn save_version_graph(&self, project_id: &str, graph: &VersionGraph)
        -> Result<(), DatabaseError>;

    fn delete_project(&self, id: &str) -> Result<(), DatabaseError>;
}

/// Data access object for projects and their messages
#[derive(Clone)]
pub struct ProjectStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProjectStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Get a project by ID
    pub fn get_by_id(&self, id: &str) -> Result<Option<Project>, DatabaseError> {
        let conn = self.conn.lock();
        Self::get_by_id_with_conn(&conn, id)
    }

    fn get_by_id_with_conn(conn: &Connection, id: &str) -> Result<Option<Project>, DatabaseError> {
        let project = conn
            .query_row(
                "SELECT id, title, preset_id, created_at, updated_at FROM projects WHERE id = ?1",
                params![id],
                Self::row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    /// List projects, most recently updated first
    pub fn list(&self) -> Result<Vec<ProjectSummary>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.updated_at, COUNT(m.id) AS message_count
             FROM projects p
             LEFT JOIN messages m ON m.project_id = p.id
             GROUP BY p.id
             ORDER BY p.updated_at DESC",
        )?;

        let projects = stmt
            .query_map([], |row| {
                let updated_at: String = row.get("updated_at")?;
                let message_count: i64 = row.get("message_count")?;
                Ok(ProjectSummary {
                    id: row.get("id")?,
                    title: row.get("title")?,
                    updated_at: parse_timestamp(&updated_at),
                    message_count: message_count as usize,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(projects)
    }

    /// Rename a project
    pub fn set_title(&self, id: &str, title: &str) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE projects SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, title, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(DatabaseError::ProjectNotFound(id.to_string()));
        }
        Ok(())
    }

    fn touch(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE projects SET updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )
    }

    /// Convert a database row to a Project
    fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Project {
            id: row.get("id")?,
            title: row.get("title")?,
            preset_id: row.get("preset_id")?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

impl ProjectBackend for ProjectStore {
    fn create_project(&self, title: &str, preset_id: Option<&str>) -> Result<Project, DatabaseError> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::now_v7().to_string(),
            title: Some(title.to_string()),
            preset_id: preset_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO projects (id, title, preset_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.title,
                project.preset_id,
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(project)
    }

    fn load_project(&self, id: &str, message_limit: usize) -> Result<LoadedProject, DatabaseError> {
        let conn = self.conn.lock();
        let project = Self::get_by_id_with_conn(&conn, id)?
            .ok_or_else(|| DatabaseError::ProjectNotFound(id.to_string()))?;

        let raw_graph: Option<String> = conn.query_row(
            "SELECT version_graph FROM projects WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let version_graph = raw_graph.and_then(|raw| {
            serde_json::from_str::<Value>(&raw)
                .map_err(|e| {
                    warn!(project_id = %id, error = %e, "Failed to parse stored version graph");
                })
                .ok()
        });

        // Newest `limit` rows, returned oldest first
        let mut stmt = conn.prepare(
            "SELECT id, role, content FROM (
                 SELECT rowid AS seq, id, role, content FROM messages
                 WHERE project_id = ?1
                 ORDER BY rowid DESC
                 LIMIT ?2
             ) ORDER BY seq ASC",
        )?;
        let messages = stmt
            .query_map(params![id, message_limit as i64], |row| {
                let role: String = row.get("role")?;
                Ok(ChatMessage {
                    id: row.get("id")?,
                    role: Role::parse(&role),
                    content: row.get("content")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(LoadedProject {
            title: project.title,
            preset_id: project.preset_id,
            messages,
            version_graph,
        })
    }

    fn append_messages(
        &self,
        project_id: &str,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if Self::touch(&tx, project_id)? == 0 {
            return Err(DatabaseError::ProjectNotFound(project_id.to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let mut created = Vec::with_capacity(messages.len());
        for message in messages {
            let stored = ChatMessage {
                id: Uuid::now_v7().to_string(),
                role: message.role,
                content: message.content.clone(),
            };
            tx.execute(
                "INSERT INTO messages (id, project_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![stored.id, project_id, stored.role.as_str(), stored.content, now],
            )?;
            created.push(stored);
        }
        tx.commit()?;
        Ok(created)
    }

    fn save_version_graph(
        &self,
        project_id: &str,
        graph: &VersionGraph,
    ) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(graph)?;
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE projects SET version_graph = ?2, updated_at = ?3 WHERE id = ?1",
            params![project_id, raw, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(DatabaseError::ProjectNotFound(project_id.to_string()));
        }
        Ok(())
    }

    fn delete_project(&self, id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
