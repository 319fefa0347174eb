//! Data models for projects, chat messages and presets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::GenerationOptions;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// String representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" => Role::User,
            _ => Role::Assistant,
        }
    }
}

/// One entry in a tab's conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
        }
    }
}

/// Partial update applied to a message by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// Replacement id (e.g. the id assigned once persistence completes)
    pub id: Option<String>,
    pub content: Option<String>,
}

impl MessagePatch {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            content: None,
        }
    }
}

/// Kind of prompt a preset is tuned for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    General,
    Coding,
    Image,
    Video,
    Research,
    Writing,
    Marketing,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::General => "general",
            TaskType::Coding => "coding",
            TaskType::Image => "image",
            TaskType::Video => "video",
            TaskType::Research => "research",
            TaskType::Writing => "writing",
            TaskType::Marketing => "marketing",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "coding" => TaskType::Coding,
            "image" => TaskType::Image,
            "video" => TaskType::Video,
            "research" => TaskType::Research,
            "writing" => TaskType::Writing,
            "marketing" => TaskType::Marketing,
            _ => TaskType::General,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Preset a tab was opened with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPresetSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

impl PromptPresetSummary {
    pub fn new(name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: None,
            name: name.into(),
            task_type,
            options: None,
        }
    }

    /// Key used to track recently applied presets
    pub fn recent_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// A persisted prompt project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: Option<String>,
    pub preset_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shown in the project list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Everything needed to reopen a project in a tab
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub title: Option<String>,
    pub preset_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Raw persisted graph; shape is only trusted after migration
    pub version_graph: Option<Value>,
}
