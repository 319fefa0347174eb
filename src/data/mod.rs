//! Data persistence layer for PromptCrafter
//!
//! This module provides SQLite-based storage for projects, their chat
//! transcripts and version graphs, prompt presets, and small app settings.

mod app_state;
mod database;
mod migrations;
mod models;
mod preset;
mod project;

pub use app_state::AppStateStore;
pub use database::{Database, DatabaseError};
pub use models::{
    ChatMessage, LoadedProject, MessagePatch, Project, ProjectSummary, PromptPresetSummary, Role,
    TaskType,
};
pub use preset::PresetStore;
pub use project::{ProjectBackend, ProjectStore};
