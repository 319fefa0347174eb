pub mod config;
pub mod data;
pub mod model;
pub mod prompt;
pub mod util;
pub mod version;
pub mod workbench;

pub use config::Config;
pub use data::{Database, PresetStore, ProjectBackend, ProjectStore};
pub use model::{GenerationOptions, ModelClient, ModelError, OllamaClient};
pub use version::{
    migrate_version_graph, IdGenerator, NewVersion, UuidGenerator, VersionGraph, VersionNode,
};
pub use workbench::{
    PromptPresetSummary, PromptTab, PromptWorkspaceState, TabError, TabManager, TaskType,
    Workbench,
};
