//! Prompt tabs and the orchestration around them

pub mod controller;
pub mod tab;
pub mod tab_manager;

pub use crate::data::{PromptPresetSummary, TaskType};
pub use controller::{PendingSend, SendOutcome, Workbench, WorkbenchError, ABORTED_MARKER};
pub use tab::PromptTab;
pub use tab_manager::{PromptWorkspaceState, TabError, TabManager, DEFAULT_MAX_TABS};
