use chrono::{DateTime, Utc};

use crate::data::{ChatMessage, PromptPresetSummary};
use crate::version::VersionGraph;

/// Title given to tabs that are not bound to a project yet
pub const NEW_TAB_TITLE: &str = "New Prompt";

/// One open editing session (one tab)
#[derive(Debug, Clone)]
pub struct PromptTab {
    /// Unique identifier for this tab
    pub id: String,
    /// Label shown in the tab strip
    pub title: String,
    /// Preset the tab was opened with
    pub preset: PromptPresetSummary,
    /// Persisted project backing this tab, once one exists
    pub project_id: Option<String>,
    /// Conversation in display order
    pub messages: Vec<ChatMessage>,
    pub version_graph: VersionGraph,
    /// Live editor text, independent of any committed version
    pub draft: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether a model call is in flight for this tab
    pub sending: bool,
    /// Last error surfaced to the user
    pub error: Option<String>,
    /// Whether the draft has edits not yet recorded as a version
    pub is_dirty: bool,
}

impl PromptTab {
    pub fn new(id: impl Into<String>, preset: PromptPresetSummary, version_graph: VersionGraph) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: NEW_TAB_TITLE.to_string(),
            preset,
            project_id: None,
            messages: Vec::new(),
            version_graph,
            draft: String::new(),
            created_at: now,
            updated_at: now,
            sending: false,
            error: None,
            is_dirty: false,
        }
    }

    /// Label for the tab strip, marking unsaved edits
    pub fn tab_label(&self) -> String {
        if self.is_dirty {
            format!("{} *", self.title)
        } else {
            self.title.clone()
        }
    }

    /// Whether the live draft differs from the active version's content
    pub fn draft_differs_from_active(&self) -> bool {
        self.draft != self.version_graph.active_content()
    }

    /// "v{n}" counter for the active version, `None` while on the sentinel
    pub fn version_counter(&self) -> Option<String> {
        match self.version_graph.active_display_index() {
            0 => None,
            n => Some(format!("v{}", n)),
        }
    }

    /// The message produced for the active version, if any
    pub fn active_output(&self) -> Option<&ChatMessage> {
        let output_id = self
            .version_graph
            .output_message_id(self.version_graph.active_id())?;
        self.messages.iter().find(|m| m.id == output_id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
