use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::tab::PromptTab;
use crate::data::{ChatMessage, MessagePatch, PromptPresetSummary};
use crate::version::{IdGenerator, NewVersion, UuidGenerator, VersionGraph};

/// Default maximum number of open tabs
pub const DEFAULT_MAX_TABS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabError {
    #[error("Maximum of {max_tabs} tabs reached. Close a tab to open another.")]
    CapacityReached { max_tabs: usize },
}

/// Everything the tab manager owns
#[derive(Debug, Clone, Default)]
pub struct PromptWorkspaceState {
    /// Tabs in display order
    pub tabs: Vec<PromptTab>,
    /// Always names a tab in `tabs` while `tabs` is non-empty
    pub active_tab_id: Option<String>,
}

/// Manages the open prompt tabs.
///
/// Every mutation names the tab it targets. Operations on an id that no
/// longer exists return `false` (or `None`) and change nothing, since a model
/// call may finish after its tab was closed.
pub struct TabManager {
    state: PromptWorkspaceState,
    /// Maximum number of tabs allowed
    max_tabs: usize,
    ids: Arc<dyn IdGenerator + Send + Sync>,
}

impl TabManager {
    pub fn new(max_tabs: usize) -> Self {
        Self::with_id_generator(max_tabs, Arc::new(UuidGenerator))
    }

    pub fn with_id_generator(max_tabs: usize, ids: Arc<dyn IdGenerator + Send + Sync>) -> Self {
        Self {
            state: PromptWorkspaceState::default(),
            max_tabs,
            ids,
        }
    }

    /// Id source shared with graph construction
    pub fn id_generator(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    /// Open a tab with an empty history and make it active
    pub fn create_tab(&mut self, preset: PromptPresetSummary) -> Result<String, TabError> {
        if !self.can_create_tab() {
            return Err(TabError::CapacityReached {
                max_tabs: self.max_tabs,
            });
        }

        let id = self.ids.next_id();
        let graph = VersionGraph::empty(self.ids.as_ref());
        self.state.tabs.push(PromptTab::new(id.clone(), preset, graph));
        self.state.active_tab_id = Some(id.clone());
        debug!(tab_id = %id, tabs = self.state.tabs.len(), "Created tab");
        Ok(id)
    }

    /// Switch to a specific tab
    pub fn switch_tab(&mut self, tab_id: &str) -> bool {
        if self.tab(tab_id).is_none() {
            return false;
        }
        self.state.active_tab_id = Some(tab_id.to_string());
        true
    }

    /// Close a tab by id.
    ///
    /// Closing the active tab activates its left neighbour, or the new first
    /// tab when it was leftmost.
    pub fn close_tab(&mut self, tab_id: &str) -> bool {
        let Some(index) = self.position(tab_id) else {
            return false;
        };
        self.state.tabs.remove(index);

        if self.state.active_tab_id.as_deref() == Some(tab_id) {
            let neighbour = index.checked_sub(1).unwrap_or(0);
            self.state.active_tab_id = self.state.tabs.get(neighbour).map(|t| t.id.clone());
        }
        debug!(tab_id = %tab_id, tabs = self.state.tabs.len(), "Closed tab");
        true
    }

    /// Switch to the next tab, wrapping around
    pub fn next_tab(&mut self) {
        if let Some(index) = self.active_index() {
            let next = (index + 1) % self.state.tabs.len();
            self.state.active_tab_id = Some(self.state.tabs[next].id.clone());
        }
    }

    /// Switch to the previous tab, wrapping around
    pub fn prev_tab(&mut self) {
        if let Some(index) = self.active_index() {
            let prev = if index == 0 {
                self.state.tabs.len() - 1
            } else {
                index - 1
            };
            self.state.active_tab_id = Some(self.state.tabs[prev].id.clone());
        }
    }

    pub fn find_tab_by_project_id(&self, project_id: &str) -> Option<&PromptTab> {
        self.state
            .tabs
            .iter()
            .find(|tab| tab.project_id.as_deref() == Some(project_id))
    }

    /// Append a message to a tab's conversation
    pub fn push_message(&mut self, tab_id: &str, message: ChatMessage) -> bool {
        self.with_tab(tab_id, |tab| tab.messages.push(message))
    }

    /// Patch a message in place.
    ///
    /// When the patch assigns an id another message already carries, the
    /// patched message is dropped so the conversation never shows the same
    /// message twice.
    pub fn update_message(&mut self, tab_id: &str, message_id: &str, patch: MessagePatch) -> bool {
        let Some(tab) = Self::find_mut(&mut self.state.tabs, tab_id) else {
            return false;
        };
        let Some(index) = tab.messages.iter().position(|m| m.id == message_id) else {
            return false;
        };

        if let Some(new_id) = patch.id {
            let duplicate = new_id != message_id && tab.messages.iter().any(|m| m.id == new_id);
            if duplicate {
                tab.messages.remove(index);
                tab.touch();
                return true;
            }
            tab.messages[index].id = new_id;
        }
        if let Some(content) = patch.content {
            tab.messages[index].content = content;
        }
        tab.touch();
        true
    }

    /// Replace a tab's conversation wholesale (project load)
    pub fn set_messages(&mut self, tab_id: &str, messages: Vec<ChatMessage>) -> bool {
        self.with_tab(tab_id, |tab| tab.messages = messages)
    }

    /// Set the live draft; history is untouched
    pub fn update_draft(&mut self, tab_id: &str, text: impl Into<String>) -> bool {
        let text = text.into();
        self.with_tab(tab_id, |tab| tab.draft = text)
    }

    pub fn set_version_graph(&mut self, tab_id: &str, graph: VersionGraph) -> bool {
        self.with_tab(tab_id, |tab| tab.version_graph = graph)
    }

    /// Record a version on a tab's history, returning the new version's id
    pub fn append_version(&mut self, tab_id: &str, version: NewVersion) -> Option<String> {
        let tab = Self::find_mut(&mut self.state.tabs, tab_id)?;
        let version_id = tab
            .version_graph
            .push_version(self.ids.as_ref(), version)
            .to_string();
        tab.touch();
        Some(version_id)
    }

    pub fn attach_project(&mut self, tab_id: &str, project_id: impl Into<String>) -> bool {
        let project_id = project_id.into();
        self.with_tab(tab_id, |tab| tab.project_id = Some(project_id))
    }

    /// Flip the generation flag.
    ///
    /// Only `idle -> sending` and `sending -> idle` are accepted; asking for
    /// the state the tab is already in returns false.
    pub fn set_sending(&mut self, tab_id: &str, sending: bool) -> bool {
        match Self::find_mut(&mut self.state.tabs, tab_id) {
            Some(tab) if tab.sending != sending => {
                tab.sending = sending;
                tab.touch();
                true
            }
            _ => false,
        }
    }

    pub fn set_error(&mut self, tab_id: &str, error: Option<String>) -> bool {
        self.with_tab(tab_id, |tab| tab.error = error)
    }

    pub fn mark_dirty(&mut self, tab_id: &str, dirty: bool) -> bool {
        self.with_tab(tab_id, |tab| tab.is_dirty = dirty)
    }

    pub fn update_tab_label(&mut self, tab_id: &str, label: impl Into<String>) -> bool {
        let label = label.into();
        self.with_tab(tab_id, |tab| tab.title = label)
    }

    /// Step back in a tab's history and load that version into the draft
    pub fn undo_version(&mut self, tab_id: &str) -> bool {
        self.navigate(tab_id, |graph| graph.undo())
    }

    /// Step forward in a tab's history and load that version into the draft
    pub fn redo_version(&mut self, tab_id: &str) -> bool {
        self.navigate(tab_id, |graph| graph.redo())
    }

    /// Jump to any version in a tab's history and load it into the draft
    pub fn jump_to_version(&mut self, tab_id: &str, version_id: &str) -> bool {
        self.navigate(tab_id, |graph| graph.jump_to(version_id))
    }

    fn navigate(&mut self, tab_id: &str, step: impl FnOnce(&mut VersionGraph) -> bool) -> bool {
        let Some(tab) = Self::find_mut(&mut self.state.tabs, tab_id) else {
            return false;
        };
        if !step(&mut tab.version_graph) {
            return false;
        }
        tab.draft = tab.version_graph.active_content().to_string();
        tab.is_dirty = false;
        tab.touch();
        true
    }

    fn with_tab(&mut self, tab_id: &str, apply: impl FnOnce(&mut PromptTab)) -> bool {
        match Self::find_mut(&mut self.state.tabs, tab_id) {
            Some(tab) => {
                apply(tab);
                tab.touch();
                true
            }
            None => false,
        }
    }

    fn find_mut<'a>(tabs: &'a mut [PromptTab], tab_id: &str) -> Option<&'a mut PromptTab> {
        tabs.iter_mut().find(|tab| tab.id == tab_id)
    }

    fn position(&self, tab_id: &str) -> Option<usize> {
        self.state.tabs.iter().position(|tab| tab.id == tab_id)
    }

    fn active_index(&self) -> Option<usize> {
        self.state
            .active_tab_id
            .as_deref()
            .and_then(|id| self.position(id))
    }

    /// Check if we can add more tabs
    pub fn can_create_tab(&self) -> bool {
        self.state.tabs.len() < self.max_tabs
    }

    pub fn max_tabs(&self) -> usize {
        self.max_tabs
    }

    pub fn tab(&self, tab_id: &str) -> Option<&PromptTab> {
        self.state.tabs.iter().find(|tab| tab.id == tab_id)
    }

    pub fn tab_at(&self, index: usize) -> Option<&PromptTab> {
        self.state.tabs.get(index)
    }

    pub fn active_tab(&self) -> Option<&PromptTab> {
        self.state
            .active_tab_id
            .as_deref()
            .and_then(|id| self.tab(id))
    }

    pub fn active_tab_id(&self) -> Option<&str> {
        self.state.active_tab_id.as_deref()
    }

    pub fn tabs(&self) -> &[PromptTab] {
        &self.state.tabs
    }

    /// Get tab labels for display
    pub fn tab_labels(&self) -> Vec<String> {
        self.state.tabs.iter().map(PromptTab::tab_label).collect()
    }

    pub fn is_dirty(&self, tab_id: &str) -> bool {
        self.tab(tab_id).is_some_and(|tab| tab.is_dirty)
    }

    pub fn state(&self) -> &PromptWorkspaceState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.state.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.tabs.is_empty()
    }
}

impl Default for TabManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TABS)
    }
}
