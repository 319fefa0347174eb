//! Workbench orchestration
//!
//! Glues the tab manager to the model client and project persistence. A send
//! is split in three so the model call never holds the workbench borrowed:
//!
//! 1. [`Workbench::begin_send`] validates the draft, flips `sending` and
//!    persists the user message.
//! 2. [`PendingSend::run`] awaits the model, racing a cancellation token.
//! 3. [`Workbench::complete_send`] records the reply and a new version.
//!
//! While step 2 is pending for one tab, every other tab stays editable.

use chrono::Local;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tab_manager::{TabError, TabManager};
use crate::config::Config;
use crate::data::{
    ChatMessage, DatabaseError, MessagePatch, ProjectBackend, PromptPresetSummary, Role, TaskType,
};
use crate::model::{GenerationOptions, ModelClient, ModelError};
use crate::prompt::{build_unified_prompt, PromptError};
use crate::version::{migrate_version_graph, NewVersion, VersionMetadata};

/// Marker appended to the conversation when the user cancels a send
pub const ABORTED_MARKER: &str = "Response aborted";

/// Number of input characters used to title a new project
const PROJECT_TITLE_CHARS: usize = 40;

#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    Tab(#[from] TabError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Tab not found: {0}")]
    TabNotFound(String),
    #[error("A response is already being generated for this tab")]
    AlreadySending,
    #[error("No preset available")]
    NoPreset,
}

/// A model call that has been prepared but not yet run
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub tab_id: String,
    /// Trimmed user input, recorded as the version content
    pub input: String,
    /// Full prompt sent to the model
    pub prompt: String,
    pub task_type: TaskType,
    pub options: GenerationOptions,
}

impl PendingSend {
    /// Call the model, giving up as soon as `cancel` fires
    pub async fn run(
        &self,
        client: &dyn ModelClient,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ModelError::Aborted),
            result = client.generate(&self.prompt, self.task_type, &self.options) => result,
        }
    }
}

/// How a send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Reply recorded and a version appended
    Completed {
        version_id: String,
        message_id: String,
    },
    /// Cancelled by the user; no version recorded
    Aborted,
    /// Model call failed; the message was set as the tab's error
    Failed(String),
    /// The tab closed while the call was in flight
    Discarded,
}

/// Tab manager plus the collaborators it needs to run sends
pub struct Workbench<B: ProjectBackend> {
    tabs: TabManager,
    backend: B,
    /// Messages loaded per project
    history_limit: usize,
    system_prompt: Option<String>,
}

impl<B: ProjectBackend> Workbench<B> {
    pub fn new(backend: B, config: &Config) -> Self {
        Self::with_tab_manager(
            backend,
            TabManager::new(config.max_tabs),
            config.history_limit,
            config.prompt.system_prompt.clone(),
        )
    }

    pub fn with_tab_manager(
        backend: B,
        tabs: TabManager,
        history_limit: usize,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            tabs,
            backend,
            history_limit,
            system_prompt,
        }
    }

    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    pub fn tabs_mut(&mut self) -> &mut TabManager {
        &mut self.tabs
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Validate the tab's draft and prepare a model call.
    ///
    /// On success the tab is `sending`, bound to a project (created on first
    /// send) and carries the user message with its stored id. Persistence
    /// failures are logged and the send goes ahead locally.
    pub fn begin_send(&mut self, tab_id: &str) -> Result<PendingSend, WorkbenchError> {
        let tab = self
            .tabs
            .tab(tab_id)
            .ok_or_else(|| WorkbenchError::TabNotFound(tab_id.to_string()))?;
        if tab.sending {
            return Err(WorkbenchError::AlreadySending);
        }

        let input = tab.draft.trim().to_string();
        let task_type = tab.preset.task_type;
        let options = tab.preset.options.clone().unwrap_or_default();
        let prompt = build_unified_prompt(&input, task_type, &options, self.system_prompt.as_deref())?;
        let preset_id = tab.preset.id.clone();
        let project_id = tab.project_id.clone();

        self.tabs.set_sending(tab_id, true);
        self.tabs.set_error(tab_id, None);

        let project_id = match project_id {
            Some(id) => Some(id),
            None => self.create_project_for(tab_id, &input, preset_id.as_deref()),
        };

        let local_id = self.tabs.id_generator().next_id();
        self.tabs
            .push_message(tab_id, ChatMessage::new(local_id.clone(), Role::User, input.clone()));
        if let Some(project_id) = project_id.as_deref() {
            self.persist_message(tab_id, project_id, &local_id);
        }

        debug!(tab_id = %tab_id, task_type = %task_type, "Prepared send");
        Ok(PendingSend {
            tab_id: tab_id.to_string(),
            input,
            prompt,
            task_type,
            options,
        })
    }

    /// Apply the result of a model call to the tab that started it
    pub fn complete_send(
        &mut self,
        pending: PendingSend,
        result: Result<String, ModelError>,
    ) -> SendOutcome {
        let tab_id = pending.tab_id.as_str();
        let Some(tab) = self.tabs.tab(tab_id) else {
            debug!(tab_id = %tab_id, "Tab closed before the response arrived");
            return SendOutcome::Discarded;
        };
        let project_id = tab.project_id.clone();
        self.tabs.set_sending(tab_id, false);

        let reply = match result {
            Ok(reply) => reply,
            Err(e) if e.is_abort() => {
                let marker_id = self.tabs.id_generator().next_id();
                self.tabs
                    .push_message(tab_id, ChatMessage::new(marker_id, Role::Assistant, ABORTED_MARKER));
                info!(tab_id = %tab_id, "Send aborted");
                return SendOutcome::Aborted;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(tab_id = %tab_id, error = %message, "Model call failed");
                self.tabs.set_error(tab_id, Some(message.clone()));
                return SendOutcome::Failed(message);
            }
        };

        let local_id = self.tabs.id_generator().next_id();
        self.tabs
            .push_message(tab_id, ChatMessage::new(local_id.clone(), Role::Assistant, reply));
        let message_id = match project_id.as_deref() {
            Some(project_id) => self.persist_message(tab_id, project_id, &local_id),
            None => local_id,
        };

        let metadata = VersionMetadata {
            task_type: Some(pending.task_type.as_str().to_string()),
            options: serde_json::to_value(&pending.options).ok(),
        };
        let label = format!("Generated {}", Local::now().format("%H:%M"));
        let version = NewVersion::new(pending.input.clone(), label)
            .with_output_message_id(Some(message_id.clone()))
            .with_metadata(metadata);
        let Some(version_id) = self.tabs.append_version(tab_id, version) else {
            return SendOutcome::Discarded;
        };
        self.tabs.mark_dirty(tab_id, false);
        self.save_graph(tab_id);

        info!(tab_id = %tab_id, version_id = %version_id, "Recorded generated version");
        SendOutcome::Completed {
            version_id,
            message_id,
        }
    }

    /// Run a whole send for one tab
    pub async fn send(
        &mut self,
        tab_id: &str,
        client: &dyn ModelClient,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome, WorkbenchError> {
        let pending = self.begin_send(tab_id)?;
        let result = pending.run(client, cancel).await;
        Ok(self.complete_send(pending, result))
    }

    /// Open a persisted project, reusing its tab when already open.
    ///
    /// The preset is resolved by id from `presets`, falling back to the first
    /// one. Returns the id of the tab showing the project.
    pub fn load_project(
        &mut self,
        project_id: &str,
        presets: &[PromptPresetSummary],
    ) -> Result<String, WorkbenchError> {
        if let Some(tab) = self.tabs.find_tab_by_project_id(project_id) {
            let tab_id = tab.id.clone();
            self.tabs.switch_tab(&tab_id);
            return Ok(tab_id);
        }
        if !self.tabs.can_create_tab() {
            return Err(TabError::CapacityReached {
                max_tabs: self.tabs.max_tabs(),
            }
            .into());
        }

        let loaded = self.backend.load_project(project_id, self.history_limit)?;
        let preset = loaded
            .preset_id
            .as_deref()
            .and_then(|id| presets.iter().find(|p| p.id.as_deref() == Some(id)))
            .or_else(|| presets.first())
            .cloned()
            .ok_or(WorkbenchError::NoPreset)?;

        let graph = migrate_version_graph(
            loaded.version_graph.as_ref(),
            &loaded.messages,
            self.tabs.id_generator(),
        );
        let draft = graph.active_content().to_string();

        let tab_id = self.tabs.create_tab(preset)?;
        self.tabs.set_messages(&tab_id, loaded.messages);
        self.tabs.set_version_graph(&tab_id, graph);
        self.tabs.update_draft(&tab_id, draft);
        self.tabs.attach_project(&tab_id, project_id);
        if let Some(title) = loaded.title.filter(|t| !t.trim().is_empty()) {
            self.tabs.update_tab_label(&tab_id, title);
        }

        info!(project_id = %project_id, tab_id = %tab_id, "Loaded project");
        Ok(tab_id)
    }

    /// Delete a project and close every tab showing it.
    ///
    /// Returns the number of tabs closed.
    pub fn delete_project(&mut self, project_id: &str) -> Result<usize, WorkbenchError> {
        self.backend.delete_project(project_id)?;

        let mut closed = 0;
        while let Some(tab_id) = self
            .tabs
            .find_tab_by_project_id(project_id)
            .map(|tab| tab.id.clone())
        {
            self.tabs.close_tab(&tab_id);
            closed += 1;
        }
        info!(project_id = %project_id, closed, "Deleted project");
        Ok(closed)
    }

    fn create_project_for(
        &mut self,
        tab_id: &str,
        input: &str,
        preset_id: Option<&str>,
    ) -> Option<String> {
        let title: String = input.chars().take(PROJECT_TITLE_CHARS).collect();
        match self.backend.create_project(&title, preset_id) {
            Ok(project) => {
                self.tabs.attach_project(tab_id, project.id.clone());
                self.tabs.update_tab_label(tab_id, title);
                Some(project.id)
            }
            Err(e) => {
                warn!(tab_id = %tab_id, error = %e, "Failed to create project");
                None
            }
        }
    }

    /// Store a local message and swap in its stored id. Returns the id the
    /// message ends up with.
    fn persist_message(&mut self, tab_id: &str, project_id: &str, local_id: &str) -> String {
        let Some(message) = self
            .tabs
            .tab(tab_id)
            .and_then(|tab| tab.messages.iter().find(|m| m.id == local_id))
            .cloned()
        else {
            return local_id.to_string();
        };

        match self.backend.append_messages(project_id, &[message]) {
            Ok(stored) => match stored.into_iter().next() {
                Some(stored) => {
                    self.tabs
                        .update_message(tab_id, local_id, MessagePatch::id(stored.id.clone()));
                    stored.id
                }
                None => local_id.to_string(),
            },
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Failed to persist message");
                local_id.to_string()
            }
        }
    }

    fn save_graph(&self, tab_id: &str) {
        let Some(tab) = self.tabs.tab(tab_id) else {
            return;
        };
        let Some(project_id) = tab.project_id.as_deref() else {
            return;
        };
        if let Err(e) = self.backend.save_version_graph(project_id, &tab.version_graph) {
            warn!(project_id = %project_id, error = %e, "Failed to save version graph");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Database, ProjectStore};
    use crate::model::mock::MockModelClient;
    use std::time::Duration;

    fn workbench() -> (Database, Workbench<ProjectStore>) {
        let db = Database::open_in_memory().unwrap();
        let store = ProjectStore::new(db.connection());
        let workbench = Workbench::with_tab_manager(store, TabManager::new(8), 50, None);
        (db, workbench)
    }

    fn preset() -> PromptPresetSummary {
        PromptPresetSummary {
            id: Some("general".into()),
            ..PromptPresetSummary::new("General", TaskType::General)
        }
    }

    fn open_tab(workbench: &mut Workbench<ProjectStore>, draft: &str) -> String {
        let id = workbench.tabs_mut().create_tab(preset()).unwrap();
        workbench.tabs_mut().update_draft(&id, draft);
        workbench.tabs_mut().mark_dirty(&id, true);
        id
    }

    #[tokio::test]
    async fn test_send_records_version_and_output() {
        let (_db, mut workbench) = workbench();
        let tab_id = open_tab(&mut workbench, "  write a haiku about tea  ");
        let client = MockModelClient::new().with_response("A refined haiku prompt");

        let outcome = workbench
            .send(&tab_id, &client, &CancellationToken::new())
            .await
            .unwrap();

        let SendOutcome::Completed {
            version_id,
            message_id,
        } = outcome
        else {
            panic!("expected the send to complete");
        };

        let tab = workbench.tabs().tab(&tab_id).unwrap();
        assert!(!tab.sending);
        assert!(!tab.is_dirty);
        assert_eq!(tab.title, "write a haiku about tea");
        assert_eq!(tab.messages.len(), 2);
        assert_eq!(tab.messages[1].id, message_id);
        assert_eq!(tab.version_graph.tail_id(), version_id);
        assert_eq!(tab.version_graph.active_content(), "write a haiku about tea");
        assert!(tab.version_graph.active_node().unwrap().label.starts_with("Generated "));
        assert_eq!(tab.version_graph.output_message_id(&version_id), Some(message_id.as_str()));
        assert!(client.captured_prompts()[0].contains("Input: write a haiku about tea"));
    }

    #[tokio::test]
    async fn test_send_persists_project_graph_and_messages() {
        let (_db, mut workbench) = workbench();
        let tab_id = open_tab(&mut workbench, "draft a product launch email");
        let client = MockModelClient::new().with_response("Launch email prompt");

        workbench
            .send(&tab_id, &client, &CancellationToken::new())
            .await
            .unwrap();

        let tab = workbench.tabs().tab(&tab_id).unwrap();
        let project_id = tab.project_id.clone().unwrap();
        let loaded = workbench.backend().load_project(&project_id, 50).unwrap();
        assert_eq!(loaded.messages, tab.messages);
        assert_eq!(loaded.preset_id.as_deref(), Some("general"));

        let migrated = migrate_version_graph(
            loaded.version_graph.as_ref(),
            &loaded.messages,
            workbench.tabs().id_generator(),
        );
        assert_eq!(migrated, tab.version_graph);
    }

    #[tokio::test]
    async fn test_failed_send_sets_error_without_version() {
        let (_db, mut workbench) = workbench();
        let tab_id = open_tab(&mut workbench, "summarize this paper");
        let client = MockModelClient::new().with_failure("connection refused");

        let outcome = workbench
            .send(&tab_id, &client, &CancellationToken::new())
            .await
            .unwrap();

        let expected = ModelError::Request("connection refused".into()).to_string();
        assert_eq!(outcome, SendOutcome::Failed(expected.clone()));
        let tab = workbench.tabs().tab(&tab_id).unwrap();
        assert!(!tab.sending);
        assert_eq!(tab.error.as_deref(), Some(expected.as_str()));
        assert_eq!(tab.version_graph.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_send_appends_marker_only() {
        let (_db, mut workbench) = workbench();
        let tab_id = open_tab(&mut workbench, "describe a sunset");
        let client = MockModelClient::new()
            .with_response("never delivered")
            .with_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let pending = workbench.begin_send(&tab_id).unwrap();
        assert!(workbench.tabs().tab(&tab_id).unwrap().sending);
        cancel.cancel();
        let result = pending.run(&client, &cancel).await;
        let outcome = workbench.complete_send(pending, result);

        assert_eq!(outcome, SendOutcome::Aborted);
        let tab = workbench.tabs().tab(&tab_id).unwrap();
        assert!(!tab.sending);
        assert!(tab.error.is_none());
        assert_eq!(tab.messages.last().unwrap().content, ABORTED_MARKER);
        assert_eq!(tab.version_graph.len(), 1);
    }

    #[tokio::test]
    async fn test_other_tabs_stay_editable_while_sending() {
        let (_db, mut workbench) = workbench();
        let a = open_tab(&mut workbench, "prompt for tab a");
        let b = open_tab(&mut workbench, "prompt for tab b");
        let client = MockModelClient::new().with_response("reply a");

        let pending = workbench.begin_send(&a).unwrap();
        workbench.tabs_mut().update_draft(&b, "edited while a is sending");
        assert!(matches!(workbench.begin_send(&a), Err(WorkbenchError::AlreadySending)));

        let result = pending.run(&client, &CancellationToken::new()).await;
        workbench.complete_send(pending, result);

        assert_eq!(workbench.tabs().tab(&b).unwrap().draft, "edited while a is sending");
        assert_eq!(workbench.tabs().tab(&b).unwrap().version_graph.len(), 1);
        assert_eq!(workbench.tabs().tab(&a).unwrap().version_graph.len(), 2);
    }

    #[tokio::test]
    async fn test_response_for_closed_tab_is_discarded() {
        let (_db, mut workbench) = workbench();
        let tab_id = open_tab(&mut workbench, "a closed tab prompt");
        let client = MockModelClient::new().with_response("late reply");

        let pending = workbench.begin_send(&tab_id).unwrap();
        workbench.tabs_mut().close_tab(&tab_id);
        let result = pending.run(&client, &CancellationToken::new()).await;

        assert_eq!(workbench.complete_send(pending, result), SendOutcome::Discarded);
        assert!(workbench.tabs().is_empty());
    }

    #[test]
    fn test_begin_send_rejects_empty_draft() {
        let (_db, mut workbench) = workbench();
        let tab_id = open_tab(&mut workbench, "   ");

        assert!(matches!(
            workbench.begin_send(&tab_id),
            Err(WorkbenchError::Prompt(PromptError::EmptyInput))
        ));
        assert!(!workbench.tabs().tab(&tab_id).unwrap().sending);
        assert!(matches!(
            workbench.begin_send("missing"),
            Err(WorkbenchError::TabNotFound(_))
        ));
    }

    #[test]
    fn test_load_project_replays_legacy_history() {
        let (_db, mut workbench) = workbench();
        let project = workbench
            .backend()
            .create_project("Legacy project", Some("general"))
            .unwrap();
        workbench
            .backend()
            .append_messages(
                &project.id,
                &[
                    ChatMessage::new("x", Role::User, "hi"),
                    ChatMessage::new("y", Role::Assistant, "hello!"),
                ],
            )
            .unwrap();

        let tab_id = workbench.load_project(&project.id, &[preset()]).unwrap();
        let tab = workbench.tabs().tab(&tab_id).unwrap();

        assert_eq!(tab.title, "Legacy project");
        assert_eq!(tab.project_id.as_deref(), Some(project.id.as_str()));
        assert_eq!(tab.version_graph.len(), 2);
        assert_eq!(tab.draft, "hi");
        let reply_id = tab.messages[1].id.clone();
        assert_eq!(
            tab.version_graph.output_message_id(tab.version_graph.tail_id()),
            Some(reply_id.as_str())
        );

        let again = workbench.load_project(&project.id, &[preset()]).unwrap();
        assert_eq!(again, tab_id);
        assert_eq!(workbench.tabs().len(), 1);
    }

    #[test]
    fn test_load_project_respects_capacity() {
        let db = Database::open_in_memory().unwrap();
        let store = ProjectStore::new(db.connection());
        let mut workbench = Workbench::with_tab_manager(store, TabManager::new(1), 50, None);
        workbench.tabs_mut().create_tab(preset()).unwrap();
        let project = workbench.backend().create_project("Full", None).unwrap();

        assert!(matches!(
            workbench.load_project(&project.id, &[preset()]),
            Err(WorkbenchError::Tab(TabError::CapacityReached { max_tabs: 1 }))
        ));
    }

    #[test]
    fn test_delete_project_closes_its_tab() {
        let (_db, mut workbench) = workbench();
        let project = workbench.backend().create_project("Doomed", None).unwrap();
        let other = workbench.tabs_mut().create_tab(preset()).unwrap();
        workbench.load_project(&project.id, &[preset()]).unwrap();

        assert_eq!(workbench.delete_project(&project.id).unwrap(), 1);
        assert_eq!(workbench.tabs().len(), 1);
        assert_eq!(workbench.tabs().active_tab_id(), Some(other.as_str()));
    }
}
