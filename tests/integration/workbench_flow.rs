//! Integration tests for the prompt workbench
//!
//! Drives whole send / navigate / reload cycles against an on-disk database
//! and a scripted model client.

use super::common::determinism::SequentialIds;
use super::common::temp_database;
use promptcrafter::model::mock::MockModelClient;
use promptcrafter::workbench::SendOutcome;
use promptcrafter::{
    Database, PresetStore, ProjectBackend, ProjectStore, PromptPresetSummary, TabManager, TaskType,
    Workbench,
};
use rusqlite::params;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn workbench(db: &Database, ids: &'static str) -> Workbench<ProjectStore> {
    let tabs = TabManager::with_id_generator(8, SequentialIds::shared(ids));
    Workbench::with_tab_manager(ProjectStore::new(db.connection()), tabs, 50, None)
}

fn general(db: &Database) -> PromptPresetSummary {
    PresetStore::new(db.connection())
        .get("general")
        .expect("Failed to read presets")
        .expect("General preset is seeded")
}

async fn send(workbench: &mut Workbench<ProjectStore>, tab_id: &str, draft: &str, client: &MockModelClient) -> SendOutcome {
    workbench.tabs_mut().update_draft(tab_id, draft);
    workbench.tabs_mut().mark_dirty(tab_id, true);
    workbench
        .send(tab_id, client, &CancellationToken::new())
        .await
        .expect("send should start")
}

/// Undo followed by a new send extends the tail instead of branching
#[tokio::test]
async fn test_send_after_undo_extends_history() {
    let (db, _dir) = temp_database();
    let mut workbench = workbench(&db, "a");
    let client = MockModelClient::new().with_fallback("refined");
    let tab_id = workbench.tabs_mut().create_tab(general(&db)).unwrap();

    send(&mut workbench, &tab_id, "first idea", &client).await;
    send(&mut workbench, &tab_id, "second idea", &client).await;
    assert!(workbench.tabs_mut().undo_version(&tab_id));
    assert_eq!(workbench.tabs().tab(&tab_id).unwrap().draft, "first idea");

    send(&mut workbench, &tab_id, "third idea", &client).await;

    let graph = &workbench.tabs().tab(&tab_id).unwrap().version_graph;
    let contents: Vec<&str> = graph
        .display_versions()
        .iter()
        .map(|node| node.content.as_str())
        .collect();
    assert_eq!(contents, vec!["first idea", "second idea", "third idea"]);
    assert_eq!(graph.active_id(), graph.tail_id());
    assert!(graph.validate().is_ok());
}

/// A project reopened in a fresh workbench shows the same history
#[tokio::test]
async fn test_reopened_project_matches_saved_state() {
    let (db, _dir) = temp_database();
    let client = MockModelClient::new()
        .with_response("prompt one")
        .with_response("prompt two");

    let (project_id, saved_graph, saved_messages) = {
        let mut first = workbench(&db, "a");
        let tab_id = first.tabs_mut().create_tab(general(&db)).unwrap();
        send(&mut first, &tab_id, "a poem about autumn", &client).await;
        send(&mut first, &tab_id, "a shorter poem about autumn", &client).await;
        let tab = first.tabs().tab(&tab_id).unwrap();
        (
            tab.project_id.clone().unwrap(),
            tab.version_graph.clone(),
            tab.messages.clone(),
        )
    };

    let mut second = workbench(&db, "b");
    let tab_id = second.load_project(&project_id, &[general(&db)]).unwrap();
    let tab = second.tabs().tab(&tab_id).unwrap();

    assert_eq!(tab.version_graph, saved_graph);
    assert_eq!(tab.messages, saved_messages);
    assert_eq!(tab.draft, "a shorter poem about autumn");
    assert_eq!(tab.title, "a poem about autumn");
    assert!(!tab.draft_differs_from_active());
    assert_eq!(tab.active_output().unwrap().content, "prompt two");
}

/// Graphs saved by older builds are repaired on load and the repair is kept
#[test]
fn test_legacy_graph_is_repaired_on_load() {
    let (db, _dir) = temp_database();
    let store = ProjectStore::new(db.connection());
    let project = store.create_project("Old project", Some("general")).unwrap();
    let legacy = json!({
        "nodes": [
            {"id": "s", "label": "Start", "content": "", "createdAt": "2024-05-01T10:00:00Z"},
            {"id": "b", "label": "Second", "content": "two", "createdAt": 1714557800000i64},
            {"id": "a", "label": "First", "content": "one", "createdAt": 1714557700000i64}
        ],
        "activeId": "gone"
    });
    db.with_connection(|conn| {
        conn.execute(
            "UPDATE projects SET version_graph = ?2 WHERE id = ?1",
            params![project.id, legacy.to_string()],
        )
    })
    .unwrap();

    let mut workbench = workbench(&db, "a");
    let tab_id = workbench.load_project(&project.id, &[general(&db)]).unwrap();
    let graph = workbench.tabs().tab(&tab_id).unwrap().version_graph.clone();

    let order: Vec<&str> = graph.version_list().iter().map(|n| n.id.as_str()).collect();
    assert_eq!(order, vec!["s", "a", "b"]);
    assert_eq!(graph.active_id(), "b");
    assert!(graph.validate().is_ok());
}

/// Failures and cancellations never leave a version behind
#[tokio::test]
async fn test_failures_do_not_touch_history() {
    let (db, _dir) = temp_database();
    let mut workbench = workbench(&db, "a");
    let client = MockModelClient::new().with_failure("model not found");
    let tab_id = workbench.tabs_mut().create_tab(general(&db)).unwrap();

    let outcome = send(&mut workbench, &tab_id, "a failing prompt", &client).await;
    assert!(matches!(outcome, SendOutcome::Failed(ref message) if message.contains("model not found")));

    let cancel = CancellationToken::new();
    cancel.cancel();
    workbench.tabs_mut().update_draft(&tab_id, "a cancelled prompt");
    let outcome = workbench.send(&tab_id, &client, &cancel).await.unwrap();
    assert_eq!(outcome, SendOutcome::Aborted);

    let tab = workbench.tabs().tab(&tab_id).unwrap();
    assert_eq!(tab.version_graph.len(), 1);
    assert!(tab.error.is_none());
    assert!(!tab.sending);

    let project_id = tab.project_id.clone().unwrap();
    let loaded = workbench.backend().load_project(&project_id, 50).unwrap();
    assert!(loaded.version_graph.is_none());
}

/// Opening more tabs than allowed reports capacity instead of dropping a tab
#[test]
fn test_tab_capacity_through_workbench() {
    let (db, _dir) = temp_database();
    let ids = SequentialIds::shared("t");
    let tabs = TabManager::with_id_generator(2, ids.clone());
    let mut workbench = Workbench::with_tab_manager(ProjectStore::new(db.connection()), tabs, 50, None);

    let first = workbench.tabs_mut().create_tab(general(&db)).unwrap();
    workbench.tabs_mut().create_tab(PromptPresetSummary::new("Code", TaskType::Coding)).unwrap();
    let issued = ids.issued();

    assert!(workbench.tabs_mut().create_tab(general(&db)).is_err());
    assert_eq!(workbench.tabs().len(), 2);
    assert_eq!(ids.issued(), issued);
    assert_eq!(workbench.tabs().tab_at(0).map(|t| t.id.as_str()), Some(first.as_str()));
}
