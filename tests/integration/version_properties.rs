//! Property tests for version history invariants

use super::common::determinism::SequentialIds;
use promptcrafter::data::{ChatMessage, Role};
use promptcrafter::{
    migrate_version_graph, NewVersion, PromptPresetSummary, TabManager, TaskType, VersionGraph,
};
use proptest::prelude::*;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
enum Op {
    Append(String, Option<String>),
    Undo,
    Redo,
    Jump(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => ("[a-z ]{0,12}", proptest::option::of("m-[0-9]{1,3}"))
            .prop_map(|(content, output)| Op::Append(content, output)),
        2 => Just(Op::Undo),
        1 => Just(Op::Redo),
        1 => (0usize..16).prop_map(Op::Jump),
    ]
}

fn apply(ops: &[Op], ids: &SequentialIds) -> VersionGraph {
    let mut graph = VersionGraph::empty(ids);
    for op in ops {
        match op {
            Op::Append(content, output) => {
                graph = graph.append_version(
                    ids,
                    NewVersion::new(content.clone(), "Edit").with_output_message_id(output.clone()),
                );
            }
            Op::Undo => {
                graph.undo();
            }
            Op::Redo => {
                graph.redo();
            }
            Op::Jump(index) => {
                let target = graph
                    .version_list()
                    .get(*index)
                    .map(|node| node.id.clone());
                if let Some(target) = target {
                    graph.jump_to(&target);
                }
            }
        }
    }
    graph
}

fn message() -> impl Strategy<Value = (bool, String)> {
    (any::<bool>(), "[a-z]{1,8}")
}

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<f64>().prop_map(Value::from),
        "[a-z0-9:T-]{0,8}".prop_map(Value::String),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Mostly short ids from a small pool so links often resolve
fn node_field() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => "[a-d]{0,1}".prop_map(Value::String),
        1 => json_value(),
    ]
}

fn loose_node() -> impl Strategy<Value = Value> {
    let keys = vec![
        "id",
        "label",
        "content",
        "originalInput",
        "outputMessageId",
        "createdAt",
        "prevId",
        "nextId",
        "metadata",
    ];
    prop_oneof![
        4 => proptest::collection::btree_map(proptest::sample::select(keys), node_field(), 0..9)
            .prop_map(|fields| {
                Value::Object(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
            }),
        1 => json_value(),
    ]
}

fn loose_graph() -> impl Strategy<Value = Value> {
    let nodes = prop_oneof![
        proptest::collection::btree_map("[a-d]{0,1}", loose_node(), 0..6)
            .prop_map(|map| Value::Object(map.into_iter().collect())),
        proptest::collection::vec(loose_node(), 0..6).prop_map(Value::Array),
        json_value(),
    ];
    (nodes, node_field(), node_field(), node_field()).prop_map(|(nodes, head, tail, active)| {
        json!({"nodes": nodes, "headId": head, "tailId": tail, "activeId": active})
    })
}

proptest! {
    #[test]
    fn migration_repairs_any_json(
        raw in prop_oneof![3 => loose_graph(), 1 => json_value()],
        raw_messages in proptest::collection::vec(message(), 0..4),
    ) {
        let ids = SequentialIds::new("v");
        let messages: Vec<ChatMessage> = raw_messages
            .into_iter()
            .enumerate()
            .map(|(i, (is_user, text))| {
                let role = if is_user { Role::User } else { Role::Assistant };
                ChatMessage::new(format!("m{}", i), role, text)
            })
            .collect();

        let graph = migrate_version_graph(Some(&raw), &messages, &ids);
        prop_assert!(graph.validate().is_ok());
        prop_assert_eq!(graph.version_list().len(), graph.len());

        let again = migrate_version_graph(Some(&serde_json::to_value(&graph).unwrap()), &messages, &ids);
        prop_assert_eq!(again, graph);
    }

    #[test]
    fn chain_visits_every_node_once(ops in proptest::collection::vec(op(), 0..40)) {
        let ids = SequentialIds::new("v");
        let graph = apply(&ops, &ids);

        let list = graph.version_list();
        prop_assert_eq!(list.len(), graph.len());
        prop_assert_eq!(list.first().map(|n| n.id.as_str()), Some(graph.head_id()));
        prop_assert_eq!(list.last().map(|n| n.id.as_str()), Some(graph.tail_id()));
        prop_assert!(graph.validate().is_ok());
    }

    #[test]
    fn append_always_goes_after_tail(
        ops in proptest::collection::vec(op(), 0..30),
        content in "[a-z]{0,10}",
        output in proptest::option::of("m-[0-9]{1,3}"),
    ) {
        let ids = SequentialIds::new("v");
        let before = apply(&ops, &ids);
        let old_tail = before.tail_id().to_string();

        let after = before.append_version(
            &ids,
            NewVersion::new(content, "Generated").with_output_message_id(output.clone()),
        );
        let tail = after.tail().unwrap();

        prop_assert_eq!(tail.prev_id.as_deref(), Some(old_tail.as_str()));
        prop_assert_eq!(after.active_id(), after.tail_id());
        prop_assert_eq!(after.output_message_id(after.tail_id()), output.as_deref());
    }

    #[test]
    fn timestamps_never_decrease(ops in proptest::collection::vec(op(), 0..30)) {
        let ids = SequentialIds::new("v");
        let graph = apply(&ops, &ids);

        let stamps: Vec<i64> = graph.version_list().iter().map(|n| n.created_at).collect();
        prop_assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn undo_and_redo_stop_at_the_ends(ops in proptest::collection::vec(op(), 0..30)) {
        let ids = SequentialIds::new("v");
        let graph = apply(&ops, &ids);

        prop_assert_eq!(graph.has_undo(), graph.active_id() != graph.head_id());
        prop_assert_eq!(graph.has_redo(), graph.active_id() != graph.tail_id());

        let mut at_head = graph.clone();
        while at_head.undo() {}
        prop_assert_eq!(at_head.active_id(), graph.head_id());
        prop_assert!(!at_head.undo());
        prop_assert_eq!(at_head.nodes(), graph.nodes());
    }

    #[test]
    fn migration_is_idempotent(
        ops in proptest::collection::vec(op(), 0..30),
        raw_messages in proptest::collection::vec(message(), 0..10),
    ) {
        let ids = SequentialIds::new("v");
        let graph = apply(&ops, &ids);
        let messages: Vec<ChatMessage> = raw_messages
            .into_iter()
            .enumerate()
            .map(|(i, (is_user, text))| {
                let role = if is_user { Role::User } else { Role::Assistant };
                ChatMessage::new(format!("m{}", i), role, text)
            })
            .collect();

        let raw = serde_json::to_value(&graph).unwrap();
        let once = migrate_version_graph(Some(&raw), &messages, &ids);
        prop_assert_eq!(&once, &graph);

        let raw_once = serde_json::to_value(&once).unwrap();
        let twice = migrate_version_graph(Some(&raw_once), &messages, &ids);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn replay_makes_one_version_per_user_message(
        raw_messages in proptest::collection::vec(message(), 0..12),
    ) {
        let ids = SequentialIds::new("v");
        let messages: Vec<ChatMessage> = raw_messages
            .into_iter()
            .enumerate()
            .map(|(i, (is_user, text))| {
                let role = if is_user { Role::User } else { Role::Assistant };
                ChatMessage::new(format!("m{}", i), role, text)
            })
            .collect();
        let user_count = messages.iter().filter(|m| m.role == Role::User).count();

        let graph = migrate_version_graph(None, &messages, &ids);
        prop_assert_eq!(graph.display_versions().len(), user_count);
        prop_assert!(graph.validate().is_ok());
    }

    #[test]
    fn tab_count_never_exceeds_capacity(max_tabs in 1usize..10, extra in 1usize..5) {
        let mut tabs = TabManager::with_id_generator(max_tabs, SequentialIds::shared("t"));
        let preset = PromptPresetSummary::new("General", TaskType::General);

        for _ in 0..max_tabs {
            prop_assert!(tabs.create_tab(preset.clone()).is_ok());
        }
        for _ in 0..extra {
            prop_assert!(tabs.create_tab(preset.clone()).is_err());
        }
        prop_assert_eq!(tabs.len(), max_tabs);
    }
}
