//! Normalization of persisted version graphs.
//!
//! Graphs saved by older builds may be absent, use an earlier node shape, or
//! carry broken links. [`migrate_version_graph`] turns any of these into a
//! graph that satisfies every invariant, and never fails.

use std::collections::{BTreeMap, HashSet};

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    GraphError, IdGenerator, NewVersion, RawVersionGraph, VersionGraph, VersionMetadata,
    VersionNode,
};
use crate::data::{ChatMessage, Role};

/// Bring a persisted graph into the current shape.
///
/// - A graph that already validates is returned unchanged.
/// - A graph whose only fault is a dangling `activeId` gets the tail as active.
/// - A graph object with recoverable nodes is relinked: nodes reachable from
///   the head keep their order, stragglers follow sorted by creation time.
/// - A missing graph, or one without usable nodes, is rebuilt by replaying
///   `messages`: each user message becomes a version linked to the assistant
///   reply that immediately follows it.
/// - Anything that is not a JSON object degrades to a fresh empty graph.
pub fn migrate_version_graph(
    raw: Option<&Value>,
    messages: &[ChatMessage],
    ids: &dyn IdGenerator,
) -> VersionGraph {
    let raw = match raw {
        None | Some(Value::Null) => return replay_messages(messages, ids),
        Some(value) if !value.is_object() => {
            warn!("Persisted version graph is not an object; starting fresh");
            return VersionGraph::empty(ids);
        }
        Some(value) => value,
    };

    if let Ok(parsed) = RawVersionGraph::deserialize(raw) {
        let mut graph = parsed.into_unchecked();
        match graph.validate() {
            Ok(()) => return graph,
            Err(GraphError::MissingActive(active)) => {
                debug!(active = %active, "Active version missing; falling back to tail");
                graph.set_active_to_tail();
                return graph;
            }
            Err(e) => {
                debug!(error = %e, "Persisted version graph is inconsistent; relinking");
            }
        }
    }

    match LooseGraph::parse(raw) {
        Some(loose) if !loose.nodes.is_empty() => loose.relink(),
        _ => {
            debug!("Persisted version graph has no usable nodes; replaying messages");
            replay_messages(messages, ids)
        }
    }
}

/// Rebuild history from a chat transcript
fn replay_messages(messages: &[ChatMessage], ids: &dyn IdGenerator) -> VersionGraph {
    let mut graph = VersionGraph::empty(ids);
    let mut version_number = 0;

    for (index, message) in messages.iter().enumerate() {
        if message.role != Role::User {
            continue;
        }
        version_number += 1;
        let output_message_id = messages
            .get(index + 1)
            .filter(|next| next.role == Role::Assistant)
            .map(|next| next.id.clone());

        graph = graph.append_version(
            ids,
            NewVersion::new(message.content.clone(), format!("Version {}", version_number))
                .with_output_message_id(output_message_id),
        );
    }

    graph
}

/// Node shape accepted from any earlier build; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LooseNode {
    id: Option<String>,
    label: Option<String>,
    content: Option<String>,
    original_input: Option<String>,
    output_message_id: Option<String>,
    created_at: Option<Value>,
    prev_id: Option<String>,
    next_id: Option<String>,
    metadata: Option<Value>,
}

struct LooseGraph {
    nodes: BTreeMap<String, VersionNode>,
    head_id: Option<String>,
    active_id: Option<String>,
}

impl LooseGraph {
    fn parse(raw: &Value) -> Option<Self> {
        let object = raw.as_object()?;
        let entries: Vec<(Option<&str>, &Value)> = match object.get("nodes")? {
            Value::Object(map) => map.iter().map(|(key, node)| (Some(key.as_str()), node)).collect(),
            Value::Array(list) => list.iter().map(|node| (None, node)).collect(),
            _ => return None,
        };

        let mut nodes = BTreeMap::new();
        for (key, value) in entries {
            let Ok(loose) = LooseNode::deserialize(value) else {
                warn!(key = ?key, "Dropping unreadable version node");
                continue;
            };
            let Some(id) = loose
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| key.map(str::to_string))
                .filter(|id| !id.is_empty())
            else {
                continue;
            };
            if nodes.contains_key(&id) {
                continue;
            }
            nodes.insert(id.clone(), loose.into_node(id));
        }

        let string_field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Some(Self {
            nodes,
            head_id: string_field("headId"),
            active_id: string_field("activeId"),
        })
    }

    /// Relink nodes into one valid chain
    fn relink(mut self) -> VersionGraph {
        let order = self.chain_order();

        let mut last_created_at = i64::MIN;
        for (position, id) in order.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.prev_id = position.checked_sub(1).map(|p| order[p].clone());
                node.next_id = order.get(position + 1).cloned();
                node.created_at = node.created_at.max(last_created_at);
                last_created_at = node.created_at;
            }
        }

        let head_id = order.first().cloned().unwrap_or_default();
        let tail_id = order.last().cloned().unwrap_or_default();
        let active_id = self
            .active_id
            .filter(|id| self.nodes.contains_key(id))
            .unwrap_or_else(|| tail_id.clone());

        VersionGraph::from_parts(self.nodes, head_id, tail_id, active_id)
    }

    /// Walk from the head as far as the links hold, then append the rest
    fn chain_order(&self) -> Vec<String> {
        let head = self
            .head_id
            .clone()
            .filter(|id| self.nodes.contains_key(id))
            .or_else(|| {
                self.nodes
                    .values()
                    .filter(|node| node.prev_id.is_none())
                    .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
                    .map(|node| node.id.clone())
            });

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut cursor = head;
        while let Some(id) = cursor {
            let Some(node) = self.nodes.get(&id) else {
                break;
            };
            if !seen.insert(id.clone()) {
                break;
            }
            cursor = node.next_id.clone();
            order.push(id);
        }

        let mut stragglers: Vec<&VersionNode> = self
            .nodes
            .values()
            .filter(|node| !seen.contains(&node.id))
            .collect();
        stragglers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        order.extend(stragglers.into_iter().map(|node| node.id.clone()));
        order
    }
}

impl LooseNode {
    fn into_node(self, id: String) -> VersionNode {
        let content = self.content.unwrap_or_default();
        VersionNode {
            id,
            label: self.label.unwrap_or_default(),
            original_input: self.original_input.unwrap_or_else(|| content.clone()),
            content,
            output_message_id: self.output_message_id,
            created_at: self.created_at.as_ref().map_or(0, parse_timestamp),
            prev_id: self.prev_id,
            next_id: self.next_id,
            metadata: self
                .metadata
                .and_then(|value| serde_json::from_value::<VersionMetadata>(value).ok()),
        }
    }
}

/// Accept epoch milliseconds (integer or float) or an RFC 3339 string
fn parse_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0),
        _ => 0,
    }
}
