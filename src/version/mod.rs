//! Prompt version history
//!
//! A tab's history is a linear doubly-linked list stored as an arena of nodes
//! keyed by id. Links are ids, never references, so the whole structure
//! serializes to the same JSON shape the application has always persisted.

mod graph;
pub mod migrate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use graph::summarize_delta;
pub use migrate::migrate_version_graph;

/// Label given to the sentinel node every graph starts with
pub const START_LABEL: &str = "Start";

/// Source of node and tab identifiers.
///
/// Implementations must never hand out the same id twice within a process.
pub trait IdGenerator {
    fn next_id(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String,
{
    fn next_id(&self) -> String {
        self()
    }
}

/// Default id source backed by random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Generation settings captured alongside a version so it can be reproduced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// A snapshot of a prompt draft at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionNode {
    pub id: String,
    pub label: String,
    /// Prompt text at snapshot time
    pub content: String,
    /// Raw text the user typed, before any augmentation
    pub original_input: String,
    /// Assistant message produced for this version (None = manual save)
    pub output_message_id: Option<String>,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub prev_id: Option<String>,
    pub next_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VersionMetadata>,
}

impl VersionNode {
    /// Whether a generated answer is linked to this version
    pub fn has_output(&self) -> bool {
        self.output_message_id.is_some()
    }

    /// Whether this is the "Start" sentinel seeded by [`VersionGraph::new`].
    ///
    /// Matched by label alone: relinked legacy graphs can leave the sentinel
    /// anywhere in the chain.
    pub fn is_sentinel(&self) -> bool {
        self.label == START_LABEL
    }
}

/// Linear version history of one tab.
///
/// Despite the name this is a list, not a DAG: following `next_id` from the
/// head visits every node exactly once and ends at the tail. Fields are only
/// reachable through the methods in this module, and deserializing runs
/// [`VersionGraph::validate`], so the invariants hold for every value handed
/// out. Use [`migrate_version_graph`] to load graphs that may be damaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawVersionGraph")]
pub struct VersionGraph {
    nodes: BTreeMap<String, VersionNode>,
    head_id: String,
    tail_id: String,
    active_id: String,
}

/// Persisted graph shape before its links are checked
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawVersionGraph {
    nodes: BTreeMap<String, VersionNode>,
    head_id: String,
    tail_id: String,
    active_id: String,
}

impl RawVersionGraph {
    /// Adopt the fields as-is; callers must validate or repair the result
    pub(crate) fn into_unchecked(self) -> VersionGraph {
        VersionGraph::from_parts(self.nodes, self.head_id, self.tail_id, self.active_id)
    }
}

impl TryFrom<RawVersionGraph> for VersionGraph {
    type Error = GraphError;

    fn try_from(raw: RawVersionGraph) -> Result<Self, Self::Error> {
        let graph = raw.into_unchecked();
        graph.validate()?;
        Ok(graph)
    }
}

/// Everything needed to append one version
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVersion {
    pub content: String,
    pub label: String,
    pub original_input: String,
    pub output_message_id: Option<String>,
    pub metadata: Option<VersionMetadata>,
}

impl NewVersion {
    /// A version whose original input is the content itself
    pub fn new(content: impl Into<String>, label: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            original_input: content.clone(),
            content,
            label: label.into(),
            output_message_id: None,
            metadata: None,
        }
    }

    pub fn with_original_input(mut self, original_input: impl Into<String>) -> Self {
        self.original_input = original_input.into();
        self
    }

    pub fn with_output_message_id(mut self, output_message_id: Option<String>) -> Self {
        self.output_message_id = output_message_id;
        self
    }

    pub fn with_metadata(mut self, metadata: VersionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Structural problems found by [`VersionGraph::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("version graph has no nodes")]
    Empty,
    #[error("node {0} is referenced but missing")]
    MissingNode(String),
    #[error("node stored under key {key} has id {id}")]
    KeyMismatch { key: String, id: String },
    #[error("node {0} is visited twice while walking the chain")]
    Cycle(String),
    #[error("node {0} does not point back at its predecessor")]
    BrokenBackLink(String),
    #[error("chain ends at {found} but tail is {expected}")]
    TailMismatch { expected: String, found: String },
    #[error("{0} nodes are not reachable from the head")]
    Unreachable(usize),
    #[error("active version {0} does not exist")]
    MissingActive(String),
}
