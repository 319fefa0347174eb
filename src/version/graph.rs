use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tracing::warn;

use super::{
    GraphError, IdGenerator, NewVersion, UuidGenerator, VersionGraph, VersionNode, START_LABEL,
};

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl VersionGraph {
    /// Create a graph holding a single node that is head, tail and active
    pub fn new(
        ids: &dyn IdGenerator,
        initial_content: impl Into<String>,
        label: impl Into<String>,
        original_input: impl Into<String>,
        output_message_id: Option<String>,
    ) -> Self {
        let id = fresh_id(ids, |_| false);
        let node = VersionNode {
            id: id.clone(),
            label: label.into(),
            content: initial_content.into(),
            original_input: original_input.into(),
            output_message_id,
            created_at: now_millis(),
            prev_id: None,
            next_id: None,
            metadata: None,
        };

        let mut nodes = BTreeMap::new();
        nodes.insert(id.clone(), node);
        Self {
            nodes,
            head_id: id.clone(),
            tail_id: id.clone(),
            active_id: id,
        }
    }

    /// The seed shape every tab starts from: an empty "Start" sentinel
    pub fn empty(ids: &dyn IdGenerator) -> Self {
        Self::new(ids, "", START_LABEL, "", None)
    }

    /// Build a graph from parts already known to be consistent.
    pub(crate) fn from_parts(
        nodes: BTreeMap<String, VersionNode>,
        head_id: String,
        tail_id: String,
        active_id: String,
    ) -> Self {
        Self {
            nodes,
            head_id,
            tail_id,
            active_id,
        }
    }

    /// Record a new version after the current tail.
    ///
    /// The new node becomes both tail and active. History is linear: when the
    /// active node sits mid-chain (after an undo) the new version still goes
    /// after the tail, and the nodes between stay in the chain untouched.
    pub fn append_version(mut self, ids: &dyn IdGenerator, version: NewVersion) -> Self {
        self.push_version(ids, version);
        self
    }

    /// In-place form of [`VersionGraph::append_version`]; returns the new id
    pub fn push_version(&mut self, ids: &dyn IdGenerator, version: NewVersion) -> &str {
        let id = fresh_id(ids, |candidate| self.nodes.contains_key(candidate));
        let created_at = now_millis().max(self.tail().map_or(0, |tail| tail.created_at));
        let prev_tail = self.tail_id.clone();

        if let Some(tail) = self.nodes.get_mut(&prev_tail) {
            tail.next_id = Some(id.clone());
        }

        self.nodes.insert(
            id.clone(),
            VersionNode {
                id: id.clone(),
                label: version.label,
                content: version.content,
                original_input: version.original_input,
                output_message_id: version.output_message_id,
                created_at,
                prev_id: Some(prev_tail),
                next_id: None,
                metadata: version.metadata,
            },
        );
        self.tail_id = id.clone();
        self.active_id = id;
        &self.tail_id
    }

    /// Nodes in head-to-tail order.
    ///
    /// The walk stops after `len()` steps, at a dangling id, or at the first
    /// revisited node, so a corrupted chain can never loop forever.
    pub fn version_list(&self) -> Vec<&VersionNode> {
        let mut list = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut cursor = Some(self.head_id.as_str());

        while let Some(id) = cursor {
            if list.len() >= self.nodes.len() || !seen.insert(id) {
                break;
            }
            let Some(node) = self.nodes.get(id) else {
                break;
            };
            list.push(node);
            cursor = node.next_id.as_deref();
        }

        list
    }

    /// Versions shown to the user: the chain without the "Start" sentinel
    pub fn display_versions(&self) -> Vec<&VersionNode> {
        self.version_list()
            .into_iter()
            .filter(|node| !node.is_sentinel())
            .collect()
    }

    /// 1-based position of the active version among [`display_versions`],
    /// or 0 when the sentinel is active.
    ///
    /// [`display_versions`]: VersionGraph::display_versions
    pub fn active_display_index(&self) -> usize {
        self.display_versions()
            .iter()
            .position(|node| node.id == self.active_id)
            .map_or(0, |index| index + 1)
    }

    pub fn has_undo(&self) -> bool {
        self.active_node()
            .is_some_and(|node| node.prev_id.is_some())
    }

    pub fn has_redo(&self) -> bool {
        self.active_node()
            .is_some_and(|node| node.next_id.is_some())
    }

    /// Move the active pointer one step toward the head. Returns false at the head.
    pub fn undo(&mut self) -> bool {
        let target = self.active_node().and_then(|node| node.prev_id.clone());
        self.move_active(target)
    }

    /// Move the active pointer one step toward the tail. Returns false at the tail.
    pub fn redo(&mut self) -> bool {
        let target = self.active_node().and_then(|node| node.next_id.clone());
        self.move_active(target)
    }

    /// Make an arbitrary version active. Unknown ids are ignored.
    pub fn jump_to(&mut self, version_id: &str) -> bool {
        if !self.nodes.contains_key(version_id) {
            return false;
        }
        self.active_id = version_id.to_string();
        true
    }

    fn move_active(&mut self, target: Option<String>) -> bool {
        match target {
            Some(id) if self.nodes.contains_key(&id) => {
                self.active_id = id;
                true
            }
            _ => false,
        }
    }

    /// Output message linked to a version, if the version exists and has one
    pub fn output_message_id(&self, version_id: &str) -> Option<&str> {
        self.nodes
            .get(version_id)
            .and_then(|node| node.output_message_id.as_deref())
    }

    /// Content of the active version; the baseline for draft dirty checks
    pub fn active_content(&self) -> &str {
        self.active_node()
            .map(|node| node.content.as_str())
            .unwrap_or_default()
    }

    pub fn active_node(&self) -> Option<&VersionNode> {
        self.nodes.get(&self.active_id)
    }

    pub fn node(&self, version_id: &str) -> Option<&VersionNode> {
        self.nodes.get(version_id)
    }

    pub fn tail(&self) -> Option<&VersionNode> {
        self.nodes.get(&self.tail_id)
    }

    pub fn head_id(&self) -> &str {
        &self.head_id
    }

    pub fn tail_id(&self) -> &str {
        &self.tail_id
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn nodes(&self) -> &BTreeMap<String, VersionNode> {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check every structural invariant of the list.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }
        for (key, node) in &self.nodes {
            if *key != node.id {
                return Err(GraphError::KeyMismatch {
                    key: key.clone(),
                    id: node.id.clone(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut prev: Option<&str> = None;
        let mut cursor = Some(self.head_id.as_str());

        while let Some(id) = cursor {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| GraphError::MissingNode(id.to_string()))?;
            if !seen.insert(id) {
                return Err(GraphError::Cycle(id.to_string()));
            }
            if node.prev_id.as_deref() != prev {
                return Err(GraphError::BrokenBackLink(id.to_string()));
            }
            prev = Some(id);
            cursor = node.next_id.as_deref();
        }

        let last = prev.unwrap_or_default();
        if last != self.tail_id {
            return Err(GraphError::TailMismatch {
                expected: self.tail_id.clone(),
                found: last.to_string(),
            });
        }
        if seen.len() != self.nodes.len() {
            return Err(GraphError::Unreachable(self.nodes.len() - seen.len()));
        }
        if !self.nodes.contains_key(&self.active_id) {
            return Err(GraphError::MissingActive(self.active_id.clone()));
        }
        Ok(())
    }

    pub(crate) fn set_active_to_tail(&mut self) {
        self.active_id = self.tail_id.clone();
    }
}

/// Draw an id from the generator, falling back to a UUID if it collides
fn fresh_id(ids: &dyn IdGenerator, taken: impl Fn(&str) -> bool) -> String {
    let id = ids.next_id();
    if !id.is_empty() && !taken(&id) {
        return id;
    }
    warn!(id = %id, "Id generator returned an unusable id; falling back to a UUID");
    UuidGenerator.next_id()
}

/// Character delta between a version and its predecessor, as shown in the timeline
pub fn summarize_delta(current: &VersionNode, previous: Option<&VersionNode>) -> String {
    let current_len = current.content.chars().count() as i64;
    let previous_len = previous.map_or(0, |node| node.content.chars().count() as i64);
    let delta = current_len - previous_len;
    match delta {
        0 => "±0 chars".to_string(),
        d if d > 0 => format!("+{} chars", d),
        d => format!("{} chars", d),
    }
}
