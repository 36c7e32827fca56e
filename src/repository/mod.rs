use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard},
};

use anyhow::anyhow;
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::link::{is_valid_link, link_identity, rename_link};
use crate::naming::{base_name, normalize_name, unique_name};
use crate::store::{Node, NodeId, NodeStore};

mod error;

pub use error::NodeError;

pub type NodeResult<T> = Result<T, NodeError>;

#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub link: String,
    pub name: Option<String>,
    pub priority: Option<i64>,
}

/// Omitted fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub link: Option<String>,
    pub name: Option<String>,
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct BulkImport {
    pub text: String,
    pub name: Option<String>,
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub added: usize,
    pub skipped: usize,
}

/// Node collection operations, each a full load/mutate/save cycle.
///
/// Cycles are serialized by one mutex, so concurrent requests in this
/// process never lose each other's writes.
pub struct NodeRepository {
    store: NodeStore,
    lock: Mutex<()>,
    reject_duplicate_links: bool,
}

impl NodeRepository {
    pub fn new(store: NodeStore, reject_duplicate_links: bool) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            reject_duplicate_links,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn list_all(&self) -> Vec<Node> {
        let _guard = self.lock();
        self.store.load()
    }

    pub fn create(&self, input: NewNode) -> NodeResult<Node> {
        let link = input.link.trim();
        if !is_valid_link(link) {
            return Err(NodeError::InvalidLink);
        }

        let _guard = self.lock();
        let mut nodes = self.store.load();
        if self.reject_duplicate_links && has_duplicate(&nodes, link, None) {
            return Err(NodeError::DuplicateLink);
        }

        let name = unique_name(&base_name(input.name.as_deref()), &nodes, None);
        let node = Node {
            id: next_id(&nodes)?,
            link: rename_link(link, &name),
            name,
            priority: input.priority.unwrap_or(0),
            created: Some(Utc::now()),
        };
        nodes.push(node.clone());
        self.store.save(&nodes)?;

        info!(id = %node.id, name = %node.name, "node created");
        Ok(node)
    }

    /// The embedded link name is re-synchronized on every update, even when
    /// only `priority` changes.
    pub fn update(&self, id: &NodeId, patch: NodePatch) -> NodeResult<Node> {
        let _guard = self.lock();
        let mut nodes = self.store.load();
        let index = nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| NodeError::NotFound(id.to_string()))?;

        let link = match non_blank(patch.link.as_deref()) {
            Some(link) => link.to_string(),
            None => nodes[index].link.clone(),
        };
        if !is_valid_link(&link) {
            return Err(NodeError::InvalidLink);
        }
        if self.reject_duplicate_links && has_duplicate(&nodes, &link, Some(id)) {
            return Err(NodeError::DuplicateLink);
        }

        let base = match non_blank(patch.name.as_deref()) {
            Some(name) => normalize_name(name),
            None => nodes[index].name.clone(),
        };
        let base = if base.is_empty() { base_name(None) } else { base };
        let name = unique_name(&base, &nodes, Some(id));

        let node = &mut nodes[index];
        node.link = rename_link(&link, &name);
        node.name = name;
        if let Some(priority) = patch.priority {
            node.priority = priority;
        }
        let updated = node.clone();
        self.store.save(&nodes)?;

        info!(id = %id, name = %updated.name, "node updated");
        Ok(updated)
    }

    /// Removing an unknown id is not an error and writes nothing.
    pub fn remove(&self, id: &NodeId) -> NodeResult<bool> {
        let _guard = self.lock();
        let mut nodes = self.store.load();
        let before = nodes.len();
        nodes.retain(|n| &n.id != id);
        let removed = nodes.len() != before;
        if removed {
            self.store.save(&nodes)?;
        }

        info!(id = %id, removed, "node delete");
        Ok(removed)
    }

    /// One node per valid line, each with its own unique name derived from
    /// the shared base. Invalid lines are skipped, never fatal.
    pub fn bulk_create(&self, input: BulkImport) -> NodeResult<BulkOutcome> {
        let text = input.text.trim();
        if text.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let _guard = self.lock();
        let mut nodes = self.store.load();
        let base = base_name(input.name.as_deref());
        let priority = input.priority.unwrap_or(0);
        let mut seen: HashSet<String> = if self.reject_duplicate_links {
            nodes.iter().map(|n| link_identity(&n.link)).collect()
        } else {
            HashSet::new()
        };

        let mut outcome = BulkOutcome::default();
        for line in text.lines() {
            let link = line.trim();
            if link.is_empty() {
                continue;
            }
            if !is_valid_link(link)
                || (self.reject_duplicate_links && !seen.insert(link_identity(link)))
            {
                outcome.skipped += 1;
                continue;
            }

            let name = unique_name(&base, &nodes, None);
            let node = Node {
                id: next_id(&nodes)?,
                link: rename_link(link, &name),
                name,
                priority,
                created: Some(Utc::now()),
            };
            nodes.push(node);
            outcome.added += 1;
        }

        if outcome.added > 0 {
            self.store.save(&nodes)?;
        }
        info!(added = outcome.added, skipped = outcome.skipped, "bulk import");
        Ok(outcome)
    }

    /// Replace the whole collection with `payload["data"]`, verbatim.
    pub fn reorder(&self, payload: Value) -> NodeResult<()> {
        let data = match payload {
            Value::Object(mut map) => map.remove("data"),
            _ => None,
        }
        .ok_or_else(|| NodeError::InvalidPayload("missing `data`".to_string()))?;
        if !data.is_array() {
            return Err(NodeError::InvalidPayload("`data` must be an array".to_string()));
        }
        let nodes: Vec<Node> =
            serde_json::from_value(data).map_err(|e| NodeError::InvalidPayload(e.to_string()))?;

        let _guard = self.lock();
        self.store.save(&nodes)?;
        info!(count = nodes.len(), "nodes reordered");
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn next_id(nodes: &[Node]) -> NodeResult<NodeId> {
    NodeId::next_after(nodes.iter().map(|n| &n.id))
        .ok_or_else(|| NodeError::Store(anyhow!("node id space exhausted")))
}

fn has_duplicate(nodes: &[Node], link: &str, ignore_id: Option<&NodeId>) -> bool {
    let key = link_identity(link);
    nodes
        .iter()
        .any(|n| Some(&n.id) != ignore_id && link_identity(&n.link) == key)
}
