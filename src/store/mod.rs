use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

mod blob;
mod id;

pub use blob::{BlobStore, FileBlobStore};
pub use id::NodeId;
#[cfg(test)]
pub use blob::MemoryBlobStore;

/// One managed subscription entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    pub link: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Whole-collection JSON persistence over a [`BlobStore`].
#[derive(Clone)]
pub struct NodeStore {
    blob: Arc<dyn BlobStore>,
}

impl NodeStore {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self { blob }
    }

    /// Never fails: an absent, unreadable or non-array blob loads as empty.
    /// Records are decoded one by one and a malformed record is dropped
    /// without discarding its neighbours.
    pub fn load(&self) -> Vec<Node> {
        let bytes = match self.blob.read() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "node store unreadable, treating as empty");
                return Vec::new();
            }
        };

        let records = match serde_json::from_slice::<Vec<Value>>(&bytes) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "node store corrupt, treating as empty");
                return Vec::new();
            }
        };

        records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value::<Node>(record) {
                Ok(node) => Some(node),
                Err(err) => {
                    warn!(index, error = %err, "dropping malformed node record");
                    None
                }
            })
            .collect()
    }

    pub fn save(&self, nodes: &[Node]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(nodes).context("failed to serialize nodes")?;
        self.blob.write(&bytes)
    }
}
