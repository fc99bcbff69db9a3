//! Typed ComfyUI REST response bodies.
//!
//! Covers the three endpoints the service consumes: `GET /queue`,
//! `POST /prompt` and `GET /history/{prompt_id}`. Unknown fields are
//! ignored; shapes that do not match fail deserialization as a whole.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Snapshot of the engine's live queue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<QueueEntry>,
    #[serde(default)]
    pub queue_pending: Vec<QueueEntry>,
}

/// One queue entry.
///
/// ComfyUI reports entries as `[number, prompt_id, prompt, extra, outputs]`
/// tuples; some proxies report mappings whose values carry a `task_id`.
/// Anything else is kept opaque and only counted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QueueEntry {
    Tuple(Vec<Value>),
    Mapping(serde_json::Map<String, Value>),
    Opaque(Value),
}

/// Where a task sits in the live queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    Running,
    Pending,
}

impl QueueEntry {
    /// Task ids referenced by this entry.
    pub fn task_ids(&self) -> Vec<&str> {
        match self {
            QueueEntry::Tuple(items) => items.get(1).and_then(Value::as_str).into_iter().collect(),
            QueueEntry::Mapping(map) => {
                let mut ids: Vec<&str> = map
                    .values()
                    .filter_map(|v| v.get("task_id").and_then(Value::as_str))
                    .collect();
                if let Some(id) = map.get("prompt_id").and_then(Value::as_str) {
                    ids.push(id);
                }
                ids
            }
            QueueEntry::Opaque(_) => Vec::new(),
        }
    }
}

impl QueueSnapshot {
    /// Number of tasks running plus pending.
    pub fn len(&self) -> usize {
        self.queue_running.len() + self.queue_pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deduplicated ids of running tasks.
    pub fn running_ids(&self) -> HashSet<&str> {
        flatten_ids(&self.queue_running)
    }

    /// Deduplicated ids of pending tasks.
    pub fn pending_ids(&self) -> HashSet<&str> {
        flatten_ids(&self.queue_pending)
    }

    /// Locate a task in the snapshot. Running wins if an id appears in both.
    pub fn position_of(&self, task_id: &str) -> Option<QueuePosition> {
        if self.running_ids().contains(task_id) {
            Some(QueuePosition::Running)
        } else if self.pending_ids().contains(task_id) {
            Some(QueuePosition::Pending)
        } else {
            None
        }
    }
}

fn flatten_ids(entries: &[QueueEntry]) -> HashSet<&str> {
    entries.iter().flat_map(QueueEntry::task_ids).collect()
}

// ---------------------------------------------------------------------------
// Prompt submission
// ---------------------------------------------------------------------------

/// Response returned by `POST /prompt` after queuing a workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: Option<String>,
    /// Position in the execution queue.
    pub number: Option<i64>,
    #[serde(default)]
    pub node_errors: Option<Value>,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Body of `GET /history/{prompt_id}`: empty until the prompt has finished.
pub type HistoryResponse = HashMap<String, HistoryEntry>;

/// Completed-prompt record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Outputs keyed by node id, in engine order.
    #[serde(default)]
    pub outputs: IndexMap<String, NodeOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HistoryStatus>,
}

/// Execution status attached to a history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// Output of one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRef>>,
}

/// Reference to one produced image: inline data, a file, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

impl HistoryEntry {
    /// A history-shaped record listing files saved by `node_id`.
    pub fn from_files(node_id: &str, filenames: impl IntoIterator<Item = String>) -> Self {
        let images = filenames
            .into_iter()
            .map(|filename| ImageRef {
                filename: Some(filename),
                ..Default::default()
            })
            .collect();

        let mut outputs = IndexMap::new();
        outputs.insert(
            node_id.to_string(),
            NodeOutput {
                images: Some(images),
            },
        );
        Self {
            outputs,
            status: None,
        }
    }

    /// The first output (engine order) that carries an `images` collection.
    pub fn first_image_output(&self) -> Option<(&str, &[ImageRef])> {
        self.outputs
            .iter()
            .find_map(|(id, out)| out.images.as_deref().map(|imgs| (id.as_str(), imgs)))
    }
}
