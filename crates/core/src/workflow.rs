//! Typed ComfyUI workflow graph and template loading.
//!
//! The engine's API format is an object keyed by node id, each value
//! carrying a `class_type` and an `inputs` map. An input is either a literal
//! or a connection encoded as `[source_node_id, output_index]`; the latter
//! is modelled as [`InputValue::Link`].

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// String key of a node in the workflow object.
pub type NodeId = String;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A reference to one output slot of another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink {
    pub node_id: NodeId,
    pub output_index: u32,
}

/// A node input: a literal value or a connection to another node's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum InputValue {
    Literal(Value),
    Link(NodeLink),
}

/// A single node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Engine node type, e.g. `"CLIPTextEncode"`.
    pub class_type: String,
    #[serde(default)]
    pub inputs: IndexMap<String, InputValue>,
    /// Anything else the engine put on the node (`_meta` titles and the like).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A workflow graph in the engine's API format.
///
/// Node order from the source document is preserved on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: IndexMap<NodeId, WorkflowNode>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl NodeLink {
    pub fn new(node_id: impl Into<NodeId>, output_index: u32) -> Self {
        Self {
            node_id: node_id.into(),
            output_index,
        }
    }

    /// Recognise the engine's `[node_id, output_index]` connection encoding.
    ///
    /// Numeric node ids are accepted and normalised to strings.
    fn from_value(value: &Value) -> Option<Self> {
        let arr = value.as_array()?;
        if arr.len() != 2 {
            return None;
        }
        let node_id = match &arr[0] {
            Value::String(s) => s.clone(),
            Value::Number(n) if n.is_u64() => n.to_string(),
            _ => return None,
        };
        let output_index = u32::try_from(arr[1].as_u64()?).ok()?;
        Some(Self {
            node_id,
            output_index,
        })
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        match NodeLink::from_value(&value) {
            Some(link) => InputValue::Link(link),
            None => InputValue::Literal(value),
        }
    }
}

impl From<InputValue> for Value {
    fn from(input: InputValue) -> Self {
        match input {
            InputValue::Literal(value) => value,
            InputValue::Link(link) => Value::Array(vec![
                Value::String(link.node_id),
                Value::from(link.output_index),
            ]),
        }
    }
}

impl InputValue {
    pub fn text(s: impl Into<String>) -> Self {
        InputValue::Literal(Value::String(s.into()))
    }

    pub fn is_link(&self) -> bool {
        matches!(self, InputValue::Link(_))
    }

    pub fn as_link(&self) -> Option<&NodeLink> {
        match self {
            InputValue::Link(link) => Some(link),
            InputValue::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            InputValue::Literal(value) => Some(value),
            InputValue::Link(_) => None,
        }
    }
}

impl WorkflowNode {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: IndexMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Builder-style input setter, handy for assembling graphs in code.
    pub fn with_input(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.inputs.get(name)
    }

    /// Set an input, replacing any existing value in place.
    pub fn set_input(&mut self, name: &str, value: InputValue) {
        self.inputs.insert(name.to_string(), value);
    }
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, node: WorkflowNode) {
        self.nodes.insert(id.into(), node);
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &WorkflowNode)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Template loading
// ---------------------------------------------------------------------------

/// Parse a workflow template document.
///
/// Accepts a leading UTF-8 BOM and `//` line comments outside of string
/// literals, both of which hand-edited template files tend to carry.
pub fn parse_template(text: &str) -> Result<WorkflowGraph, CoreError> {
    let cleaned = strip_line_comments(text.trim_start_matches('\u{feff}'));

    let graph: WorkflowGraph = serde_json::from_str(&cleaned).map_err(|e| {
        CoreError::Validation(format!("Workflow template is not a valid workflow: {e}"))
    })?;

    if graph.is_empty() {
        return Err(CoreError::Validation(
            "Workflow template must contain at least one node".to_string(),
        ));
    }
    Ok(graph)
}

/// Read and parse a workflow template file.
pub fn load_template(path: &Path) -> Result<WorkflowGraph, CoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CoreError::Internal(format!(
            "Failed to read workflow template {}: {e}",
            path.display()
        ))
    })?;
    parse_template(&text)
}

/// Remove `//` comments that are not inside a JSON string.
fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut in_string = false;
        let mut escaped = false;
        let mut cut = line.len();
        let bytes = line.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
            } else if b == b'"' {
                in_string = true;
            } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
                cut = i;
                break;
            }
        }
        out.push_str(&line[..cut]);
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
