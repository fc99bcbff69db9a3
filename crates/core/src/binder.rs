//! Workflow schema validation and parameter binding.
//!
//! [`validate_template`] checks a template against the [`REQUIRED_NODES`]
//! schema table once, at load time. [`bind_workflow`] clones a validated
//! template and writes concrete [`GenerationParameters`] into the nodes
//! named by a [`WorkflowLayout`].

use serde_json::Value;

use crate::error::CoreError;
use crate::params::{format_decimal, GenerationParameters};
use crate::workflow::{InputValue, NodeLink, WorkflowGraph};

// ---------------------------------------------------------------------------
// Node ids of the Flux text-to-image template
// ---------------------------------------------------------------------------

pub const SAMPLER_NODE: &str = "14";
pub const LATENT_NODE: &str = "15";
pub const SAVE_IMAGE_NODE: &str = "17";
pub const PROMPT_NODE: &str = "54";
pub const SEED_NODE: &str = "55";
pub const SEED_TEXT_NODE: &str = "57";

/// Text written into the negative/guard node when the layout has one.
pub const DEFAULT_GUARD_TEXT: &str = "blurry, low quality, distorted, watermark, text";

/// Sampler inputs the sampler node reads as text.
const SAMPLER_TEXT_INPUTS: &[&str] = &["steps", "guidance", "max_shift", "base_shift", "denoise"];

// ---------------------------------------------------------------------------
// Schema table
// ---------------------------------------------------------------------------

/// Shape a template node must have.
#[derive(Debug, Clone, Copy)]
pub struct NodeSchema {
    pub id: &'static str,
    pub class_type: &'static str,
    pub inputs: &'static [&'static str],
}

/// Nodes the Flux template must declare, with their types and input fields.
pub const REQUIRED_NODES: &[NodeSchema] = &[
    NodeSchema { id: "10", class_type: "UNETLoader", inputs: &["unet_name"] },
    NodeSchema { id: "11", class_type: "DualCLIPLoader", inputs: &["clip_name1", "clip_name2"] },
    NodeSchema { id: "12", class_type: "VAELoader", inputs: &["vae_name"] },
    NodeSchema {
        id: SAMPLER_NODE,
        class_type: "FluxSamplerParams+",
        inputs: &["seed", "steps", "guidance", "max_shift", "base_shift", "denoise"],
    },
    NodeSchema { id: LATENT_NODE, class_type: "EmptyLatentImage", inputs: &["width", "height"] },
    NodeSchema { id: "16", class_type: "VAEDecode", inputs: &["samples", "vae"] },
    NodeSchema { id: SAVE_IMAGE_NODE, class_type: "SaveImage", inputs: &["images"] },
    NodeSchema { id: "52", class_type: "TeaCache", inputs: &["model"] },
    NodeSchema { id: PROMPT_NODE, class_type: "CLIPTextEncode", inputs: &["text", "clip"] },
    NodeSchema { id: SEED_NODE, class_type: "Seed", inputs: &["seed"] },
    NodeSchema { id: SEED_TEXT_NODE, class_type: "Number to Text", inputs: &["number"] },
];

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// How the seed reaches the sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedBinding {
    /// Write the seed as a literal straight onto the sampler's `seed` input.
    Direct,
    /// Write the seed into `seed_node` and route it through `text_node`
    /// (numeric-to-text) so the sampler receives a connection.
    Chained { seed_node: String, text_node: String },
}

/// Which template nodes receive which parameters.
#[derive(Debug, Clone)]
pub struct WorkflowLayout {
    pub schema: &'static [NodeSchema],
    pub prompt_node: String,
    /// Optional negative prompt node; receives [`DEFAULT_GUARD_TEXT`].
    pub guard_node: Option<String>,
    pub seed: SeedBinding,
    pub sampler_node: String,
    pub latent_node: String,
    /// Node whose outputs carry the saved images.
    pub save_node: String,
}

impl Default for WorkflowLayout {
    fn default() -> Self {
        Self {
            schema: REQUIRED_NODES,
            prompt_node: PROMPT_NODE.to_string(),
            guard_node: None,
            seed: SeedBinding::Chained {
                seed_node: SEED_NODE.to_string(),
                text_node: SEED_TEXT_NODE.to_string(),
            },
            sampler_node: SAMPLER_NODE.to_string(),
            latent_node: LATENT_NODE.to_string(),
            save_node: SAVE_IMAGE_NODE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Check a template against the layout's schema table.
///
/// Stops at the first violation, naming the node id and the missing field
/// or the expected type.
pub fn validate_template(graph: &WorkflowGraph, layout: &WorkflowLayout) -> Result<(), CoreError> {
    for schema in layout.schema {
        let node = graph.node(schema.id).ok_or_else(|| {
            CoreError::Validation(format!("Missing required node {}", schema.id))
        })?;

        if node.class_type != schema.class_type {
            return Err(CoreError::Validation(format!(
                "Node {} has type '{}', expected '{}'",
                schema.id, node.class_type, schema.class_type
            )));
        }

        for input in schema.inputs {
            if node.input(input).is_none() {
                return Err(CoreError::Validation(format!(
                    "Node {} is missing input field '{input}'",
                    schema.id
                )));
            }
        }
    }

    if let Some(guard) = &layout.guard_node {
        require_input(graph, guard, "text")?;
    }

    validate_sampler_shape(graph, layout)
}

/// Produce a concrete workflow from a template and request parameters.
///
/// The template is validated first and never modified; the result is an
/// independent copy.
pub fn bind_workflow(
    params: &GenerationParameters,
    template: &WorkflowGraph,
    layout: &WorkflowLayout,
) -> Result<WorkflowGraph, CoreError> {
    validate_template(template, layout)?;

    let mut graph = template.clone();

    set(&mut graph, &layout.prompt_node, "text", InputValue::text(params.prompt.trim()))?;

    if let Some(guard) = &layout.guard_node {
        set(&mut graph, guard, "text", InputValue::text(DEFAULT_GUARD_TEXT))?;
    }

    let seed = InputValue::Literal(Value::from(params.seed));
    match &layout.seed {
        SeedBinding::Direct => set(&mut graph, &layout.sampler_node, "seed", seed)?,
        SeedBinding::Chained {
            seed_node,
            text_node,
        } => {
            set(&mut graph, seed_node, "seed", seed)?;
            set(&mut graph, text_node, "number", InputValue::Link(NodeLink::new(seed_node.as_str(), 1)))?;
            set(
                &mut graph,
                &layout.sampler_node,
                "seed",
                InputValue::Link(NodeLink::new(text_node.as_str(), 0)),
            )?;
        }
    }

    let sampler = &layout.sampler_node;
    set(&mut graph, sampler, "steps", InputValue::text(params.steps.to_string()))?;
    set(&mut graph, sampler, "guidance", InputValue::text(format_decimal(params.guidance)))?;
    set(&mut graph, sampler, "max_shift", InputValue::text(format_decimal(params.max_shift)))?;
    set(&mut graph, sampler, "base_shift", InputValue::text(format_decimal(params.base_shift)))?;
    set(&mut graph, sampler, "denoise", InputValue::text(format_decimal(params.denoise)))?;

    let latent = &layout.latent_node;
    set(&mut graph, latent, "width", InputValue::Literal(Value::from(params.width)))?;
    set(&mut graph, latent, "height", InputValue::Literal(Value::from(params.height)))?;
    set(&mut graph, latent, "batch_size", InputValue::Literal(Value::from(params.batch_count)))?;

    Ok(graph)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// The sampler reads its tuning parameters as text and needs its seed as a
/// connection when the seed is chained.
fn validate_sampler_shape(graph: &WorkflowGraph, layout: &WorkflowLayout) -> Result<(), CoreError> {
    let Some(sampler) = graph.node(&layout.sampler_node) else {
        return Err(CoreError::Validation(format!(
            "Missing required node {}",
            layout.sampler_node
        )));
    };

    for param in SAMPLER_TEXT_INPUTS {
        if let Some(value) = sampler.input(param) {
            let is_text = matches!(value.as_literal(), Some(Value::String(_)));
            if !is_text {
                return Err(CoreError::Validation(format!(
                    "Node {} input '{param}' must be a text value",
                    layout.sampler_node
                )));
            }
        }
    }

    if matches!(layout.seed, SeedBinding::Chained { .. }) {
        if let Some(seed) = sampler.input("seed") {
            if !seed.is_link() {
                return Err(CoreError::Validation(format!(
                    "Node {} input 'seed' must be a node connection",
                    layout.sampler_node
                )));
            }
        }
    }
    Ok(())
}

fn require_input(graph: &WorkflowGraph, node_id: &str, input: &str) -> Result<(), CoreError> {
    let node = graph
        .node(node_id)
        .ok_or_else(|| CoreError::Validation(format!("Missing required node {node_id}")))?;
    if node.input(input).is_none() {
        return Err(CoreError::Validation(format!(
            "Node {node_id} is missing input field '{input}'"
        )));
    }
    Ok(())
}

fn set(graph: &mut WorkflowGraph, node_id: &str, input: &str, value: InputValue) -> Result<(), CoreError> {
    let node = graph
        .node_mut(node_id)
        .ok_or_else(|| CoreError::Validation(format!("Missing required node {node_id}")))?;
    node.set_input(input, value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
