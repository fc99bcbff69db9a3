//! In-memory engine double for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use fluxgen_comfyui::api::ComfyUIApiError;
use fluxgen_comfyui::engine::Engine;
use fluxgen_comfyui::messages::{
    HistoryEntry, HistoryResponse, ImageRef, NodeOutput, QueueEntry, QueueSnapshot, SubmitResponse,
};
use fluxgen_core::workflow::{parse_template, WorkflowGraph};
use serde_json::json;

/// Scripted engine. Unset responses fail with a 502.
#[derive(Default)]
pub struct FakeEngine {
    queue: Mutex<Option<QueueSnapshot>>,
    /// Answer `/queue` with a body that does not decode.
    queue_malformed: AtomicBool,
    submit: Mutex<Option<SubmitResponse>>,
    /// Popped one per history call; an exhausted script answers `{}`.
    history: Mutex<VecDeque<Result<HistoryResponse, u16>>>,
    pub submitted: Mutex<Vec<WorkflowGraph>>,
    pub queue_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(self, running: &[&str], pending: &[&str]) -> Self {
        *self.queue.lock().unwrap() = Some(queue_snapshot(running, pending));
        self
    }

    pub fn with_malformed_queue(self) -> Self {
        self.queue_malformed.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_prompt_id(self, prompt_id: Option<&str>) -> Self {
        *self.submit.lock().unwrap() = Some(SubmitResponse {
            prompt_id: prompt_id.map(str::to_string),
            number: Some(0),
            node_errors: None,
        });
        self
    }

    pub fn push_history(&self, response: HistoryResponse) {
        self.history.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_history_failure(&self, status: u16) {
        self.history.lock().unwrap().push_back(Err(status));
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn queue(&self) -> Result<QueueSnapshot, ComfyUIApiError> {
        self.queue_calls.fetch_add(1, Ordering::SeqCst);
        if self.queue_malformed.load(Ordering::SeqCst) {
            return Err(decode_error());
        }
        self.queue.lock().unwrap().clone().ok_or_else(unavailable)
    }

    async fn submit(&self, workflow: &WorkflowGraph) -> Result<SubmitResponse, ComfyUIApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(workflow.clone());
        self.submit.lock().unwrap().clone().ok_or_else(unavailable)
    }

    async fn history(&self, _task_id: &str) -> Result<HistoryResponse, ComfyUIApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        match self.history.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(status)) => Err(ComfyUIApiError::ApiError {
                status,
                body: "history unavailable".to_string(),
            }),
            None => Ok(HistoryResponse::new()),
        }
    }

    async fn ping(&self) -> Result<(), ComfyUIApiError> {
        Ok(())
    }
}

fn unavailable() -> ComfyUIApiError {
    ComfyUIApiError::ApiError {
        status: 502,
        body: "engine down".to_string(),
    }
}

/// What the client reports when a reply body is not the expected JSON.
pub fn decode_error() -> ComfyUIApiError {
    match serde_json::from_str::<serde_json::Value>("<html>busy</html>") {
        Err(e) => ComfyUIApiError::Decode(e),
        Ok(_) => unreachable!("markup is not JSON"),
    }
}

/// Queue snapshot in the engine's native tuple format.
pub fn queue_snapshot(running: &[&str], pending: &[&str]) -> QueueSnapshot {
    let entries = |ids: &[&str]| {
        ids.iter()
            .enumerate()
            .map(|(n, id)| match json!([n, id, {}, {}, ["17"]]) {
                serde_json::Value::Array(items) => QueueEntry::Tuple(items),
                other => QueueEntry::Opaque(other),
            })
            .collect()
    };
    QueueSnapshot {
        queue_running: entries(running),
        queue_pending: entries(pending),
    }
}

/// History response holding one entry whose save node carries inline images.
pub fn inline_history(task_id: &str, payloads: &[&str]) -> HistoryResponse {
    let images = payloads
        .iter()
        .map(|p| ImageRef {
            base64: Some(p.to_string()),
            ..Default::default()
        })
        .collect();
    let mut entry = HistoryEntry::default();
    entry.outputs.insert(
        "17".to_string(),
        NodeOutput {
            images: Some(images),
        },
    );
    HistoryResponse::from([(task_id.to_string(), entry)])
}

/// The bundled Flux template.
pub fn flux_template() -> WorkflowGraph {
    parse_template(include_str!("../../../workflows/flux_text_to_image.json")).unwrap()
}
