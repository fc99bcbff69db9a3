#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use fluxgen_api::config::ServerConfig;
use fluxgen_api::router::build_app_router;
use fluxgen_api::state::AppState;
use fluxgen_comfyui::api::ComfyUIApiError;
use fluxgen_comfyui::engine::Engine;
use fluxgen_comfyui::messages::{HistoryResponse, QueueSnapshot, SubmitResponse};
use fluxgen_core::workflow::{load_template, WorkflowGraph};
use fluxgen_pipeline::service::GenerationService;
use fluxgen_pipeline::store::InMemoryTaskStore;

// ---------------------------------------------------------------------------
// Engine double
// ---------------------------------------------------------------------------

/// ComfyUI stand-in driven by raw JSON, the way the real server answers.
pub struct TestEngine {
    queue: Mutex<Option<Value>>,
    prompt_id: Mutex<Option<String>>,
    history: Mutex<HashMap<String, Value>>,
    healthy: AtomicBool,
    pub submitted: Mutex<Vec<WorkflowGraph>>,
    pub queue_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl TestEngine {
    /// Empty queue, healthy, next submission becomes `task-1`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(Some(json!({ "queue_running": [], "queue_pending": [] }))),
            prompt_id: Mutex::new(Some("task-1".to_string())),
            history: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            submitted: Mutex::new(Vec::new()),
            queue_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_queue(&self, running: &[&str], pending: &[&str]) {
        let entries = |ids: &[&str]| -> Vec<Value> {
            ids.iter()
                .enumerate()
                .map(|(n, id)| json!([n, id, {}, {}, ["17"]]))
                .collect()
        };
        *self.queue.lock().unwrap() = Some(json!({
            "queue_running": entries(running),
            "queue_pending": entries(pending),
        }));
    }

    /// Make `/queue` fail as if ComfyUI were down.
    pub fn break_queue(&self) {
        *self.queue.lock().unwrap() = None;
    }

    /// Make `/queue` answer with a body that is not a queue snapshot.
    pub fn garble_queue(&self) {
        *self.queue.lock().unwrap() = Some(json!("<html>busy</html>"));
    }

    pub fn set_prompt_id(&self, prompt_id: Option<&str>) {
        *self.prompt_id.lock().unwrap() = prompt_id.map(str::to_string);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Record a finished task whose save node produced inline images.
    pub fn complete_inline(&self, task_id: &str, payloads: &[&str]) {
        let images: Vec<Value> = payloads.iter().map(|p| json!({ "base64": p })).collect();
        self.set_history(task_id, json!({ "outputs": { "17": { "images": images } } }));
    }

    pub fn set_history(&self, task_id: &str, entry: Value) {
        self.history
            .lock()
            .unwrap()
            .insert(task_id.to_string(), entry);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn engine_down() -> ComfyUIApiError {
    ComfyUIApiError::ApiError {
        status: 502,
        body: "bad gateway".to_string(),
    }
}

#[async_trait]
impl Engine for TestEngine {
    async fn queue(&self) -> Result<QueueSnapshot, ComfyUIApiError> {
        self.queue_calls.fetch_add(1, Ordering::SeqCst);
        let raw = self.queue.lock().unwrap().clone().ok_or_else(engine_down)?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn submit(&self, workflow: &WorkflowGraph) -> Result<SubmitResponse, ComfyUIApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(workflow.clone());
        let prompt_id = self.prompt_id.lock().unwrap().clone();
        Ok(serde_json::from_value(json!({ "prompt_id": prompt_id, "number": 1 }))?)
    }

    async fn history(&self, task_id: &str) -> Result<HistoryResponse, ComfyUIApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let mut body = serde_json::Map::new();
        if let Some(entry) = self.history.lock().unwrap().get(task_id) {
            body.insert(task_id.to_string(), entry.clone());
        }
        Ok(serde_json::from_value(Value::Object(body))?)
    }

    async fn ping(&self) -> Result<(), ComfyUIApiError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(engine_down())
        }
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub fn template_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../workflows/flux_text_to_image.json")
}

/// Build a test `ServerConfig` with safe defaults.
///
/// Result retries use a 1 ms unit so not-found paths finish quickly.
pub fn test_config(output_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        comfyui_url: "http://comfyui.invalid".to_string(),
        output_dir: output_dir.to_path_buf(),
        workflow_file: template_path(),
        max_queue_size: 5,
        result_retry_attempts: 3,
        result_retry_unit_ms: 1,
        task_ttl_secs: 3600,
        task_eviction_interval_secs: 300,
    }
}

/// Build the full application router with all middleware layers on top of
/// the given engine double.
pub fn build_test_app(engine: Arc<TestEngine>, output_dir: &Path) -> Router {
    let config = test_config(output_dir);
    let template = load_template(&config.workflow_file).unwrap();
    let service = GenerationService::new(
        engine,
        template,
        Arc::new(InMemoryTaskStore::new()),
        config.generation_config(),
    )
    .unwrap();

    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::new(service),
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    post_raw(app, uri, Some("application/json"), body.to_string()).await
}

pub async fn post_raw(
    app: Router,
    uri: &str,
    content_type: Option<&str>,
    body: impl Into<String>,
) -> Response {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header(CONTENT_TYPE, ct);
    }
    app.oneshot(builder.body(Body::from(body.into())).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
