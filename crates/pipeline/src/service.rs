//! Generation service: the single entry point the HTTP layer talks to.
//!
//! `generate` binds, admits and submits; `result` consults the task store
//! and falls back to the resolver for anything not yet completed.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use fluxgen_comfyui::engine::Engine;
use fluxgen_core::binder::{bind_workflow, validate_template, WorkflowLayout};
use fluxgen_core::error::CoreError;
use fluxgen_core::params::GenerateRequest;
use fluxgen_core::workflow::WorkflowGraph;

use crate::admission::AdmissionController;
use crate::materialize::ImageMaterializer;
use crate::resolver::{ResultResolver, TaskResult};
use crate::retry::RetryConfig;
use crate::store::{TaskRecord, TaskStore};
use crate::submit::{SubmittedTask, TaskSubmitter};

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_queue_size: usize,
    pub output_dir: PathBuf,
    pub retry: RetryConfig,
    pub task_ttl: Duration,
    pub layout: WorkflowLayout,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 5,
            output_dir: PathBuf::from("./output"),
            retry: RetryConfig::default(),
            task_ttl: Duration::hours(1),
            layout: WorkflowLayout::default(),
        }
    }
}

pub struct GenerationService {
    engine: Arc<dyn Engine>,
    template: WorkflowGraph,
    layout: WorkflowLayout,
    admission: AdmissionController,
    submitter: TaskSubmitter,
    resolver: ResultResolver,
    store: Arc<dyn TaskStore>,
    max_queue_size: usize,
    task_ttl: Duration,
}

impl GenerationService {
    /// Build the service. The template is checked against the layout here,
    /// once, so requests never see a malformed template.
    pub fn new(
        engine: Arc<dyn Engine>,
        template: WorkflowGraph,
        store: Arc<dyn TaskStore>,
        config: GenerationConfig,
    ) -> Result<Self, CoreError> {
        validate_template(&template, &config.layout)?;

        let materializer = ImageMaterializer::new(config.output_dir);
        Ok(Self {
            admission: AdmissionController::new(engine.clone(), config.max_queue_size),
            submitter: TaskSubmitter::new(engine.clone()),
            resolver: ResultResolver::new(
                engine.clone(),
                materializer,
                config.retry,
                config.layout.save_node.clone(),
            ),
            engine,
            template,
            layout: config.layout,
            store,
            max_queue_size: config.max_queue_size,
            task_ttl: config.task_ttl,
        })
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Validate, bind, admit, submit. Nothing reaches the engine until the
    /// parameters and the bound workflow are known good.
    pub async fn generate(&self, request: GenerateRequest) -> Result<SubmittedTask, CoreError> {
        let params = request.into_parameters(self.max_queue_size)?;
        let workflow = bind_workflow(&params, &self.template, &self.layout)?;

        self.admission.admit().await?;
        let task = self.submitter.submit(&workflow, params.seed).await?;

        self.store
            .put(TaskRecord::pending(
                task.task_id.clone(),
                Some(task.seed),
                Utc::now(),
                self.task_ttl,
            ))
            .await;

        Ok(task)
    }

    /// Current state of a task. Completed results are served from the store
    /// on every later poll.
    pub async fn result(&self, task_id: &str) -> Result<TaskResult, CoreError> {
        if task_id.is_empty() {
            return Err(CoreError::Validation("task_id is required".to_string()));
        }

        if let Some(record) = self.store.get(task_id).await {
            if record.is_completed() {
                tracing::debug!(task_id, "Serving cached result");
                return Ok(TaskResult::Completed {
                    images: record.images,
                    error_message: record.error,
                });
            }
        }

        match self.resolver.resolve(task_id).await {
            Ok(TaskResult::Completed {
                images,
                error_message,
            }) => {
                let record = self.record_for(task_id).await;
                let stored = self
                    .store
                    .complete(record.completed(images, error_message))
                    .await;
                Ok(TaskResult::Completed {
                    images: stored.images,
                    error_message: stored.error,
                })
            }
            Ok(TaskResult::Pending) => Ok(TaskResult::Pending),
            Err(e @ CoreError::NotFound { .. }) => {
                if let Some(record) = self.store.get(task_id).await {
                    self.store.put(record.failed(e.to_string())).await;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the engine answers at all.
    pub async fn engine_healthy(&self) -> bool {
        match self.engine.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Engine health probe failed");
                false
            }
        }
    }

    async fn record_for(&self, task_id: &str) -> TaskRecord {
        match self.store.get(task_id).await {
            Some(record) => record,
            None => TaskRecord::pending(task_id, None, Utc::now(), self.task_ttl),
        }
    }
}
