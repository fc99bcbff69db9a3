//! Result resolution across engine history, live queue, and output files.
//!
//! Resolution order for a polled task:
//!
//! 1. engine history (hit means completed),
//! 2. live queue membership (running or pending means pending),
//! 3. a scan of the output directory for files carrying the task id,
//! 4. a bounded linear-backoff re-check of history,
//! 5. otherwise not found.

use std::fmt;
use std::sync::Arc;

use fluxgen_comfyui::api::ComfyUIApiError;
use fluxgen_comfyui::engine::Engine;
use fluxgen_comfyui::messages::{HistoryEntry, QueuePosition};
use fluxgen_core::error::{CoreError, UnavailableCause};
use serde::Serialize;

use crate::fallback::find_task_files;
use crate::materialize::ImageMaterializer;
use crate::retry::{retry_linear, RetryConfig};

/// Where in the resolution sequence a task ended up. Logged only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Unknown,
    HistoryHit,
    QueueRunning,
    QueuePending,
    NotFoundRetry,
    NotFoundFinal,
}

impl fmt::Display for ResolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::HistoryHit => "history-hit",
            Self::QueueRunning => "queue-running",
            Self::QueuePending => "queue-pending",
            Self::NotFoundRetry => "not-found-retry",
            Self::NotFoundFinal => "not-found-final",
        };
        f.write_str(s)
    }
}

/// Client-visible outcome of a poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Pending,
    Completed {
        images: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

impl TaskResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

pub struct ResultResolver {
    engine: Arc<dyn Engine>,
    materializer: ImageMaterializer,
    retry: RetryConfig,
    save_node: String,
}

impl ResultResolver {
    pub fn new(
        engine: Arc<dyn Engine>,
        materializer: ImageMaterializer,
        retry: RetryConfig,
        save_node: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            materializer,
            retry,
            save_node: save_node.into(),
        }
    }

    pub async fn resolve(&self, task_id: &str) -> Result<TaskResult, CoreError> {
        tracing::debug!(task_id, state = %ResolverState::Unknown, "Resolving task");

        let history = self
            .engine
            .history(task_id)
            .await
            .map_err(|e| engine_error("history", e))?;
        if let Some(entry) = history.get(task_id) {
            return Ok(self.from_history(task_id, entry).await);
        }

        let snapshot = self
            .engine
            .queue()
            .await
            .map_err(|e| engine_error("queue", e))?;
        match snapshot.position_of(task_id) {
            Some(QueuePosition::Running) => {
                tracing::debug!(task_id, state = %ResolverState::QueueRunning, "Task still running");
                return Ok(TaskResult::Pending);
            }
            Some(QueuePosition::Pending) => {
                tracing::debug!(task_id, state = %ResolverState::QueuePending, "Task still queued");
                return Ok(TaskResult::Pending);
            }
            None => {}
        }

        if let Some(images) = self.from_filesystem(task_id).await {
            return Ok(TaskResult::Completed {
                images,
                error_message: None,
            });
        }

        tracing::debug!(task_id, state = %ResolverState::NotFoundRetry, "Task not visible yet, retrying");
        let entry = retry_linear(&self.retry, |attempt| async move {
            match self.engine.history(task_id).await {
                Ok(mut history) => history.remove(task_id),
                Err(e) => {
                    tracing::warn!(task_id, attempt, error = %e, "History re-check failed");
                    None
                }
            }
        })
        .await;

        match entry {
            Some(entry) => Ok(self.from_history(task_id, &entry).await),
            None => {
                tracing::info!(task_id, state = %ResolverState::NotFoundFinal, "Task not found");
                Err(CoreError::NotFound {
                    entity: "Task",
                    id: task_id.to_string(),
                })
            }
        }
    }

    /// Materialize a history hit. Failures degrade to zero images.
    async fn from_history(&self, task_id: &str, entry: &HistoryEntry) -> TaskResult {
        tracing::debug!(task_id, state = %ResolverState::HistoryHit, "Task found in history");
        match self.materializer.materialize(task_id, entry).await {
            Ok(images) => TaskResult::Completed {
                images,
                error_message: None,
            },
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Image materialization failed");
                TaskResult::Completed {
                    images: Vec::new(),
                    error_message: Some(e.to_string()),
                }
            }
        }
    }

    async fn from_filesystem(&self, task_id: &str) -> Option<Vec<String>> {
        let dir = self.materializer.output_dir();
        let files = match find_task_files(dir, task_id).await {
            Ok(files) if !files.is_empty() => files,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(task_id, dir = %dir.display(), error = %e, "Output directory scan failed");
                return None;
            }
        };

        tracing::info!(task_id, count = files.len(), "Recovered task from output files");
        let entry = HistoryEntry::from_files(&self.save_node, files);
        match self.materializer.materialize(task_id, &entry).await {
            Ok(images) => Some(images),
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Output file materialization failed");
                None
            }
        }
    }
}

/// Engine failure during resolution: unreadable bodies are a validation
/// problem, everything else makes the service unavailable.
fn engine_error(endpoint: &'static str, e: ComfyUIApiError) -> CoreError {
    match e {
        ComfyUIApiError::Decode(err) => {
            CoreError::Validation(format!("Engine returned an unreadable {endpoint} response: {err}"))
        }
        other => {
            tracing::error!(endpoint, error = %other, "Engine query failed");
            CoreError::Unavailable(UnavailableCause::Engine(other.to_string()))
        }
    }
}
