//! Workflow submission.

use std::sync::Arc;
use std::time::Instant;

use fluxgen_comfyui::api::ComfyUIApiError;
use fluxgen_comfyui::engine::Engine;
use fluxgen_core::error::{CoreError, UnavailableCause};
use fluxgen_core::types::TaskId;
use fluxgen_core::workflow::WorkflowGraph;
use serde::Serialize;

/// What the client gets back from `POST /generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedTask {
    /// Engine-issued identifier, used as the polling key.
    pub task_id: TaskId,
    /// The seed that was requested (client-supplied or generated).
    pub seed: u32,
}

/// Posts bound workflows to the engine. Failures are surfaced, not retried.
pub struct TaskSubmitter {
    engine: Arc<dyn Engine>,
}

impl TaskSubmitter {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub async fn submit(&self, workflow: &WorkflowGraph, seed: u32) -> Result<SubmittedTask, CoreError> {
        let started = Instant::now();

        let response = self.engine.submit(workflow).await.map_err(|e| match e {
            ComfyUIApiError::Decode(err) => CoreError::Validation(format!(
                "Engine returned an unreadable submission response: {err}"
            )),
            other => {
                tracing::error!(error = %other, timeout = other.is_timeout(), "Engine communication failed");
                CoreError::Unavailable(UnavailableCause::Engine(other.to_string()))
            }
        })?;

        let task_id = response
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                CoreError::Validation("Engine response did not include a task id".to_string())
            })?;

        tracing::info!(
            task_id = %task_id,
            seed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Task submitted",
        );

        Ok(SubmittedTask { task_id, seed })
    }
}
