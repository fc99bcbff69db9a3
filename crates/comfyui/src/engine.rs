//! The seam between orchestration and the rendering engine.
//!
//! The pipeline only talks to an [`Engine`]; [`ComfyUIApi`] is the real
//! implementation, tests substitute in-memory doubles.

use async_trait::async_trait;
use fluxgen_core::workflow::WorkflowGraph;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::messages::{HistoryResponse, QueueSnapshot, SubmitResponse};

/// Operations the orchestration layer needs from a rendering engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Current running and pending tasks.
    async fn queue(&self) -> Result<QueueSnapshot, ComfyUIApiError>;

    /// Queue a bound workflow for execution.
    async fn submit(&self, workflow: &WorkflowGraph) -> Result<SubmitResponse, ComfyUIApiError>;

    /// Completed-task record for `task_id`; empty while unfinished.
    async fn history(&self, task_id: &str) -> Result<HistoryResponse, ComfyUIApiError>;

    /// Whether the engine answers at all.
    async fn ping(&self) -> Result<(), ComfyUIApiError>;
}

#[async_trait]
impl Engine for ComfyUIApi {
    async fn queue(&self) -> Result<QueueSnapshot, ComfyUIApiError> {
        self.get_queue().await
    }

    async fn submit(&self, workflow: &WorkflowGraph) -> Result<SubmitResponse, ComfyUIApiError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        self.submit_workflow(workflow, &client_id).await
    }

    async fn history(&self, task_id: &str) -> Result<HistoryResponse, ComfyUIApiError> {
        self.get_history(task_id).await
    }

    async fn ping(&self) -> Result<(), ComfyUIApiError> {
        ComfyUIApi::ping(self).await
    }
}
