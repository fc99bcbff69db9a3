//! Admission control against the engine's queue depth.
//!
//! Called once per generation request, before submission. Never retried.

use std::sync::Arc;

use fluxgen_comfyui::engine::Engine;
use fluxgen_core::error::{CoreError, UnavailableCause};

/// Rejects new work while the engine already holds `max_queue_size` tasks.
pub struct AdmissionController {
    engine: Arc<dyn Engine>,
    max_queue_size: usize,
}

impl AdmissionController {
    pub fn new(engine: Arc<dyn Engine>, max_queue_size: usize) -> Self {
        Self {
            engine,
            max_queue_size,
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Check the engine queue and admit or reject.
    ///
    /// Returns the current `running + pending` count on admission.
    pub async fn admit(&self) -> Result<usize, CoreError> {
        let snapshot = self.engine.queue().await.map_err(|e| {
            tracing::error!(error = %e, "Engine queue status check failed");
            CoreError::Unavailable(UnavailableCause::StatusCheckFailed(e.to_string()))
        })?;

        let size = snapshot.len();
        if size >= self.max_queue_size {
            tracing::warn!(
                size,
                max = self.max_queue_size,
                "Engine queue is full, rejecting request",
            );
            return Err(CoreError::Unavailable(UnavailableCause::QueueFull {
                size,
                max: self.max_queue_size,
            }));
        }

        tracing::debug!(size, max = self.max_queue_size, "Request admitted");
        Ok(size)
    }
}
