use std::sync::Arc;

use fluxgen_pipeline::service::GenerationService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Generation orchestration: binding, admission, submission, resolution.
    pub service: Arc<GenerationService>,
}
