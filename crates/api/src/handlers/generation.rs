//! Handlers for image generation.
//!
//! Routes:
//! - `POST /generate`                 submit a prompt, returns `{task_id, seed}`
//! - `GET  /result?task_id=...`       poll for completion

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use fluxgen_core::params::GenerateRequest;
use fluxgen_pipeline::resolver::TaskResult;
use fluxgen_pipeline::submit::SubmittedTask;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Query string of `GET /result`.
#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub task_id: Option<String>,
    /// Client cache-buster; logged, otherwise ignored.
    #[serde(rename = "_t")]
    pub request_tag: Option<String>,
}

/// POST /generate
///
/// Malformed JSON, a non-JSON content type, and an empty body all surface
/// as 400 with the extractor's explanation.
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Json<SubmittedTask>> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Rejected generate body");
        AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let task = state.service.generate(request).await?;
    Ok(Json(task))
}

/// GET /result
pub async fn get_result(
    State(state): State<AppState>,
    query: Result<Query<ResultQuery>, QueryRejection>,
) -> AppResult<Json<TaskResult>> {
    let Query(query) = query.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let task_id = query
        .task_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("task_id is required".to_string()))?;

    tracing::debug!(task_id = %task_id, request_tag = ?query.request_tag, "Result poll");

    let result = state.service.result(&task_id).await?;
    Ok(Json(result))
}
