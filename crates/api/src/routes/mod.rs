pub mod generation;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the client-facing route tree.
///
/// ```text
/// POST /generate          submit a generation request
/// GET  /result            poll a task (?task_id=...&_t=...)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(generation::router())
}
