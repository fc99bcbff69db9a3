//! Route definitions for image generation.
//!
//! ```text
//! POST   /generate        generate
//! GET    /result          get_result
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generation::generate))
        .route("/result", get(generation::get_result))
}
