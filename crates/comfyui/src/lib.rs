//! ComfyUI REST client library.
//!
//! Provides typed response parsing, the HTTP API wrapper and the
//! [`engine::Engine`] trait the orchestration layer is written against.

pub mod api;
pub mod engine;
pub mod messages;
