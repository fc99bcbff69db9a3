//! Request handlers.
//!
//! Handlers unpack the request, delegate to the generation service, and
//! map errors via [`AppError`](crate::error::AppError).

pub mod generation;
