//! Domain core for the fluxgen image-generation service.
//!
//! Pure, synchronous building blocks: the error taxonomy, request
//! parameters, the typed workflow graph and the parameter binder.

pub mod binder;
pub mod error;
pub mod params;
pub mod types;
pub mod workflow;
