pub mod admission;
pub mod fallback;
pub mod materialize;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod store;
pub mod submit;

#[cfg(test)]
mod testing;
