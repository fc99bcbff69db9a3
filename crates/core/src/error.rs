use std::fmt;

/// Why the generation service could not serve a request right now.
///
/// All causes surface to clients identically (503); the distinction only
/// shows up in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableCause {
    /// The engine already has `size` tasks running or pending.
    QueueFull { size: usize, max: usize },
    /// The engine queue could not be read (unreachable or malformed reply).
    StatusCheckFailed(String),
    /// A submission or result query to the engine failed.
    Engine(String),
}

impl fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { size, max } => write!(f, "engine queue is full ({size}/{max})"),
            Self::StatusCheckFailed(msg) => write!(f, "engine status check failed: {msg}"),
            Self::Engine(msg) => write!(f, "engine communication failed: {msg}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(UnavailableCause),

    #[error("Internal error: {0}")]
    Internal(String),
}
