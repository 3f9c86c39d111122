use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Scene did not become ready within {0} seconds")]
    SceneLoadTimeout(u64),

    #[error("Target object not found in scene: {0}")]
    TargetNotFound(String),

    #[error("Planner returned a malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Vision service returned a malformed observation: {0}")]
    MalformedObservation(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether the remote signalled that the owning session has expired.
    /// The presentation boundary is allowed exactly one re-init-and-retry
    /// when this is true.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, AppError::SessionNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
