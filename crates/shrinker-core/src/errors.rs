use crate::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilationError {
    /// A pipeline bug, such as a body left behind the lens head
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Unsupported input: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, CompilationError>;
