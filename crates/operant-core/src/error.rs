//! Error types shared across the engine

use thiserror::Error;

use crate::ComponentKind;

/// Core errors: component binding and I/O at the edges of the engine
#[derive(Error, Debug)]
pub enum CoreError {
    // Component errors
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Component {id} is a {actual}, expected {expected}")]
    ComponentKindMismatch {
        id: String,
        expected: ComponentKind,
        actual: ComponentKind,
    },

    #[error("Component {id} failed: {reason}")]
    ComponentFailed { id: String, reason: String },

    #[error("Source {source_name} cannot provide {kind} components")]
    UnsupportedComponent {
        source_name: String,
        kind: ComponentKind,
    },

    // Logger errors
    #[error("Logger {logger} failed: {reason}")]
    LoggerFailed { logger: String, reason: String },

    #[error("Logger {0} is not started")]
    LoggerNotStarted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
