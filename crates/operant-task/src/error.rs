//! Task errors

use operant_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    // Configuration errors
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {task} has no constant named {key}")]
    UnknownConstant { task: &'static str, key: String },

    #[error("Invalid value for {task}.{key}: {reason}")]
    InvalidConstant {
        task: &'static str,
        key: String,
        reason: String,
    },

    #[error("Component error: {0}")]
    Component(#[from] CoreError),

    // Runtime errors
    #[error("Task fault: {0}")]
    Fault(String),

    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Result type for task operations
pub type TaskResult<T> = Result<T, TaskError>;
