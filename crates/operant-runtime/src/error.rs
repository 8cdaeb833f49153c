//! Runtime errors

use operant_core::{ChamberId, CoreError};
use operant_task::TaskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    // Lifecycle errors
    #[error("Chamber {0} already holds a task")]
    ChamberOccupied(ChamberId),

    #[error("Chamber {0} holds no task")]
    UnknownChamber(ChamberId),

    #[error("Chamber {0} is being removed")]
    ChamberRemoving(ChamberId),

    #[error("Chamber {chamber} is outside the {cells} cells of the layout")]
    ChamberOutOfRange { chamber: ChamberId, cells: u32 },

    #[error("Removal of chamber {0} panicked")]
    RemovalPanicked(ChamberId),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    // Wrapped errors
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Presentation error: {0}")]
    Draw(String),

    #[error("Failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
