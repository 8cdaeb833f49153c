//! Workstation configuration
//!
//! Loaded from TOML. Everything is validated before the first chamber is
//! added, so a bad entry never leaves the workstation half configured.

use std::collections::BTreeSet;
use std::path::PathBuf;

use operant_core::{ChamberId, ComponentKind, Metadata, TaskMetadata};
use operant_task::{LogFormat, Protocol, TaskRegistry};
use serde::{Deserialize, Serialize};

use crate::{ChamberLayout, RuntimeError, RuntimeResult};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkstationConfig {
    /// Target logic ticks per second
    #[serde(default = "default_logic_rate")]
    pub logic_rate_hz: f64,
    /// Presentation frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate_hz: f64,
    #[serde(default)]
    pub display: DisplayConfig,
    /// Number of chamber cells on the display
    #[serde(default = "default_chambers")]
    pub chambers: u32,
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
    /// Sessions to add at startup
    #[serde(default, rename = "chamber")]
    pub sessions: Vec<ChamberConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: 1280,
            height: 720,
        }
    }
}

/// One chamber session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChamberConfig {
    pub chamber: u32,
    pub task: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub loggers: Vec<LoggerConfig>,
    /// Explicit bindings; components the task needs but not listed here are
    /// bound to the empty source
    #[serde(default)]
    pub components: Vec<BindingConfig>,
    /// Extra metadata attached to the session
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct LoggerConfig {
    pub kind: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    pub id: String,
    pub kind: ComponentKind,
    pub source: String,
    pub address: Option<String>,
}

fn default_logic_rate() -> f64 {
    500.0
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_chambers() -> u32 {
    1
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("output")
}

fn default_subject() -> String {
    "default".to_string()
}

impl Default for WorkstationConfig {
    fn default() -> Self {
        WorkstationConfig {
            logic_rate_hz: default_logic_rate(),
            frame_rate_hz: default_frame_rate(),
            display: DisplayConfig::default(),
            chambers: default_chambers(),
            output_folder: default_output_folder(),
            sessions: Vec::new(),
        }
    }
}

impl WorkstationConfig {
    pub fn from_toml(text: &str) -> RuntimeResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn layout(&self) -> ChamberLayout {
        ChamberLayout::compute(self.display.width, self.display.height, self.chambers)
    }

    /// Check every session against the task registry and known sources
    pub fn validate(&self, tasks: &TaskRegistry, sources: &[&str]) -> RuntimeResult<()> {
        if !(self.logic_rate_hz >= 0.0) || !(self.frame_rate_hz >= 0.0) {
            return Err(RuntimeError::Config(
                "loop rates must be non-negative".to_string(),
            ));
        }
        if self.chambers == 0 {
            return Err(RuntimeError::Config("chambers must be at least 1".to_string()));
        }

        let mut seen = BTreeSet::new();
        for session in &self.sessions {
            if !seen.insert(session.chamber) {
                return Err(RuntimeError::Config(format!(
                    "{:?} is configured twice",
                    session.chamber_id()
                )));
            }
            self.validate_session(session, tasks, sources)?;
        }
        Ok(())
    }

    /// Check one session: chamber range, task, protocol and bindings
    pub fn validate_session(
        &self,
        session: &ChamberConfig,
        tasks: &TaskRegistry,
        sources: &[&str],
    ) -> RuntimeResult<()> {
        let chamber = session.chamber_id();
        if session.chamber >= self.chambers {
            return Err(RuntimeError::Config(format!(
                "{chamber:?} is outside the {} configured chambers",
                self.chambers
            )));
        }
        tasks.validate(&session.task, &session.protocol)?;

        let required = tasks.components(&session.task)?;
        for binding in &session.components {
            if !sources.contains(&binding.source.as_str()) {
                return Err(RuntimeError::UnknownSource(binding.source.clone()));
            }
            if let Some((_, kind)) = required.iter().find(|(id, _)| *id == binding.id) {
                if *kind != binding.kind {
                    return Err(RuntimeError::Config(format!(
                        "{chamber:?}: component {} is bound as {}, task {} needs {}",
                        binding.id, binding.kind, session.task, kind
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ChamberConfig {
    /// A session of `task` with the default subject, protocol and no loggers
    pub fn new(chamber: u32, task: impl Into<String>) -> Self {
        ChamberConfig {
            chamber,
            task: task.into(),
            subject: default_subject(),
            protocol: Protocol::default(),
            loggers: Vec::new(),
            components: Vec::new(),
            metadata: Metadata::default(),
        }
    }

    pub fn chamber_id(&self) -> ChamberId {
        ChamberId::new(self.chamber)
    }

    pub fn task_metadata(&self) -> TaskMetadata {
        let mut metadata = TaskMetadata::new(self.chamber_id(), self.subject.clone());
        metadata.extra = self.metadata.clone();
        metadata
    }

    pub fn binding(&self, id: &str) -> Option<&BindingConfig> {
        self.components.iter().find(|b| b.id == id)
    }
}
