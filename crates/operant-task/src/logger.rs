//! File event loggers
//!
//! One file per chamber session, named `chamber{n}_{subject}_{task}` inside the
//! output folder. The file is truncated on every `start`, so restarting a
//! chamber begins a fresh log.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use operant_core::{CoreError, CoreResult, Event, EventKind, EventLogger, TaskMetadata};
use serde::{Deserialize, Serialize};

/// On-disk layout of a file logger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// One JSON object per event
    #[serde(rename = "jsonl")]
    JsonLines,
    /// Comma-separated rows with a header
    #[serde(rename = "csv")]
    Csv,
}

impl LogFormat {
    pub fn extension(self) -> &'static str {
        match self {
            LogFormat::JsonLines => "jsonl",
            LogFormat::Csv => "csv",
        }
    }
}

const CSV_HEADER: &str = "time,type,state,component,change,metadata";

/// Event logger writing to a file on disk
pub struct FileEventLogger {
    name: String,
    folder: PathBuf,
    stem: String,
    format: LogFormat,
    writer: Option<BufWriter<File>>,
}

impl FileEventLogger {
    pub fn new(folder: impl Into<PathBuf>, stem: impl Into<String>, format: LogFormat) -> Self {
        let stem = stem.into();
        FileEventLogger {
            name: format!("{}:{}", format.extension(), stem),
            folder: folder.into(),
            stem,
            format,
            writer: None,
        }
    }

    /// Logger for `task` running with `metadata`
    pub fn for_task(
        folder: impl Into<PathBuf>,
        metadata: &TaskMetadata,
        task: &str,
        format: LogFormat,
    ) -> Self {
        let stem = format!(
            "chamber{}_{}_{}",
            metadata.chamber.index(),
            metadata.subject,
            task
        );
        Self::new(folder, stem, format)
    }

    pub fn path(&self) -> PathBuf {
        self.folder
            .join(format!("{}.{}", self.stem, self.format.extension()))
    }

    fn write_event(writer: &mut BufWriter<File>, format: LogFormat, event: &Event) -> CoreResult<()> {
        match format {
            LogFormat::JsonLines => {
                serde_json::to_writer(&mut *writer, event)?;
                writer.write_all(b"\n")?;
            }
            LogFormat::Csv => {
                let (kind, state, component, change) = match &event.kind {
                    EventKind::Input { component, change } => {
                        ("input", "", component.as_str(), change.to_string())
                    }
                    EventKind::State { state } => ("state", *state, "", String::new()),
                    EventKind::FinalState { state, .. } => ("final_state", *state, "", String::new()),
                };
                let metadata = if event.metadata.is_empty() {
                    String::new()
                } else {
                    csv_field(&serde_json::to_string(&event.metadata)?)
                };
                writeln!(
                    writer,
                    "{:.6},{kind},{state},{},{change},{metadata}",
                    event.time.as_secs_f64(),
                    csv_field(component),
                )?;
            }
        }
        Ok(())
    }
}

/// Quote a field when it holds a separator or quote
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

impl EventLogger for FileEventLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> CoreResult<()> {
        fs::create_dir_all(&self.folder)?;
        if let Some(mut previous) = self.writer.take() {
            previous.flush()?;
        }
        let mut writer = BufWriter::new(File::create(self.path())?);
        if self.format == LogFormat::Csv {
            writeln!(writer, "{CSV_HEADER}")?;
            writer.flush()?;
        }
        self.writer = Some(writer);
        tracing::debug!(logger = %self.name, path = %self.path().display(), "log file opened");
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.writer.is_some()
    }

    fn log_events(&mut self, events: &[Event]) -> CoreResult<()> {
        let format = self.format;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CoreError::LoggerNotStarted(self.name.clone()))?;
        for event in events {
            Self::write_event(writer, format, event)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operant_core::{metadata, ChamberId, InputChange, Metadata, TaskTime};

    fn events() -> Vec<Event> {
        vec![
            Event::state("INITIATION", TaskTime::ZERO, Metadata::new()),
            Event::input("food_trough", InputChange::Entered, TaskTime::from_millis(1500)),
            Event::state(
                "POST_RESPONSE_INTERVAL",
                TaskTime::from_millis(2000),
                metadata([("response", "correct")]),
            ),
        ]
    }

    fn logger(dir: &tempfile::TempDir, format: LogFormat) -> FileEventLogger {
        let md = TaskMetadata::new(ChamberId::new(2), "rat07");
        FileEventLogger::for_task(dir.path().join("out"), &md, "FiveChoice", format)
    }

    #[test]
    fn test_file_name_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir, LogFormat::Csv);
        assert_eq!(
            logger.path(),
            dir.path().join("out").join("chamber2_rat07_FiveChoice.csv")
        );
    }

    #[test]
    fn test_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(&dir, LogFormat::JsonLines);
        assert!(!logger.is_started());
        logger.start().unwrap();
        logger.log_events(&events()).unwrap();
        logger.log_events(&[]).unwrap();
        logger.close().unwrap();

        let text = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["component"], "food_trough");
        assert_eq!(lines[2]["metadata"]["response"], "correct");
    }

    #[test]
    fn test_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(&dir, LogFormat::Csv);
        logger.start().unwrap();
        logger.log_events(&events()).unwrap();
        logger.close().unwrap();

        let text = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "0.000000,state,INITIATION,,,");
        assert_eq!(lines[2], "1.500000,input,,food_trough,entered,");
        assert_eq!(
            lines[3],
            r#"2.000000,state,POST_RESPONSE_INTERVAL,,,"{""response"":""correct""}""#
        );
    }

    #[test]
    fn test_restart_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(&dir, LogFormat::JsonLines);
        logger.start().unwrap();
        logger.log_events(&events()).unwrap();
        logger.start().unwrap();
        logger.log_events(&events()[..1]).unwrap();
        logger.close().unwrap();
        let text = fs::read_to_string(logger.path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_log_before_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(&dir, LogFormat::Csv);
        assert!(matches!(
            logger.log_events(&events()),
            Err(CoreError::LoggerNotStarted(_))
        ));
    }
}
