//! Operator console
//!
//! Line commands read from stdin while the workstation runs. End of input
//! closes the console; the workstation keeps running until Ctrl-C.

use std::fmt;

use operant_core::ChamberId;
use operant_runtime::{
    ChamberConfig, LoggerConfig, RuntimeError, RuntimeResult, SessionLoader, StatusBoard,
};
use operant_task::LogFormat;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Add a session; without a task, the chamber's configured one
    Add {
        chamber: ChamberId,
        task: Option<String>,
        subject: Option<String>,
    },
    Start(ChamberId),
    Stop(ChamberId),
    Pause(ChamberId),
    Resume(ChamberId),
    Remove(ChamberId),
    Status,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const HELP: &str = "commands: add N [TASK [SUBJECT]] | start N | stop N | pause N | resume N | \
remove N | status | help | quit";

pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| ParseError("empty command".to_string()))?;
    let chamber = |arg: Option<&str>| -> Result<ChamberId, ParseError> {
        let arg = arg.ok_or_else(|| ParseError(format!("{verb} needs a chamber number")))?;
        arg.parse::<u32>()
            .map(ChamberId::new)
            .map_err(|_| ParseError(format!("not a chamber number: {arg}")))
    };
    let command = match verb {
        "add" => Command::Add {
            chamber: chamber(words.next())?,
            task: words.next().map(str::to_string),
            subject: words.next().map(str::to_string),
        },
        "start" => Command::Start(chamber(words.next())?),
        "stop" => Command::Stop(chamber(words.next())?),
        "pause" => Command::Pause(chamber(words.next())?),
        "resume" => Command::Resume(chamber(words.next())?),
        "remove" => Command::Remove(chamber(words.next())?),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError(format!("unknown command: {other}"))),
    };
    if let Some(extra) = words.next() {
        return Err(ParseError(format!("unexpected argument: {extra}")));
    }
    Ok(command)
}

/// The session `add` builds
///
/// Starts from the chamber's configured session when there is one. Naming a
/// different task resets the protocol to the task's defaults. A chamber with
/// no configured session gets a JSON-lines logger.
pub fn session_for(
    loader: &SessionLoader,
    chamber: ChamberId,
    task: Option<String>,
    subject: Option<String>,
) -> RuntimeResult<ChamberConfig> {
    let mut session = match (loader.configured(chamber), task) {
        (Some(configured), None) => configured.clone(),
        (Some(configured), Some(task)) => {
            let mut session = configured.clone();
            if session.task != task {
                session.task = task;
                session.protocol = Default::default();
            }
            session
        }
        (None, Some(task)) => {
            let mut session = ChamberConfig::new(chamber.index(), task);
            session.loggers.push(LoggerConfig {
                kind: LogFormat::JsonLines,
            });
            session
        }
        (None, None) => {
            return Err(RuntimeError::Config(format!(
                "chamber {chamber} has no configured session; name a task"
            )))
        }
    };
    if let Some(subject) = subject {
        session.subject = subject;
    }
    Ok(session)
}

fn execute(loader: &SessionLoader, board: &StatusBoard, command: Command) -> RuntimeResult<()> {
    let manager = loader.manager();
    match command {
        Command::Add {
            chamber,
            task,
            subject,
        } => {
            let session = session_for(loader, chamber, task, subject)?;
            loader.add_session(&session, board.presentation(), Vec::new())?;
            println!(
                "chamber {chamber}: {} for {} added; start {chamber} to run it",
                session.task, session.subject
            );
            Ok(())
        }
        Command::Start(chamber) => manager.start(chamber),
        Command::Stop(chamber) => manager.stop(chamber),
        Command::Pause(chamber) => manager.pause(chamber),
        Command::Resume(chamber) => manager.resume(chamber),
        Command::Remove(chamber) => {
            // Completion is reported through the notice channel
            let handle = manager.remove(chamber, true)?;
            if handle.is_noop() {
                println!("chamber {chamber} is already being removed");
            }
            Ok(())
        }
        Command::Status => {
            for chamber in manager.chambers() {
                match board.line(chamber) {
                    Some(line) => println!("{line}"),
                    None => println!("chamber {chamber} (no frame yet)"),
                }
            }
            Ok(())
        }
        Command::Help | Command::Quit => {
            println!("{HELP}");
            Ok(())
        }
    }
}

pub async fn run(loader: SessionLoader, board: StatusBoard, quit: mpsc::Sender<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(%error, "console input failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse(&line) {
            Ok(Command::Quit) => {
                let _ = quit.send(()).await;
                return;
            }
            Ok(command) => {
                if let Err(error) = execute(&loader, &board, command) {
                    println!("{error}");
                }
            }
            Err(error) => println!("{error}; {HELP}"),
        }
    }
    tracing::debug!("console closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use operant_runtime::{Workstation, WorkstationConfig};

    #[test]
    fn test_parse_chamber_commands() {
        assert_eq!(parse("start 2"), Ok(Command::Start(ChamberId(2))));
        assert_eq!(parse("  remove   0 "), Ok(Command::Remove(ChamberId(0))));
        assert_eq!(parse("status"), Ok(Command::Status));
        assert_eq!(parse("exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_add() {
        assert_eq!(
            parse("add 1"),
            Ok(Command::Add {
                chamber: ChamberId(1),
                task: None,
                subject: None
            })
        );
        assert_eq!(
            parse("add 3 Habituation rat12"),
            Ok(Command::Add {
                chamber: ChamberId(3),
                task: Some("Habituation".to_string()),
                subject: Some("rat12".to_string())
            })
        );
        assert!(parse("add").is_err());
        assert!(parse("add 1 Habituation rat12 again").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse("start").is_err());
        assert!(parse("stop two").is_err());
        assert!(parse("status now").is_err());
        assert!(parse("launch 1").is_err());
    }

    #[test]
    fn test_add_builds_sessions_from_configuration() {
        let config =
            WorkstationConfig::from_toml(include_str!("../workstation.example.toml")).unwrap();
        let workstation = Workstation::builder(config).start().unwrap();
        let loader = workstation.loader();
        let board = StatusBoard::new();

        let configured = session_for(&loader, ChamberId(1), None, None).unwrap();
        assert_eq!(configured.task, "Habituation");
        assert_eq!(configured.subject, "rat02");
        assert!(!configured.protocol.is_empty());

        let switched = session_for(
            &loader,
            ChamberId(1),
            Some("FiveChoice".to_string()),
            Some("rat09".to_string()),
        )
        .unwrap();
        assert!(switched.protocol.is_empty());
        assert_eq!(switched.subject, "rat09");
        assert!(session_for(&loader, ChamberId(3), None, None).is_err());

        execute(&loader, &board, parse("add 3 Habituation rat04").unwrap()).unwrap();
        execute(&loader, &board, parse("add 1").unwrap()).unwrap();
        assert_eq!(loader.manager().chambers(), vec![ChamberId(1), ChamberId(3)]);
        assert!(execute(&loader, &board, parse("add 1").unwrap()).is_err());
        assert!(execute(&loader, &board, parse("add 9 Habituation").unwrap()).is_err());

        workstation.shutdown().unwrap();
    }
}
