//! Operant workstation
//!
//! Loads a workstation configuration, adds and starts its chambers, and runs
//! until Ctrl-C or the `quit` console command, then shuts down in order:
//! chambers stopped, chambers removed, loops halted, sources closed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use operant_runtime::{ChamberNotice, NoticeSink, StatusBoard, Workstation, WorkstationConfig};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod console;

/// Run behavioral tasks in one or more operant chambers
#[derive(Parser, Debug)]
#[command(name = "operant-workstation")]
#[command(version, about, long_about = None)]
struct Args {
    /// Workstation configuration (TOML)
    #[arg(short, long, value_name = "FILE", default_value = "workstation.toml")]
    config: PathBuf,

    /// Write event logs here instead of the configured folder
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Add the configured chambers without starting them
    #[arg(long)]
    no_start: bool,

    /// Seconds between status reports (0 disables them)
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    status_interval: u64,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn load_config(args: &Args) -> Result<WorkstationConfig> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let mut config = WorkstationConfig::from_toml(&text)
        .with_context(|| format!("parsing {}", args.config.display()))?;
    if let Some(output) = &args.output {
        config.output_folder = output.clone();
    }
    Ok(config)
}

async fn report_notices(mut notices: mpsc::UnboundedReceiver<ChamberNotice>, board: StatusBoard) {
    while let Some(notice) = notices.recv().await {
        match notice {
            ChamberNotice::Completed { chamber, task } => {
                tracing::info!(chamber = chamber.index(), task, "session complete")
            }
            ChamberNotice::Faulted {
                chamber,
                task,
                error,
            } => tracing::error!(chamber = chamber.index(), task, %error, "session faulted"),
            ChamberNotice::LoggerFailed {
                chamber,
                logger,
                error,
            } => tracing::error!(chamber = chamber.index(), %logger, %error, "event logger failed"),
            ChamberNotice::Removed { chamber } => {
                board.forget(chamber);
                tracing::info!(chamber = chamber.index(), "chamber removed");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    tracing::info!("operant workstation v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let (sink, notices) = NoticeSink::channel();
    let workstation = Workstation::builder(config)
        .notices(sink)
        .start()
        .context("starting workstation")?;

    let board = StatusBoard::new();
    let chambers = workstation
        .add_configured(|_| board.presentation())
        .context("adding configured chambers")?;
    if !args.no_start {
        for &chamber in &chambers {
            workstation
                .manager()
                .start(chamber)
                .with_context(|| format!("starting chamber {chamber}"))?;
        }
    }
    tracing::info!(chambers = chambers.len(), "sessions ready");

    tokio::spawn(report_notices(notices, board.clone()));
    let (quit_tx, mut quit_rx) = mpsc::channel::<()>(1);
    tokio::spawn(console::run(workstation.loader(), board.clone(), quit_tx));

    let report_status = args.status_interval > 0;
    let mut status = tokio::time::interval(Duration::from_secs(args.status_interval.max(1)));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl-C")?;
                tracing::info!("interrupted");
                break;
            }
            Some(()) = quit_rx.recv() => break,
            _ = status.tick(), if report_status => {
                for (_, line) in board.lines() {
                    tracing::info!("{line}");
                }
                for (name, stats) in workstation.loop_stats() {
                    tracing::debug!(
                        loop_name = name,
                        ticks = stats.ticks,
                        overruns = stats.overruns,
                        "loop statistics"
                    );
                }
            }
        }
    }

    tokio::task::spawn_blocking(move || workstation.shutdown())
        .await
        .context("shutdown task panicked")?
        .context("shutting down")?;
    Ok(())
}
