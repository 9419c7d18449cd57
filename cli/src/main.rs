//! ImgPanel - Command-line control panel for the MPI image worker.
//!
//! Launches the worker over the fixed host set, follows its progress and
//! prints the final report. The terminal is only an observer; all job logic
//! lives in the engine.

mod logging;
mod observer;

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::{select, Receiver, Sender};
use imgpanel_engine::{
    try_read_latest_counters, JobController, JobState, PanelConfig, PlatformEvent,
    ProcessLauncher, SystemClock, SystemOpener,
};
use observer::TerminalObserver;
use tracing::{info, warn};

/// ImgPanel - run and monitor the distributed image transformation
#[derive(Parser, Debug)]
#[command(name = "imgpanel")]
#[command(version = "0.1.0")]
#[command(about = "Launch the MPI image worker and follow its progress")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the config file; RUST_LOG overrides both)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Print every progress report on its own line
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Process every .bmp image in a directory
    Run {
        /// Input directory holding the images
        #[arg(long, value_name = "DIR")]
        input: PathBuf,

        /// Cancel the job after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Show the latest counters recorded in the metrics file
    Metrics {
        /// Metrics file (defaults to the configured one)
        #[arg(long, value_name = "FILE")]
        path: Option<PathBuf>,
    },
    /// Open the metrics file with the default application
    OpenMetrics,
    /// Open the output directory in the file manager
    OpenOutput,
}

/// Commands typed by the user while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserCommand {
    Cancel,
}

/// How a `run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Finished,
    Cancelled,
}

const TICK: Duration = Duration::from_millis(200);

fn main() {
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(Some(RunOutcome::Cancelled)) => 130,
        Ok(_) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> anyhow::Result<Option<RunOutcome>> {
    let config = PanelConfig::load(args.config.as_deref())?;

    let level = args.log_level.as_deref().unwrap_or(&config.log.level);
    if let Err(e) = logging::init(level) {
        eprintln!("Logging unavailable: {}", e);
    }

    match &args.command {
        Cmd::Run { input, timeout } => {
            let observer = TerminalObserver::new(args.verbose);
            let commands = spawn_stdin_commands();
            let timeout = timeout
                .or(config.job_timeout_secs)
                .map(Duration::from_secs);
            run_job(config, input.clone(), timeout, &commands, &observer).map(Some)
        }
        Cmd::Metrics { path } => {
            let path = path.clone().unwrap_or_else(|| config.metrics_path.clone());
            let snapshot = try_read_latest_counters(&path)
                .with_context(|| format!("cannot read metrics file {}", path.display()))?;
            println!("Bytes read: {} B", snapshot.bytes_read);
            println!("Bytes written: {} B", snapshot.bytes_written);
            if let Some(image) = snapshot.last_image {
                println!("Last image: {}", image);
            }
            Ok(None)
        }
        Cmd::OpenMetrics => {
            let (controller, _events) = build_controller(config);
            controller.open_metrics_file()?;
            Ok(None)
        }
        Cmd::OpenOutput => {
            let (controller, _events) = build_controller(config);
            controller.open_output_directory()?;
            Ok(None)
        }
    }
}

fn build_controller(config: PanelConfig) -> (JobController, Receiver<PlatformEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let launcher = ProcessLauncher::from_config(&config, tx);
    let controller = JobController::new(
        config,
        Box::new(launcher),
        Box::new(SystemClock),
        Box::new(SystemOpener),
    );
    (controller, rx)
}

/// Start a job and drive the event loop until the worker exits.
fn run_job(
    config: PanelConfig,
    input: PathBuf,
    timeout: Option<Duration>,
    commands: &Receiver<UserCommand>,
    observer: &TerminalObserver,
) -> anyhow::Result<RunOutcome> {
    let (mut controller, events) = build_controller(config);
    controller.select_input_directory(input);
    controller.start(observer)?;

    let deadline = timeout.map(|t| Instant::now() + t);
    let closed_commands = crossbeam_channel::never::<UserCommand>();
    let mut commands_open = true;

    loop {
        let command_rx = if commands_open { commands } else { &closed_commands };
        select! {
            recv(events) -> event => {
                let Ok(event) = event else {
                    anyhow::bail!("lost contact with the worker process");
                };
                let exited = matches!(event, PlatformEvent::Exited { .. });
                controller.handle_event(event, observer);
                if exited {
                    break;
                }
            }
            recv(command_rx) -> command => match command {
                Ok(UserCommand::Cancel) => {
                    if let Err(e) = controller.cancel(observer) {
                        eprintln!("\n{}", e);
                    }
                }
                Err(_) => commands_open = false,
            },
            default(TICK) => {}
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline && controller.state() == JobState::Running {
                warn!(
                    elapsed_seconds = controller.elapsed_seconds(),
                    "job timeout reached; cancelling worker"
                );
                if let Err(e) = controller.cancel(observer) {
                    eprintln!("\n{}", e);
                }
            }
        }
    }

    let outcome = match controller.state() {
        JobState::Cancelled => RunOutcome::Cancelled,
        _ => RunOutcome::Finished,
    };
    info!(?outcome, "run complete");
    Ok(outcome)
}

/// Forward `c`/`cancel` lines from stdin as user commands.
fn spawn_stdin_commands() -> Receiver<UserCommand> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || read_commands(std::io::stdin().lock(), &tx));
    rx
}

fn read_commands<R: BufRead>(input: R, tx: &Sender<UserCommand>) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        if let Some(command) = parse_command(&line) {
            if tx.send(command).is_err() {
                break;
            }
        }
    }
}

fn parse_command(line: &str) -> Option<UserCommand> {
    match line.trim().to_lowercase().as_str() {
        "c" | "cancel" | "q" | "quit" => Some(UserCommand::Cancel),
        _ => None,
    }
}
