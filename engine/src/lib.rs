//! # ImgPanel Engine - MPI Image Job Supervision
//!
//! A headless core for launching a distributed image-processing worker under
//! an MPI launcher and following its progress. Designed as the foundation for
//! any front end (CLI, desktop, automation).
//!
//! ## Overview
//!
//! The engine:
//! - Validates a run (worker binary, input images, output directory)
//! - Launches the worker through a pluggable `Launcher`
//! - Counts completion lines in the worker's stdout, buffering partial lines
//! - Reads the latest byte counters from the worker's metrics file
//! - Estimates throughput while running and once the worker exits
//! - Reports everything through a `JobObserver`, decoupled from any UI
//!
//! ## Basic Usage
//!
//! ```no_run
//! use imgpanel_engine::{
//!     JobController, PanelConfig, PlatformEvent, ProcessLauncher, SystemClock, SystemOpener,
//! };
//! # use imgpanel_engine::{EngineError, FinalReport, Job, JobObserver, ProgressReport};
//! # struct Print;
//! # impl JobObserver for Print {
//! #     fn on_started(&self, _: &Job) {}
//! #     fn on_rejected(&self, e: &EngineError) { eprintln!("{}", e); }
//! #     fn on_progress(&self, r: &ProgressReport) { eprintln!("{:.0}%", r.fraction * 100.0); }
//! #     fn on_cancelled(&self, _: &Job) {}
//! #     fn on_finished(&self, r: &FinalReport) { eprintln!("{:.2} MB/s", r.final_throughput_mbs); }
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PanelConfig::default();
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let mut controller = JobController::new(
//!     config.clone(),
//!     Box::new(ProcessLauncher::from_config(&config, tx)),
//!     Box::new(SystemClock),
//!     Box::new(SystemOpener),
//! );
//!
//! let observer = Print;
//! controller.select_input_directory("/data/imagenes_bmp");
//! controller.start(&observer)?;
//!
//! while let Ok(event) = rx.recv() {
//!     let exited = matches!(event, PlatformEvent::Exited { .. });
//!     controller.handle_event(event, &observer);
//!     if exited {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Job, JobState, MetricsSnapshot and the report types
//! - **error**: Error types and handling
//! - **config**: Panel configuration and fixed launch constants
//! - **log_parser**: Completion-line recognition and line buffering
//! - **metrics**: Latest-counter extraction from the metrics file
//! - **throughput**: Running and final MB/s estimates
//! - **fs_ops**: Pre-launch filesystem checks
//! - **progress**: Observer trait
//! - **platform**: Clock, launcher, opener capabilities and real implementations
//! - **controller**: The job state machine

pub mod model;
pub mod error;
pub mod config;
pub mod log_parser;
pub mod metrics;
pub mod throughput;
pub mod fs_ops;
pub mod progress;
pub mod platform;
pub mod controller;

// Re-export main types and functions
pub use model::{FinalReport, Job, JobState, MetricsSnapshot, ProgressReport};
pub use error::{ConfigError, EngineError};
pub use config::{LogConfig, PanelConfig, HOSTS, INPUT_EXTENSION, PROCESS_COUNT};
pub use log_parser::{is_completion_event, parse_line, LineBuffer, LogEvent};
pub use metrics::{read_latest_counters, try_read_latest_counters};
pub use throughput::{final_throughput, running_throughput};
pub use progress::JobObserver;
pub use platform::{
    Clock, JobHandle, LaunchCommand, Launcher, Opener, PlatformEvent, ProcessLauncher,
    SystemClock, SystemOpener,
};
pub use controller::JobController;
