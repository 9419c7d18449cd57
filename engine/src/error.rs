//! Error types for the job engine.
//!
//! `EngineError` represents a rejected transition: a start that cannot go
//! ahead, a cancel whose signal could not be sent, or an open request for a
//! missing target. None of these are fatal to the controller; it stays usable
//! after any of them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the controller for a single attempted operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `start()` called before any input directory was chosen
    #[error("no input directory selected")]
    NoInputSelected,

    /// Worker binary is missing or lacks execute permission
    #[error("worker executable not found or not executable: {}", path.display())]
    WorkerNotExecutable { path: PathBuf },

    /// Selected input directory does not exist
    #[error("input directory does not exist: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// Output directory could not be created
    #[error("could not create output directory {}: {source}", path.display())]
    OutputDirCreation { path: PathBuf, source: io::Error },

    /// Input directory holds no file with the eligible extension
    #[error("no eligible files in {}", path.display())]
    NoEligibleFiles { path: PathBuf },

    /// The OS refused to create the worker process
    #[error("failed to launch {program}: {source}")]
    SpawnFailed { program: String, source: io::Error },

    /// A worker process is still alive
    #[error("a job is already running")]
    AlreadyRunning,

    /// Termination signal could not be delivered
    #[error("failed to cancel worker process: {source}")]
    CancelFailed { source: io::Error },

    /// Metrics file is absent
    #[error("metrics file not found: {}", path.display())]
    MetricsFileMissing { path: PathBuf },

    /// Output directory is absent
    #[error("output directory not found: {}", path.display())]
    OutputDirMissing { path: PathBuf },

    /// OS handler launch failed
    #[error("failed to open {}: {source}", path.display())]
    OpenFailed { path: PathBuf, source: io::Error },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::OutputDirCreation { source, .. }
            | Self::SpawnFailed { source, .. }
            | Self::CancelFailed { source }
            | Self::OpenFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Errors raised while loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
