//! Panel configuration.
//!
//! Loaded from an optional TOML file. Every field has a default, so a missing
//! or partial file is fine. The host list, process count and input extension
//! are fixed constants and deliberately not part of the file.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// Hosts the MPI launcher distributes the worker over.
pub const HOSTS: &str = "pc1,pc2,pc3";

/// Number of worker processes requested from the launcher.
pub const PROCESS_COUNT: u32 = 32;

/// Extension (without dot, matched case-insensitively) of eligible input files.
pub const INPUT_EXTENSION: &str = "bmp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// MPI-style launcher program
    pub launcher: String,

    /// Worker executable run under the launcher
    pub worker_path: PathBuf,

    /// Where the worker writes its results
    pub output_dir: PathBuf,

    /// Side-channel metrics file written by the worker
    pub metrics_path: PathBuf,

    /// Upper bound for a single stdout read
    pub read_chunk_size: usize,

    /// How long exit reporting waits for stdout to drain
    pub exit_drain_timeout_ms: u64,

    /// Optional liveness guard applied by the event loop
    pub job_timeout_secs: Option<u64>,

    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            launcher: "mpiexec".to_string(),
            worker_path: PathBuf::from("/mirror/mpiu/transformacion_img-mpi-openmp/arch_test"),
            output_dir: PathBuf::from("/mirror/mpiu/transformacion_img-mpi-openmp/imagen_transform"),
            metrics_path: PathBuf::from("metrics_rank.txt"),
            read_chunk_size: 4096,
            exit_drain_timeout_ms: 2000,
            job_timeout_secs: None,
            log: LogConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from `path` when given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = PanelConfig::from_toml_str("").expect("empty config should parse");
        assert_eq!(config, PanelConfig::default());
        assert_eq!(config.launcher, "mpiexec");
        assert_eq!(config.read_chunk_size, 4096);
        assert!(config.job_timeout_secs.is_none());
    }

    #[test]
    fn test_partial_file_overrides_only_given_fields() {
        let config = PanelConfig::from_toml_str(
            r#"
            worker_path = "/opt/worker"
            job_timeout_secs = 600

            [log]
            level = "debug"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.worker_path, PathBuf::from("/opt/worker"));
        assert_eq!(config.job_timeout_secs, Some(600));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.metrics_path, PathBuf::from("metrics_rank.txt"));
    }

    #[test]
    fn test_from_file_reports_missing_and_malformed_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

        let missing = temp_dir.path().join("absent.toml");
        assert!(matches!(
            PanelConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = temp_dir.path().join("broken.toml");
        fs::write(&broken, "read_chunk_size = \"lots\"").expect("Failed to write config");
        assert!(matches!(
            PanelConfig::from_file(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = PanelConfig::load(None).expect("defaults should load");
        assert_eq!(config.exit_drain_timeout_ms, 2000);
    }
}
