//! Core data model for image-processing jobs.
//!
//! This module defines the main data structures for representing a run of the
//! external MPI worker:
//! - Job: one run over an input directory
//! - JobState: lifecycle of the run
//! - MetricsSnapshot: latest counters recorded by the worker
//! - ProgressReport / FinalReport: what observers receive

use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a single processing job.
///
/// A Job is owned exclusively by the controller. `total_units` is fixed when
/// the job starts and never changes while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Directory holding the input images
    pub input_directory: PathBuf,

    /// Directory the worker writes results into
    pub output_directory: PathBuf,

    /// Number of eligible input files counted at start
    pub total_units: u64,

    /// Completion events seen so far (not clamped to `total_units`)
    pub completed_units: u64,

    /// When the worker was launched
    pub started_at: Option<DateTime<Utc>>,

    /// Current lifecycle state
    pub state: JobState,

    /// Total time printed by the worker itself, if it got that far
    pub worker_reported_seconds: Option<f64>,
}

impl Job {
    pub fn new(input_directory: PathBuf, output_directory: PathBuf) -> Self {
        Job {
            id: Uuid::new_v4(),
            input_directory,
            output_directory,
            total_units: 0,
            completed_units: 0,
            started_at: None,
            state: JobState::Idle,
            worker_reported_seconds: None,
        }
    }

    /// Fraction of units completed, clamped to `[0, 1]`.
    ///
    /// Returns 0.0 while `total_units` is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total_units == 0 {
            return 0.0;
        }
        (self.completed_units as f64 / self.total_units as f64).clamp(0.0, 1.0)
    }
}

/// The lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobState {
    /// Nothing launched yet
    #[default]
    Idle,
    /// Worker process is running
    Running,
    /// User asked for termination
    Cancelled,
    /// Worker exited on its own
    Finished,
}

impl JobState {
    /// Returns true if this state is terminal (no further transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cancelled | JobState::Finished)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Idle => write!(f, "Idle"),
            JobState::Running => write!(f, "Running"),
            JobState::Cancelled => write!(f, "Cancelled"),
            JobState::Finished => write!(f, "Finished"),
        }
    }
}

/// Latest byte counters found in the metrics file.
///
/// Only the last record of each kind is kept; earlier records are overwritten,
/// never summed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Name from the last `Imagen:` record, if any
    pub last_image: Option<String>,
}

impl MetricsSnapshot {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_read.saturating_add(self.bytes_written)
    }
}

/// Emitted while the job runs, once per recognised completion line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub job_id: Uuid,
    pub completed_units: u64,
    pub total_units: u64,
    /// Always within `[0, 1]`
    pub fraction: f64,
    pub throughput_mbs: f64,
}

/// Emitted once, after the worker process has exited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub job_id: Uuid,
    pub duration_seconds: f64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub final_throughput_mbs: f64,
    /// Forced to 1.0 regardless of how many units completed
    pub fraction: f64,
    pub completed_units: u64,
    pub total_units: u64,
    /// Exit code, when the platform knows it (not inspected)
    pub exit_code: Option<i32>,
    pub worker_reported_seconds: Option<f64>,
    /// State the job was in when the exit arrived
    pub state: JobState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_is_clamped_and_zero_without_units() {
        let mut job = Job::new(PathBuf::from("/in"), PathBuf::from("/out"));
        assert_eq!(job.fraction(), 0.0);

        job.total_units = 2;
        job.completed_units = 5;
        assert_eq!(job.fraction(), 1.0);
    }

    #[test]
    fn test_job_serializes_with_identity_and_state() {
        let mut job = Job::new(PathBuf::from("/data/imagenes_bmp"), PathBuf::from("/data/out"));
        job.total_units = 3;
        job.completed_units = 1;
        job.started_at = Some(Utc::now());
        job.state = JobState::Running;

        let text = toml::to_string(&job).expect("Failed to serialize job");
        assert!(text.contains("state = \"Running\""));

        let restored: Job = toml::from_str(&text).expect("Failed to deserialize job");
        assert_eq!(restored.id, job.id);
        assert_eq!(restored.input_directory, job.input_directory);
        assert_eq!(restored.started_at, job.started_at);
        assert_eq!(restored.state, JobState::Running);
        assert_eq!(restored.worker_reported_seconds, None);
    }
}
