//! Job orchestration.
//!
//! `JobController` owns the job and drives it through
//! Idle -> Running -> {Cancelled, Finished}. It never blocks: the event loop
//! calls `start`/`cancel` for user commands and `handle_event` for every
//! platform notification, and the controller reports back through a
//! `JobObserver`.

use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use crate::config::{PanelConfig, INPUT_EXTENSION};
use crate::error::EngineError;
use crate::fs_ops;
use crate::log_parser::{parse_line, LineBuffer, LogEvent};
use crate::metrics;
use crate::model::{FinalReport, Job, JobState, MetricsSnapshot, ProgressReport};
use crate::platform::{Clock, JobHandle, LaunchCommand, Launcher, Opener, PlatformEvent};
use crate::progress::JobObserver;
use crate::throughput;

pub struct JobController {
    config: PanelConfig,
    launcher: Box<dyn Launcher>,
    clock: Box<dyn Clock>,
    opener: Box<dyn Opener>,
    input_directory: Option<PathBuf>,
    job: Option<Job>,
    /// Present from a successful launch until its exit has been handled
    handle: Option<Box<dyn JobHandle>>,
    lines: LineBuffer,
}

impl JobController {
    pub fn new(
        config: PanelConfig,
        launcher: Box<dyn Launcher>,
        clock: Box<dyn Clock>,
        opener: Box<dyn Opener>,
    ) -> Self {
        JobController {
            config,
            launcher,
            clock,
            opener,
            input_directory: None,
            job: None,
            handle: None,
            lines: LineBuffer::new(),
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn select_input_directory(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "input directory selected");
        self.input_directory = Some(path);
    }

    pub fn input_directory(&self) -> Option<&Path> {
        self.input_directory.as_deref()
    }

    /// State of the current (or most recent) job; Idle before the first start.
    pub fn state(&self) -> JobState {
        self.job.as_ref().map_or(JobState::Idle, |job| job.state)
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// True while a launched worker has not been seen to exit.
    pub fn has_live_process(&self) -> bool {
        self.handle.is_some()
    }

    /// Seconds since the current job started, or 0.0 if it never did.
    pub fn elapsed_seconds(&self) -> f64 {
        let started_at = self.job.as_ref().and_then(|job| job.started_at);
        seconds_between(started_at, self.clock.now())
    }

    /// Validate preconditions and launch the worker.
    ///
    /// On rejection the observer is told why and the current state is kept.
    pub fn start(&mut self, observer: &dyn JobObserver) -> Result<(), EngineError> {
        match self.try_start() {
            Ok(()) => {
                if let Some(job) = &self.job {
                    observer.on_started(job);
                }
                Ok(())
            }
            Err(e) => {
                warn!(reason = %e, "start rejected");
                observer.on_rejected(&e);
                Err(e)
            }
        }
    }

    fn try_start(&mut self) -> Result<(), EngineError> {
        if self.handle.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let input = self
            .input_directory
            .clone()
            .ok_or(EngineError::NoInputSelected)?;
        let total_units = self.check_preconditions(&input)?;

        let output = self.config.output_dir.clone();
        let command = LaunchCommand::mpi(
            &self.config.launcher,
            &self.config.worker_path,
            &input,
            &output,
        );

        let mut job = Job::new(input, output);
        job.total_units = total_units;
        job.started_at = Some(self.clock.now());

        let handle = self
            .launcher
            .spawn(&command)
            .map_err(|e| EngineError::SpawnFailed {
                program: command.program.clone(),
                source: e,
            })?;

        job.state = JobState::Running;
        info!(
            job_id = %job.id,
            pid = handle.id(),
            total_units,
            command = %command.display(),
            "job started"
        );

        self.lines.clear();
        self.handle = Some(handle);
        self.job = Some(job);
        Ok(())
    }

    /// Returns the number of eligible input files.
    fn check_preconditions(&self, input: &Path) -> Result<u64, EngineError> {
        let worker = &self.config.worker_path;
        if !fs_ops::is_executable(worker) {
            return Err(EngineError::WorkerNotExecutable {
                path: worker.clone(),
            });
        }

        if !input.is_dir() {
            return Err(EngineError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        fs_ops::ensure_dir_exists(&self.config.output_dir)?;

        let count = fs_ops::count_eligible_files(input, INPUT_EXTENSION).unwrap_or_else(|e| {
            warn!(path = %input.display(), error = %e, "could not list input directory");
            0
        });
        if count == 0 {
            return Err(EngineError::NoEligibleFiles {
                path: input.to_path_buf(),
            });
        }

        Ok(count)
    }

    /// Dispatch one platform notification.
    pub fn handle_event(&mut self, event: PlatformEvent, observer: &dyn JobObserver) {
        match event {
            PlatformEvent::Output(chunk) => self.on_output(&chunk, observer),
            PlatformEvent::OutputClosed => self.on_output_closed(observer),
            PlatformEvent::Exited { code } => self.on_exit(code, observer),
        }
    }

    /// Progress tick: process every complete line in `chunk`.
    pub fn on_output(&mut self, chunk: &[u8], observer: &dyn JobObserver) {
        if self.state() != JobState::Running {
            debug!(bytes = chunk.len(), state = %self.state(), "ignoring output outside a running job");
            return;
        }

        let mut tick = None;
        for line in self.lines.push(chunk) {
            self.process_line(&line, &mut tick, observer);
        }
    }

    /// End of stdout: the held-back partial line, if any, is now complete.
    pub fn on_output_closed(&mut self, observer: &dyn JobObserver) {
        if self.state() != JobState::Running {
            self.lines.clear();
            return;
        }
        if let Some(line) = self.lines.finish() {
            self.process_line(&line, &mut None, observer);
        }
    }

    /// `tick` holds the time and metrics sampled for the current chunk, so
    /// the file is read at most once per chunk.
    fn process_line(
        &mut self,
        line: &str,
        tick: &mut Option<(DateTime<Utc>, MetricsSnapshot)>,
        observer: &dyn JobObserver,
    ) {
        match parse_line(line) {
            Some(LogEvent::ImageCompleted { rank, image }) => {
                let (now, snapshot) = &*tick.get_or_insert_with(|| {
                    (
                        self.clock.now(),
                        metrics::read_latest_counters(&self.config.metrics_path),
                    )
                });

                let Some(job) = self.job.as_mut() else {
                    return;
                };
                job.completed_units += 1;
                let elapsed = seconds_between(job.started_at, *now);

                let report = ProgressReport {
                    job_id: job.id,
                    completed_units: job.completed_units,
                    total_units: job.total_units,
                    fraction: job.fraction(),
                    throughput_mbs: throughput::running_throughput(snapshot, elapsed),
                };
                debug!(
                    ?rank,
                    ?image,
                    completed = report.completed_units,
                    total = report.total_units,
                    "image completed"
                );
                observer.on_progress(&report);
            }
            Some(LogEvent::TotalTime { seconds }) => {
                if let Some(job) = self.job.as_mut() {
                    job.worker_reported_seconds = Some(seconds);
                }
            }
            None => {}
        }
    }

    /// The worker has terminated: read final metrics and report.
    ///
    /// Runs once per launch. An exit after a cancellation still reports, but
    /// the job stays Cancelled.
    pub fn on_exit(&mut self, code: Option<i32>, observer: &dyn JobObserver) {
        if self.handle.take().is_none() {
            debug!(?code, "exit notification with no live worker; ignoring");
            return;
        }

        if self.state() == JobState::Running {
            if let Some(line) = self.lines.finish() {
                self.process_line(&line, &mut None, observer);
            }
        }
        self.lines.clear();

        let now = self.clock.now();
        let snapshot = metrics::read_latest_counters(&self.config.metrics_path);

        let Some(job) = self.job.as_mut() else {
            return;
        };
        if job.state == JobState::Running {
            job.state = JobState::Finished;
        }

        let duration = seconds_between(job.started_at, now);
        let report = FinalReport {
            job_id: job.id,
            duration_seconds: duration,
            bytes_read: snapshot.bytes_read,
            bytes_written: snapshot.bytes_written,
            final_throughput_mbs: throughput::final_throughput(&snapshot, duration),
            fraction: 1.0,
            completed_units: job.completed_units,
            total_units: job.total_units,
            exit_code: code,
            worker_reported_seconds: job.worker_reported_seconds,
            state: job.state,
        };

        info!(
            job_id = %job.id,
            ?code,
            state = %job.state,
            duration_seconds = duration,
            bytes_read = snapshot.bytes_read,
            bytes_written = snapshot.bytes_written,
            "job ended"
        );
        observer.on_finished(&report);
    }

    /// Send the termination signal to a running worker.
    ///
    /// Does not wait for the process to die. The job moves to Cancelled even
    /// if the signal could not be sent; that failure is returned and logged.
    /// Calling this outside a running job does nothing.
    pub fn cancel(&mut self, observer: &dyn JobObserver) -> Result<(), EngineError> {
        if self.state() != JobState::Running {
            debug!(state = %self.state(), "cancel ignored");
            return Ok(());
        }
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        let result = handle.terminate();
        let pid = handle.id();

        let Some(job) = self.job.as_mut() else {
            return Ok(());
        };
        job.state = JobState::Cancelled;

        match result {
            Ok(()) => {
                info!(job_id = %job.id, pid, "job cancelled by user");
                observer.on_cancelled(job);
                Ok(())
            }
            Err(e) => {
                warn!(job_id = %job.id, pid, error = %e, "failed to signal worker");
                Err(EngineError::CancelFailed { source: e })
            }
        }
    }

    /// Open the metrics file with the OS default application.
    pub fn open_metrics_file(&self) -> Result<(), EngineError> {
        let path = &self.config.metrics_path;
        if !path.is_file() {
            return Err(EngineError::MetricsFileMissing { path: path.clone() });
        }
        self.open_path(path)
    }

    /// Open the output directory in the OS file manager.
    pub fn open_output_directory(&self) -> Result<(), EngineError> {
        let path = &self.config.output_dir;
        if !path.is_dir() {
            return Err(EngineError::OutputDirMissing { path: path.clone() });
        }
        self.open_path(path)
    }

    fn open_path(&self, path: &Path) -> Result<(), EngineError> {
        self.opener.open(path).map_err(|e| EngineError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn seconds_between(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> f64 {
    let Some(start) = start else {
        return 0.0;
    };
    (end - start)
        .num_microseconds()
        .map_or(0.0, |us| us as f64 / 1_000_000.0)
}
