//! Observer trait for job events.
//!
//! This module defines the JobObserver trait, which decouples the controller
//! from whatever presents its state (terminal, desktop window, tests).
//! Observers hold no business logic; they render what they are told.

use crate::error::EngineError;
use crate::model::{FinalReport, Job, ProgressReport};

/// Receives controller events.
///
/// All methods are called synchronously from the thread driving the
/// controller, in the order the underlying notifications were handled.
pub trait JobObserver {
    /// The worker process was launched.
    fn on_started(&self, job: &Job);

    /// A start was refused and the job stays where it was.
    ///
    /// The error's `Display` is the user-facing reason.
    fn on_rejected(&self, error: &EngineError);

    /// One more completion line was seen.
    fn on_progress(&self, report: &ProgressReport);

    /// Termination signal was sent. The process may still be alive.
    fn on_cancelled(&self, job: &Job);

    /// The worker process exited and final metrics were read.
    fn on_finished(&self, report: &FinalReport);
}
