//! Terminal rendering of controller events.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::time::{Duration, Instant};
use chrono::Local;
use imgpanel_engine::{EngineError, FinalReport, Job, JobObserver, ProgressReport};

/// Renders job events on stderr and remembers how the job ended.
pub struct TerminalObserver {
    verbose: bool,
    last_render: Cell<Option<Instant>>,
    cancelled: Cell<bool>,
    final_report: RefCell<Option<FinalReport>>,
}

impl TerminalObserver {
    pub fn new(verbose: bool) -> Self {
        TerminalObserver {
            verbose,
            last_render: Cell::new(None),
            cancelled: Cell::new(false),
            final_report: RefCell::new(None),
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub fn final_report(&self) -> Option<FinalReport> {
        self.final_report.borrow().clone()
    }

    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    pub fn progress_bar(fraction: f64) -> String {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as usize;
        let filled = percent / 5;
        format!("[{}{}] {:3}%", "=".repeat(filled), " ".repeat(20 - filled), percent)
    }
}

impl JobObserver for TerminalObserver {
    fn on_started(&self, job: &Job) {
        self.cancelled.set(false);
        self.final_report.replace(None);

        let started = job
            .started_at
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        eprintln!("Starting MPI processing at {}", started);
        eprintln!("  Input:  {}", job.input_directory.display());
        eprintln!("  Output: {}", job.output_directory.display());
        eprintln!("  Images: {}", job.total_units);
        eprintln!("Type 'c' and Enter to cancel.");
        eprintln!();
    }

    fn on_rejected(&self, error: &EngineError) {
        eprintln!("Cannot start: {}", error);
    }

    fn on_progress(&self, report: &ProgressReport) {
        // Throttle redraws; always draw the one that completes the run
        let now = Instant::now();
        let complete = report.completed_units >= report.total_units;
        if let Some(last) = self.last_render.get() {
            if !self.verbose && !complete && now.duration_since(last) < Duration::from_millis(100) {
                return;
            }
        }
        self.last_render.set(Some(now));

        let line = format!(
            "Processing {}/{} {} - approx. speed: {:.2} MB/s",
            report.completed_units,
            report.total_units,
            Self::progress_bar(report.fraction),
            report.throughput_mbs
        );
        if self.verbose {
            eprintln!("{}", line);
        } else {
            eprint!("\r{}", line);
            let _ = std::io::stderr().flush();
        }
    }

    fn on_cancelled(&self, _job: &Job) {
        self.cancelled.set(true);
        eprintln!();
        eprintln!("Process cancelled by user");
    }

    fn on_finished(&self, report: &FinalReport) {
        eprintln!();
        eprintln!("{}", Self::progress_bar(report.fraction));
        eprintln!("Total time: {:.2} s", report.duration_seconds);
        eprintln!(
            "Bytes read: {} B ({})",
            report.bytes_read,
            Self::format_bytes(report.bytes_read)
        );
        eprintln!(
            "Bytes written: {} B ({})",
            report.bytes_written,
            Self::format_bytes(report.bytes_written)
        );
        eprintln!("Final speed: {:.2} MB/S", report.final_throughput_mbs);
        if self.verbose {
            if let Some(seconds) = report.worker_reported_seconds {
                eprintln!("Worker-reported time: {:.2} s", seconds);
            }
            eprintln!(
                "Images completed: {}/{} (exit code: {})",
                report.completed_units,
                report.total_units,
                report
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string())
            );
        }
        self.final_report.replace(Some(report.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_picks_largest_unit() {
        assert_eq!(TerminalObserver::format_bytes(512), "512.00 B");
        assert_eq!(TerminalObserver::format_bytes(1536), "1.50 KB");
        assert_eq!(TerminalObserver::format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_progress_bar_fills_in_five_percent_steps() {
        assert_eq!(TerminalObserver::progress_bar(0.0), format!("[{}]   0%", " ".repeat(20)));
        assert_eq!(TerminalObserver::progress_bar(1.0), format!("[{}] 100%", "=".repeat(20)));
        assert_eq!(
            TerminalObserver::progress_bar(0.5),
            format!("[{}{}]  50%", "=".repeat(10), " ".repeat(10))
        );
    }
}
