//! Throughput estimation from the latest metrics counters.

use crate::model::MetricsSnapshot;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Extra factor applied to both the megabyte total and the quotient of the
/// final estimate, i.e. ×100 relative to the running estimate.
///
/// Kept as the panel has always reported it; changing it changes every final
/// figure users have seen.
pub const FINAL_SCALE: f64 = 10.0;

/// Running estimate in MB/s: `(read + written) / 1024² / elapsed`.
///
/// Returns 0.0 for a non-positive (or non-finite) elapsed time.
pub fn running_throughput(snapshot: &MetricsSnapshot, elapsed_seconds: f64) -> f64 {
    if !is_usable_elapsed(elapsed_seconds) {
        return 0.0;
    }
    megabytes(snapshot) / elapsed_seconds
}

/// Final estimate in MB/s, reported once the worker has exited.
pub fn final_throughput(snapshot: &MetricsSnapshot, elapsed_seconds: f64) -> f64 {
    if !is_usable_elapsed(elapsed_seconds) {
        return 0.0;
    }
    let scaled_megabytes = megabytes(snapshot) * FINAL_SCALE;
    (scaled_megabytes / elapsed_seconds) * FINAL_SCALE
}

fn megabytes(snapshot: &MetricsSnapshot) -> f64 {
    snapshot.total_bytes() as f64 / BYTES_PER_MEGABYTE
}

fn is_usable_elapsed(elapsed_seconds: f64) -> bool {
    elapsed_seconds.is_finite() && elapsed_seconds > 0.0
}
