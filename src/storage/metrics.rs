//! Shared metrics recording for storage backends.
//!
//! Every backend call reports operation type, duration, status, and backend
//! name to the metrics sink. This is the main observability hook and a
//! required side effect of each call, not optional instrumentation.

use std::time::Instant;

/// Records the two per-operation storage metrics:
///
/// 1. `storage_operations_total`: counter by backend/operation/status
/// 2. `storage_operation_duration_ms`: latency histogram
pub fn record_operation(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a result to the metrics status label.
#[must_use]
pub const fn status_of<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}
