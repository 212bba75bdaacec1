//! Shared metrics recording for the `SQLite` store.

use std::time::Instant;

/// Records operation metrics for storage operations.
///
/// Emits `storage_operations_total` (counter by status) and
/// `storage_operation_duration_ms` (latency histogram).
///
/// # Arguments
///
/// * `operation` - Operation name (e.g., `insert_record`, `create_identity`)
/// * `start` - Operation start time from `Instant::now()`
/// * `status` - Operation status (`success` or `error`)
pub fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a result onto the status label used by [`record_operation_metrics`].
pub const fn status_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation_metrics_without_recorder() {
        // No recorder installed: the facade must accept calls as no-ops.
        let start = Instant::now();
        record_operation_metrics("insert_record", start, "success");
        record_operation_metrics("create_identity", start, "error");
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label::<(), ()>(&Ok(())), "success");
        assert_eq!(status_label::<(), ()>(&Err(())), "error");
    }
}
