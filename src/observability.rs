use std::net::SocketAddr;

// ── Booking ─────────────────────────────────────────────────────

/// Counter: reservation attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "showtime_reservations_total";

/// Counter: settled payments. Labels: status.
pub const PAYMENTS_TOTAL: &str = "showtime_payments_total";

/// Counter: pending transactions force-failed. Labels: trigger (deferred, sweep).
pub const RESERVATIONS_EXPIRED_TOTAL: &str = "showtime_reservations_expired_total";

/// Histogram: one sweep pass in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "showtime_sweep_duration_seconds";

/// Counter: collaborator calls that failed. Labels: service.
pub const DEPENDENCY_FAILURES_TOTAL: &str = "showtime_dependency_failures_total";

// ── Scheduling ──────────────────────────────────────────────────

/// Counter: placements committed. Labels: result (inserted, duplicate, conflict).
pub const SCHEDULES_COMMITTED_TOTAL: &str = "showtime_schedules_committed_total";

/// Counter: (day, movie) pairs that got fewer showings than targeted.
pub const ALLOCATION_SHORTFALL_TOTAL: &str = "showtime_allocation_shortfall_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "showtime_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "showtime_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
///
/// A failed install is logged and the process runs without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}
