// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Prometheus metrics for directory sessions and operations.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

/// Session pool and operation metrics of one directory client.
#[derive(Clone, Debug)]
pub struct PoolMetrics {
    /// Sessions currently leased or being opened
    pub leased_sessions: IntGauge,
    /// Authenticated sessions parked for reuse
    pub idle_sessions: IntGauge,
    /// Session open attempts, labeled by status ("success", "error", "timeout")
    pub sessions_opened: IntCounterVec,
    /// Sessions closed, labeled by reason ("expired", "dead", "invalidated", "shutdown")
    pub sessions_closed: IntCounterVec,
    /// Time until a lease was granted or refused, labeled by outcome ("reused", "created", "timeout")
    pub lease_wait: HistogramVec,
    /// Searches and modifications, labeled by operation and status ("success", "error")
    pub operations: IntCounterVec,
    /// Time spent talking to the server per operation
    pub operation_duration: HistogramVec,
}

impl PoolMetrics {
    /// Create the metrics and register them with `registry`.
    ///
    /// Every name starts with `{prefix}_directory_`.
    pub fn new(prefix: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        let leased_sessions = IntGauge::with_opts(Opts::new(
            format!("{prefix}_directory_leased_sessions"),
            "Directory sessions currently leased to an operation",
        ))?;

        let idle_sessions = IntGauge::with_opts(Opts::new(
            format!("{prefix}_directory_idle_sessions"),
            "Bound directory sessions waiting for reuse",
        ))?;

        let sessions_opened = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_directory_sessions_opened_total"),
                "Attempts to connect and bind a directory session",
            ),
            &["status"],
        )?;

        let sessions_closed = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_directory_sessions_closed_total"),
                "Directory sessions unbound and closed",
            ),
            &["reason"],
        )?;

        let lease_wait = HistogramVec::new(
            HistogramOpts::new(
                format!("{prefix}_directory_lease_wait_seconds"),
                "Time an operation waited for a directory session",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["outcome"],
        )?;

        let operations = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_directory_operations_total"),
                "Directory searches and modifications",
            ),
            &["operation", "status"],
        )?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{prefix}_directory_operation_duration_seconds"),
                "Time spent in directory requests per operation",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 60.0]),
            &["operation"],
        )?;

        registry.register(Box::new(leased_sessions.clone()))?;
        registry.register(Box::new(idle_sessions.clone()))?;
        registry.register(Box::new(sessions_opened.clone()))?;
        registry.register(Box::new(sessions_closed.clone()))?;
        registry.register(Box::new(lease_wait.clone()))?;
        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(PoolMetrics {
            leased_sessions,
            idle_sessions,
            sessions_opened,
            sessions_closed,
            lease_wait,
            operations,
            operation_duration,
        })
    }

    /// Record one search or modification.
    pub fn record_operation(&self, operation: &str, success: bool, seconds: f64) {
        let status = if success { "success" } else { "error" };
        self.operations.with_label_values(&[operation, status]).inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(seconds);
    }

    pub(crate) fn record_lease(&self, outcome: &str, seconds: f64) {
        self.lease_wait.with_label_values(&[outcome]).observe(seconds);
    }
}
