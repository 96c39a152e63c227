//! Observability infrastructure for the interface monitor
//!
//! Provides:
//! - Prometheus metrics (poll-cycle latency, stored samples, source and store failures,
//!   counter resets)
//! - Structured JSON logging with tracing

use crate::error::SourceError;
use crate::models::IfIndex;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for poll-cycle latency (in seconds)
const CYCLE_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    poll_cycle_seconds: Histogram,
    poll_cycles: IntCounter,
    samples_stored: IntCounter,
    source_errors: IntCounterVec,
    store_errors: IntCounter,
    counter_resets: IntCounter,
    out_of_order_pairs: IntCounter,
    interfaces_configured: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            poll_cycle_seconds: register_histogram!(
                "netpulse_poll_cycle_seconds",
                "Time spent polling and storing all configured interfaces",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_cycle_seconds"),

            poll_cycles: register_int_counter!(
                "netpulse_poll_cycles_total",
                "Number of completed poll cycles"
            )
            .expect("Failed to register poll_cycles"),

            samples_stored: register_int_counter!(
                "netpulse_samples_stored_total",
                "Number of samples appended to the sample store"
            )
            .expect("Failed to register samples_stored"),

            source_errors: register_int_counter_vec!(
                "netpulse_source_errors_total",
                "Counter source failures by kind",
                &["kind"]
            )
            .expect("Failed to register source_errors"),

            store_errors: register_int_counter!(
                "netpulse_store_errors_total",
                "Failed sample store appends"
            )
            .expect("Failed to register store_errors"),

            counter_resets: register_int_counter!(
                "netpulse_counter_resets_total",
                "Sample pairs discarded because a device counter reset"
            )
            .expect("Failed to register counter_resets"),

            out_of_order_pairs: register_int_counter!(
                "netpulse_out_of_order_pairs_total",
                "Sample pairs rejected because they were not strictly ordered"
            )
            .expect("Failed to register out_of_order_pairs"),

            interfaces_configured: register_int_gauge!(
                "netpulse_interfaces_configured",
                "Number of interfaces polled every cycle"
            )
            .expect("Failed to register interfaces_configured"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentMetrics").finish_non_exhaustive()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    /// Record a finished poll cycle
    pub fn observe_poll_cycle(&self, elapsed: Duration) {
        self.inner().poll_cycle_seconds.observe(elapsed.as_secs_f64());
        self.inner().poll_cycles.inc();
    }

    pub fn inc_samples_stored(&self) {
        self.inner().samples_stored.inc();
    }

    pub fn inc_source_errors(&self, kind: &str) {
        self.inner().source_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_store_errors(&self) {
        self.inner().store_errors.inc();
    }

    pub fn inc_counter_resets(&self) {
        self.inner().counter_resets.inc();
    }

    pub fn inc_out_of_order_pairs(&self) {
        self.inner().out_of_order_pairs.inc();
    }

    pub fn set_interfaces_configured(&self, count: usize) {
        self.inner().interfaces_configured.set(count as i64);
    }

    /// Every metric in the default registry, in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        self.inner();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn samples_stored(&self) -> u64 {
        self.inner().samples_stored.get()
    }

    pub fn source_errors(&self, kind: &str) -> u64 {
        self.inner().source_errors.with_label_values(&[kind]).get()
    }

    pub fn store_errors(&self) -> u64 {
        self.inner().store_errors.get()
    }

    pub fn counter_resets(&self) -> u64 {
        self.inner().counter_resets.get()
    }

    pub fn out_of_order_pairs(&self) -> u64 {
        self.inner().out_of_order_pairs.get()
    }
}

/// Structured logger for agent events
///
/// Emits one named `event` per significant occurrence, always tagged with
/// the polled device so logs from several agents can be merged.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, source_kind: &str, interfaces: usize) {
        info!(
            event = "agent_started",
            device = %self.device,
            agent_version = %version,
            source = %source_kind,
            interfaces = interfaces,
            "Interface monitor started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            device = %self.device,
            reason = %reason,
            "Interface monitor shutting down"
        );
    }

    pub fn log_sample_stored(&self, if_index: IfIndex, if_name: &str) {
        debug!(
            event = "sample_stored",
            device = %self.device,
            if_index = if_index,
            if_name = %if_name,
            "Stored interface sample"
        );
    }

    /// Log a failed snapshot; the interface is skipped for this cycle
    pub fn log_source_error(&self, if_index: IfIndex, error: &SourceError) {
        warn!(
            event = "source_error",
            device = %self.device,
            if_index = if_index,
            kind = error.kind(),
            error = %error,
            "Failed to read interface counters"
        );
    }

    /// Log a failed append; remaining appends of the cycle are abandoned
    pub fn log_store_write_failed(&self, if_index: IfIndex, error: &str, abandoned: usize) {
        warn!(
            event = "store_write_failed",
            device = %self.device,
            if_index = if_index,
            error = %error,
            abandoned = abandoned,
            "Failed to append sample, aborting cycle"
        );
    }

    /// Log a discarded pair, naming the counter whose delta was implausible
    pub fn log_counter_reset(&self, if_index: IfIndex, counter: &str, prev: u64, curr: u64) {
        info!(
            event = "counter_reset",
            device = %self.device,
            if_index = if_index,
            counter = %counter,
            prev = prev,
            curr = curr,
            "Counter reset detected, discarding sample pair"
        );
    }

    pub fn log_poll_cycle(
        &self,
        cycle: u64,
        stored: usize,
        skipped: usize,
        aborted: bool,
        elapsed: Duration,
    ) {
        if aborted || skipped > 0 {
            info!(
                event = "poll_cycle_complete",
                device = %self.device,
                cycle = cycle,
                stored = stored,
                skipped = skipped,
                aborted = aborted,
                elapsed_ms = elapsed.as_millis() as u64,
                "Poll cycle complete with skipped interfaces"
            );
        } else {
            debug!(
                event = "poll_cycle_complete",
                device = %self.device,
                cycle = cycle,
                stored = stored,
                elapsed_ms = elapsed.as_millis() as u64,
                "Poll cycle complete"
            );
        }
    }
}
