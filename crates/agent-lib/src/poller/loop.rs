//! Interface poll loop
//!
//! Every tick snapshots each configured interface (concurrently, bounded by
//! a semaphore), stamps the results, and appends them to the sample store in
//! ascending ifIndex order. A source failure only skips its interface; a
//! store failure abandons the rest of the tick. The loop keeps going either way.

use crate::config::MonitorConfig;
use crate::error::SourceError;
use crate::health::{components, HealthRegistry};
use crate::models::{IfIndex, RawCounters, Sample};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::source::CounterSource;
use crate::store::SampleStore;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Configuration for the poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Fixed tick interval (default: 10 seconds)
    pub interval: Duration,
    pub interface_indexes: BTreeSet<IfIndex>,
    /// Maximum snapshot calls in flight within one tick (default: 4)
    pub max_concurrent_polls: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for PollerConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval: config.poll_interval,
            interface_indexes: config.interface_indexes.clone(),
            max_concurrent_polls: config.max_concurrent_polls,
        }
    }
}

/// Why an interface produced no sample in a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Source(SourceError),
    /// The append itself failed
    StoreWrite(String),
    /// An earlier append in the same cycle failed
    CycleAborted,
    /// The snapshot task panicked or was cancelled
    TaskFailed(String),
}

/// Result of one interface within a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Stored(IfIndex),
    Skipped { if_index: IfIndex, reason: SkipReason },
}

impl PollOutcome {
    pub fn if_index(&self) -> IfIndex {
        match self {
            PollOutcome::Stored(if_index) | PollOutcome::Skipped { if_index, .. } => *if_index,
        }
    }
}

/// Summary of one poll cycle, outcomes in ascending ifIndex order
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcomes: Vec<PollOutcome>,
    /// A store failure cut the cycle short
    pub aborted: bool,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn stored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PollOutcome::Stored(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.stored()
    }

    /// Interfaces whose snapshot failed
    pub fn source_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    PollOutcome::Skipped {
                        reason: SkipReason::Source(_) | SkipReason::TaskFailed(_),
                        ..
                    }
                )
            })
            .count()
    }

    pub fn store_failure(&self) -> Option<&str> {
        self.outcomes.iter().find_map(|o| match o {
            PollOutcome::Skipped {
                reason: SkipReason::StoreWrite(reason),
                ..
            } => Some(reason.as_str()),
            _ => None,
        })
    }
}

type Snapshot = Result<(RawCounters, DateTime<Utc>), SkipReason>;

/// Poll loop that periodically samples every configured interface
pub struct Poller {
    source: Arc<dyn CounterSource>,
    store: Arc<dyn SampleStore>,
    config: PollerConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Poller {
    /// Unchecked constructor; `PollerBuilder::build` validates the config
    fn new(
        source: Arc<dyn CounterSource>,
        store: Arc<dyn SampleStore>,
        config: PollerConfig,
    ) -> Self {
        let logger = StructuredLogger::new(source.kind());
        Self {
            source,
            store,
            config,
            metrics: AgentMetrics::new(),
            logger,
            health: None,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run until `shutdown` is cancelled; returns the number of completed cycles
    ///
    /// Cancellation is observed between ticks, so a cycle that already
    /// started always finishes its appends. The poller component is marked
    /// unhealthy once the loop has exited.
    pub async fn run(self, shutdown: CancellationToken) -> u64 {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            interfaces = self.config.interface_indexes.len(),
            max_concurrent_polls = self.config.max_concurrent_polls,
            source = self.source.kind(),
            "Starting interface poll loop"
        );
        self.metrics
            .set_interfaces_configured(self.config.interface_indexes.len());

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(cycles, "Shutting down interface poll loop");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.poll_once().await;
                    cycles += 1;
                    self.record_cycle(cycles, &report).await;
                }
            }
        }

        if let Some(health) = &self.health {
            health
                .set_unhealthy(components::POLLER, "poll loop stopped")
                .await;
        }
        cycles
    }

    /// Run a single poll cycle
    pub async fn poll_once(&self) -> CycleReport {
        let start = Instant::now();
        let snapshots = self.snapshot_all().await;

        let mut outcomes = Vec::with_capacity(snapshots.len());
        let mut aborted = false;

        for (position, (if_index, snapshot)) in snapshots.iter().enumerate() {
            let if_index = *if_index;
            let (raw, sample_time) = match snapshot {
                Ok(stamped) => stamped,
                Err(reason) => {
                    if let SkipReason::Source(error) = reason {
                        self.metrics.inc_source_errors(error.kind());
                        self.logger.log_source_error(if_index, error);
                    }
                    outcomes.push(PollOutcome::Skipped {
                        if_index,
                        reason: reason.clone(),
                    });
                    continue;
                }
            };

            if aborted {
                outcomes.push(PollOutcome::Skipped {
                    if_index,
                    reason: SkipReason::CycleAborted,
                });
                continue;
            }

            let sample = Sample::from_counters(raw.clone(), *sample_time);
            match self.store.append(sample).await {
                Ok(()) => {
                    self.metrics.inc_samples_stored();
                    self.logger.log_sample_stored(if_index, &raw.if_name);
                    outcomes.push(PollOutcome::Stored(if_index));
                }
                Err(e) => {
                    let abandoned = snapshots.len() - position - 1;
                    self.metrics.inc_store_errors();
                    self.logger
                        .log_store_write_failed(if_index, &e.to_string(), abandoned);
                    outcomes.push(PollOutcome::Skipped {
                        if_index,
                        reason: SkipReason::StoreWrite(e.to_string()),
                    });
                    aborted = true;
                }
            }
        }

        CycleReport {
            outcomes,
            aborted,
            elapsed: start.elapsed(),
        }
    }

    /// Snapshot every configured interface, at most `max_concurrent_polls` at a time
    async fn snapshot_all(&self) -> BTreeMap<IfIndex, Snapshot> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_polls.max(1)));
        let mut tasks = JoinSet::new();

        for &if_index in &self.config.interface_indexes {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = source
                    .snapshot(if_index)
                    .await
                    .map(|raw| (raw, Utc::now()))
                    .map_err(SkipReason::Source);
                (if_index, result)
            });
        }

        let mut snapshots = BTreeMap::new();
        let mut task_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((if_index, result)) => {
                    snapshots.insert(if_index, result);
                }
                Err(e) => {
                    warn!(error = %e, "Snapshot task failed");
                    task_error = Some(e.to_string());
                }
            }
        }

        if let Some(reason) = task_error {
            for &if_index in &self.config.interface_indexes {
                snapshots
                    .entry(if_index)
                    .or_insert_with(|| Err(SkipReason::TaskFailed(reason.clone())));
            }
        }

        snapshots
    }

    async fn record_cycle(&self, cycle: u64, report: &CycleReport) {
        self.metrics.observe_poll_cycle(report.elapsed);
        self.logger.log_poll_cycle(
            cycle,
            report.stored(),
            report.skipped(),
            report.aborted,
            report.elapsed,
        );

        let Some(health) = &self.health else {
            return;
        };

        health.set_healthy(components::POLLER).await;

        let failed = report.source_failures();
        let total = report.outcomes.len();
        if failed == 0 {
            health.set_healthy(components::COUNTER_SOURCE).await;
        } else if failed < total {
            health
                .set_degraded(
                    components::COUNTER_SOURCE,
                    format!("{} of {} interfaces failed", failed, total),
                )
                .await;
        } else {
            health
                .set_unhealthy(components::COUNTER_SOURCE, "no interface answered")
                .await;
        }

        if let Some(reason) = report.store_failure() {
            health
                .set_unhealthy(components::SAMPLE_STORE, reason.to_string())
                .await;
        } else if report.stored() > 0 {
            health.set_healthy(components::SAMPLE_STORE).await;
        }
    }
}

/// Builder for the poll loop
#[derive(Default)]
pub struct PollerBuilder {
    source: Option<Arc<dyn CounterSource>>,
    store: Option<Arc<dyn SampleStore>>,
    config: PollerConfig,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl PollerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: Arc<dyn CounterSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn SampleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn interfaces(mut self, interfaces: impl IntoIterator<Item = IfIndex>) -> Self {
        self.config.interface_indexes = interfaces.into_iter().collect();
        self
    }

    pub fn max_concurrent_polls(mut self, limit: usize) -> Self {
        self.config.max_concurrent_polls = limit;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Report component health after every cycle
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<Poller> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Counter source is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Sample store is required"))?;
        if self.config.interface_indexes.is_empty() {
            bail!("At least one interface index is required");
        }
        if self.config.interval.is_zero() {
            bail!("Poll interval must be positive");
        }

        let mut poller = Poller::new(source, store, self.config);
        if let Some(logger) = self.logger {
            poller.logger = logger;
        }
        poller.health = self.health;
        Ok(poller)
    }
}
