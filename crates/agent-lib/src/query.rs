//! Read path over the sample store
//!
//! Serves the newest samples, window summaries and health labels to an
//! external serving layer. Nothing here writes; every figure is recomputed
//! from stored samples on each call.

use crate::aggregate::summarize;
use crate::classifier::{classify_sample, Thresholds};
use crate::config::MonitorConfig;
use crate::error::StoreError;
use crate::models::{DerivedMetrics, IfIndex, Sample, SummaryKpi};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::rate::{PairOutcome, RateEngine};
use crate::store::SampleStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Which samples a summary covers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SummaryWindow {
    /// Inclusive time bounds
    Between {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    /// The trailing duration ending now
    Last(Duration),
    /// The newest `n` samples
    LastSamples(usize),
}

/// Newest sample of one interface with its derived metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceReport {
    pub sample: Sample,
    pub metrics: DerivedMetrics,
}

pub struct InterfaceHealthService {
    store: Arc<dyn SampleStore>,
    engine: RateEngine,
    thresholds: Thresholds,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl InterfaceHealthService {
    pub fn new(store: Arc<dyn SampleStore>, engine: RateEngine, thresholds: Thresholds) -> Self {
        Self {
            store,
            engine,
            thresholds,
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new("query"),
        }
    }

    pub fn from_config(store: Arc<dyn SampleStore>, config: &MonitorConfig) -> Self {
        Self::new(store, RateEngine::new(config.rate), config.thresholds)
            .with_logger(StructuredLogger::new(config.target()))
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Newest sample of every interface, ascending by ifIndex
    pub async fn latest(&self) -> Result<Vec<Sample>, StoreError> {
        self.store.latest_per_key().await
    }

    /// KPIs for one interface over `window`; an empty window is not an error
    pub async fn summary(
        &self,
        if_index: IfIndex,
        window: SummaryWindow,
    ) -> Result<SummaryKpi, StoreError> {
        let samples = self.window(if_index, window).await?;
        Ok(summarize(if_index, &samples, &self.engine))
    }

    /// KPIs over `window` for every interface that has samples
    pub async fn summaries(&self, window: SummaryWindow) -> Result<Vec<SummaryKpi>, StoreError> {
        let mut summaries = Vec::new();
        for latest in self.store.latest_per_key().await? {
            summaries.push(self.summary(latest.if_index, window).await?);
        }
        Ok(summaries)
    }

    /// Derived metrics and status of `sample`, rated against `previous` when given
    pub fn classify(&self, sample: &Sample, previous: Option<&Sample>) -> DerivedMetrics {
        let (metrics, outcome) = classify_sample(sample, previous, &self.engine, &self.thresholds);
        match (outcome, previous) {
            (Some(PairOutcome::CounterReset(counter)), Some(prev)) => {
                self.metrics.inc_counter_resets();
                self.logger.log_counter_reset(
                    sample.if_index,
                    counter.as_str(),
                    counter.read(prev),
                    counter.read(sample),
                );
            }
            (Some(PairOutcome::OutOfOrder), _) => self.metrics.inc_out_of_order_pairs(),
            _ => {}
        }
        metrics
    }

    /// Classify every interface's newest sample against its predecessor
    pub async fn latest_status(&self) -> Result<Vec<InterfaceReport>, StoreError> {
        let mut reports = Vec::new();
        for latest in self.store.latest_per_key().await? {
            let tail = self.store.tail_for_key(latest.if_index, 2).await?;
            // Pair only when the time-ordered tail ends at the latest sample
            let previous = match tail.as_slice() {
                [prev, last] if *last == latest => Some(prev),
                _ => None,
            };
            let metrics = self.classify(&latest, previous);
            reports.push(InterfaceReport {
                sample: latest,
                metrics,
            });
        }
        Ok(reports)
    }

    async fn window(
        &self,
        if_index: IfIndex,
        window: SummaryWindow,
    ) -> Result<Vec<Sample>, StoreError> {
        match window {
            SummaryWindow::Between { since, until } => {
                self.store.range_for_key(if_index, since, until).await
            }
            SummaryWindow::Last(span) => {
                let until = Utc::now();
                let since = until
                    .checked_sub_signed(span)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                self.store.range_for_key(if_index, since, until).await
            }
            SummaryWindow::LastSamples(count) => self.store.tail_for_key(if_index, count).await,
        }
    }
}
