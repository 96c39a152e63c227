//! Interface health classification
//!
//! Maps operational status, utilization and error activity to a
//! HEALTHY / WARN / CRITICAL label. Every rule can only raise the
//! status, so the worst matching rule wins.

use crate::error::ConfigError;
use crate::models::{DerivedMetrics, HealthStatus, IfStatus, Sample};
use crate::rate::{PairOutcome, RateEngine};
use serde::{Deserialize, Serialize};

/// Utilization watermarks in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn_util_percent: f64,
    pub critical_util_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_util_percent: 70.0,
            critical_util_percent: 90.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Thresholds {
            warn_util_percent: warn,
            critical_util_percent: critical,
        } = *self;
        if (0.0..=100.0).contains(&warn) && (0.0..=100.0).contains(&critical) && warn <= critical
        {
            Ok(())
        } else {
            Err(ConfigError::InvalidThresholds { warn, critical })
        }
    }
}

/// Inputs to the classifier. Error fields are counter deltas over the
/// interval the utilization was measured on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSignals {
    pub admin_status: IfStatus,
    pub oper_status: IfStatus,
    pub in_util_percent: Option<f64>,
    pub out_util_percent: Option<f64>,
    pub in_errors: u64,
    pub out_errors: u64,
}

/// Classify one set of signals
pub fn classify(signals: &HealthSignals, thresholds: &Thresholds) -> HealthStatus {
    let mut status = HealthStatus::Healthy;

    if !signals.oper_status.is_up() {
        return HealthStatus::Critical;
    }
    if !signals.admin_status.is_up() {
        status = status.max(HealthStatus::Warn);
    }
    if signals.in_errors > 0 || signals.out_errors > 0 {
        status = status.max(HealthStatus::Warn);
    }

    for util in [signals.in_util_percent, signals.out_util_percent]
        .into_iter()
        .flatten()
    {
        if util > thresholds.critical_util_percent {
            status = status.max(HealthStatus::Critical);
        } else if util > thresholds.warn_util_percent {
            status = status.max(HealthStatus::Warn);
        }
    }

    status
}

/// Derive metrics and status for `sample`, using `previous` for rates.
///
/// Without a usable previous sample only the interface status is judged.
pub fn classify_sample(
    sample: &Sample,
    previous: Option<&Sample>,
    engine: &RateEngine,
    thresholds: &Thresholds,
) -> (DerivedMetrics, Option<PairOutcome>) {
    let outcome = previous.map(|prev| engine.compute(prev, sample));
    let rates = outcome.as_ref().and_then(PairOutcome::rates);

    let signals = HealthSignals {
        admin_status: sample.admin_status,
        oper_status: sample.oper_status,
        in_util_percent: rates.and_then(|r| r.in_util_percent),
        out_util_percent: rates.and_then(|r| r.out_util_percent),
        in_errors: rates.map_or(0, |r| r.in_errors),
        out_errors: rates.map_or(0, |r| r.out_errors),
    };

    let metrics = DerivedMetrics {
        if_index: sample.if_index,
        in_bps: rates.map(|r| r.in_bps),
        out_bps: rates.map(|r| r.out_bps),
        in_util_percent: signals.in_util_percent,
        out_util_percent: signals.out_util_percent,
        in_error_rate_percent: rates.and_then(|r| r.in_error_rate_percent),
        out_error_rate_percent: rates.and_then(|r| r.out_error_rate_percent),
        elapsed_secs: rates.map(|r| r.elapsed_secs),
        status: classify(&signals, thresholds),
    };

    (metrics, outcome)
}
