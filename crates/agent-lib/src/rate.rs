//! Counter-delta and rate computation
//!
//! Turns two ordered samples of the same interface into throughput,
//! utilization and error-rate figures. Cumulative counters wrap at their
//! bit width; a single wrap between two samples is corrected, while a
//! wrapped delta too large to be real traffic is treated as a counter
//! reset (device reboot) and the pair is discarded.

use crate::error::ConfigError;
use crate::models::Sample;
use serde::{Deserialize, Serialize};

/// Default allowance above nominal link speed before a wrapped delta is
/// considered a reset
const DEFAULT_RESET_HEADROOM: f64 = 1.5;

/// Default mean packet size used to estimate packets from octets
const DEFAULT_MEAN_PACKET_OCTETS: u64 = 1500;

/// Bit width of a cumulative counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterWidth {
    Bits32,
    Bits64,
}

impl CounterWidth {
    pub fn from_bits(bits: u32) -> Result<Self, ConfigError> {
        match bits {
            32 => Ok(CounterWidth::Bits32),
            64 => Ok(CounterWidth::Bits64),
            other => Err(ConfigError::UnsupportedCounterWidth(other)),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            CounterWidth::Bits32 => 32,
            CounterWidth::Bits64 => 64,
        }
    }

    /// 2^bits, the value at which the counter restarts from zero
    pub fn modulus(self) -> u128 {
        1u128 << self.bits()
    }

    /// Reduce an unbounded running total to what the counter would report
    pub fn reduce(self, total: u128) -> u64 {
        (total % self.modulus()) as u64
    }
}

/// Difference between two readings of one cumulative counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDelta {
    /// The counter moved forward without wrapping
    Direct(u64),
    /// The counter passed its maximum exactly once
    Wrapped(u64),
}

impl CounterDelta {
    pub fn value(self) -> u64 {
        match self {
            CounterDelta::Direct(v) | CounterDelta::Wrapped(v) => v,
        }
    }

    pub fn is_wrapped(self) -> bool {
        matches!(self, CounterDelta::Wrapped(_))
    }
}

/// Delta between two counter readings, assuming at most one wrap.
///
/// Returns `None` when `prev` cannot be a reading of a counter of this
/// width, which only happens after a reset or with a misconfigured width.
pub fn counter_delta(prev: u64, curr: u64, width: CounterWidth) -> Option<CounterDelta> {
    if curr >= prev {
        return Some(CounterDelta::Direct(curr - prev));
    }

    let modulus = width.modulus();
    let prev = u128::from(prev);
    if prev >= modulus {
        return None;
    }

    u64::try_from(modulus - prev + u128::from(curr))
        .ok()
        .map(CounterDelta::Wrapped)
}

/// Rate engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub width: CounterWidth,
    /// Multiple of nominal link capacity a wrapped octet delta may reach
    pub reset_headroom: f64,
    /// Octets per packet when estimating packets for the error rate
    pub mean_packet_octets: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            width: CounterWidth::Bits32,
            reset_headroom: DEFAULT_RESET_HEADROOM,
            mean_packet_octets: DEFAULT_MEAN_PACKET_OCTETS,
        }
    }
}

impl RateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.reset_headroom.is_finite() && self.reset_headroom >= 1.0) {
            return Err(ConfigError::InvalidRateSetting(format!(
                "reset headroom must be >= 1.0, got {}",
                self.reset_headroom
            )));
        }
        if self.mean_packet_octets == 0 {
            return Err(ConfigError::InvalidRateSetting(
                "mean packet size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rates derived from one usable sample pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairRates {
    pub elapsed_secs: f64,
    pub in_octets: u64,
    pub out_octets: u64,
    pub in_errors: u64,
    pub out_errors: u64,
    pub in_bps: f64,
    pub out_bps: f64,
    pub in_util_percent: Option<f64>,
    pub out_util_percent: Option<f64>,
    pub in_error_rate_percent: Option<f64>,
    pub out_error_rate_percent: Option<f64>,
    /// Errors in both directions over traffic in both directions
    pub error_rate_percent: Option<f64>,
    /// At least one counter wrapped between the two samples
    pub wrapped: bool,
}

/// One of the four cumulative counters of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    InOctets,
    OutOctets,
    InErrors,
    OutErrors,
}

impl CounterField {
    pub fn as_str(self) -> &'static str {
        match self {
            CounterField::InOctets => "in_octets",
            CounterField::OutOctets => "out_octets",
            CounterField::InErrors => "in_errors",
            CounterField::OutErrors => "out_errors",
        }
    }

    /// This counter's reading in `sample`
    pub fn read(self, sample: &Sample) -> u64 {
        match self {
            CounterField::InOctets => sample.in_octets,
            CounterField::OutOctets => sample.out_octets,
            CounterField::InErrors => sample.in_errors,
            CounterField::OutErrors => sample.out_errors,
        }
    }
}

/// Result of evaluating a sample pair
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Usable(PairRates),
    /// Samples are not strictly ordered in time, or belong to different interfaces
    OutOfOrder,
    /// The named counter went backwards by more than a wrap can explain
    CounterReset(CounterField),
}

impl PairOutcome {
    pub fn rates(&self) -> Option<&PairRates> {
        match self {
            PairOutcome::Usable(rates) => Some(rates),
            _ => None,
        }
    }
}

/// Pure rate computation over sample pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct RateEngine {
    config: RateConfig,
}

impl RateEngine {
    pub fn new(config: RateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Evaluate the pair `(prev, curr)`
    pub fn compute(&self, prev: &Sample, curr: &Sample) -> PairOutcome {
        if prev.if_index != curr.if_index {
            return PairOutcome::OutOfOrder;
        }

        let elapsed = curr.sample_time - prev.sample_time;
        let elapsed_secs = elapsed
            .num_microseconds()
            .map(|us| us as f64 / 1_000_000.0)
            .unwrap_or_else(|| elapsed.num_seconds() as f64);
        if elapsed_secs <= 0.0 {
            return PairOutcome::OutOfOrder;
        }

        let speed = curr.if_speed_bps;
        let deltas = (
            self.octet_delta(prev.in_octets, curr.in_octets, speed, elapsed_secs)
                .ok_or(CounterField::InOctets),
            self.octet_delta(prev.out_octets, curr.out_octets, speed, elapsed_secs)
                .ok_or(CounterField::OutOctets),
            self.error_delta(prev.in_errors, curr.in_errors)
                .ok_or(CounterField::InErrors),
            self.error_delta(prev.out_errors, curr.out_errors)
                .ok_or(CounterField::OutErrors),
        );
        // A reboot resets every counter, so one implausible delta voids the pair
        let (in_oct, out_oct, in_err, out_err) = match deltas {
            (Ok(in_oct), Ok(out_oct), Ok(in_err), Ok(out_err)) => {
                (in_oct, out_oct, in_err, out_err)
            }
            (Err(field), ..)
            | (_, Err(field), ..)
            | (_, _, Err(field), _)
            | (.., Err(field)) => return PairOutcome::CounterReset(field),
        };

        let in_bps = in_oct.value() as f64 * 8.0 / elapsed_secs;
        let out_bps = out_oct.value() as f64 * 8.0 / elapsed_secs;

        PairOutcome::Usable(PairRates {
            elapsed_secs,
            in_octets: in_oct.value(),
            out_octets: out_oct.value(),
            in_errors: in_err.value(),
            out_errors: out_err.value(),
            in_bps,
            out_bps,
            in_util_percent: utilization(in_bps, speed),
            out_util_percent: utilization(out_bps, speed),
            in_error_rate_percent: self.error_rate(in_err.value(), in_oct.value()),
            out_error_rate_percent: self.error_rate(out_err.value(), out_oct.value()),
            error_rate_percent: self.error_rate(
                in_err.value().saturating_add(out_err.value()),
                in_oct.value().saturating_add(out_oct.value()),
            ),
            wrapped: [in_oct, out_oct, in_err, out_err]
                .iter()
                .any(|d| d.is_wrapped()),
        })
    }

    fn octet_delta(
        &self,
        prev: u64,
        curr: u64,
        speed_bps: u64,
        elapsed_secs: f64,
    ) -> Option<CounterDelta> {
        let delta = counter_delta(prev, curr, self.config.width)?;
        let CounterDelta::Wrapped(value) = delta else {
            return Some(delta);
        };

        let plausible = if speed_bps > 0 {
            let max_octets = speed_bps as f64 / 8.0 * elapsed_secs * self.config.reset_headroom;
            value as f64 <= max_octets
        } else {
            u128::from(value) <= self.config.width.modulus() / 2
        };
        plausible.then_some(delta)
    }

    fn error_delta(&self, prev: u64, curr: u64) -> Option<CounterDelta> {
        let delta = counter_delta(prev, curr, self.config.width)?;
        match delta {
            CounterDelta::Wrapped(value)
                if u128::from(value) > self.config.width.modulus() / 2 =>
            {
                None
            }
            _ => Some(delta),
        }
    }

    /// Errors as a percentage of the estimated packets over the same interval
    fn error_rate(&self, errors: u64, octets: u64) -> Option<f64> {
        if octets == 0 {
            return (errors == 0).then_some(0.0);
        }
        let packets = octets.div_ceil(self.config.mean_packet_octets.max(1)).max(1);
        Some((errors as f64 / packets as f64 * 100.0).min(100.0))
    }
}

fn utilization(bps: f64, speed_bps: u64) -> Option<f64> {
    if speed_bps == 0 {
        return None;
    }
    Some((bps / speed_bps as f64 * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IfStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn sample(secs: i64, in_octets: u64, out_octets: u64, speed: u64) -> Sample {
        Sample {
            if_index: 1,
            if_name: "eth0".to_string(),
            admin_status: IfStatus::Up,
            oper_status: IfStatus::Up,
            in_octets,
            out_octets,
            in_errors: 0,
            out_errors: 0,
            if_speed_bps: speed,
            sample_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_counter_delta_direct() {
        for (prev, curr) in [(0u64, 0u64), (10, 25), (4_000_000_000, 4_294_967_295)] {
            let delta = counter_delta(prev, curr, CounterWidth::Bits32).unwrap();
            assert_eq!(delta, CounterDelta::Direct(curr - prev));
        }
    }

    #[test]
    fn test_counter_delta_single_wrap_32() {
        let delta = counter_delta(4_294_967_290, 50, CounterWidth::Bits32).unwrap();
        assert_eq!(delta, CounterDelta::Wrapped(56));

        let delta = counter_delta(4_294_967_295, 0, CounterWidth::Bits32).unwrap();
        assert_eq!(delta.value(), 1);
    }

    #[test]
    fn test_counter_delta_single_wrap_64() {
        let delta = counter_delta(u64::MAX - 9, 5, CounterWidth::Bits64).unwrap();
        assert_eq!(delta, CounterDelta::Wrapped(15));
    }

    #[test]
    fn test_counter_delta_prev_outside_width() {
        assert_eq!(counter_delta(5_000_000_000, 10, CounterWidth::Bits32), None);
    }

    #[test]
    fn test_wrapped_pair_rate() {
        let engine = RateEngine::default();
        let prev = sample(0, 4_294_967_290, 100, 0);
        let curr = sample(10, 50, 100, 0);

        let rates = engine.compute(&prev, &curr).rates().cloned().unwrap();
        assert_eq!(rates.in_octets, 56);
        assert!((rates.in_bps - 44.8).abs() < 1e-9);
        assert!(rates.wrapped);
        assert_eq!(rates.in_util_percent, None);
    }

    #[test]
    fn test_out_of_order_pair_rejected() {
        let engine = RateEngine::default();
        let a = sample(10, 100, 100, 1_000_000);
        let b = sample(10, 200, 200, 1_000_000);
        let c = sample(5, 300, 300, 1_000_000);

        assert_eq!(engine.compute(&a, &b), PairOutcome::OutOfOrder);
        assert_eq!(engine.compute(&a, &c), PairOutcome::OutOfOrder);
    }

    #[test]
    fn test_mismatched_interfaces_rejected() {
        let engine = RateEngine::default();
        let a = sample(0, 100, 100, 0);
        let mut b = sample(10, 200, 200, 0);
        b.if_index = 2;

        assert_eq!(engine.compute(&a, &b), PairOutcome::OutOfOrder);
    }

    #[test]
    fn test_reset_detected_with_known_speed() {
        let engine = RateEngine::default();
        // Counter dropped from 2e9 to 1000: a wrap would imply ~2.3 GB in 10s on 100 Mbit/s
        let prev = sample(0, 2_000_000_000, 5_000, 100_000_000);
        let curr = sample(10, 1_000, 6_000, 100_000_000);

        assert_eq!(
            engine.compute(&prev, &curr),
            PairOutcome::CounterReset(CounterField::InOctets)
        );
    }

    #[test]
    fn test_reset_detected_without_speed() {
        let engine = RateEngine::default();
        let prev = sample(0, 1_000_000, 5_000, 0);
        let curr = sample(10, 100, 6_000, 0);

        assert_eq!(
            engine.compute(&prev, &curr),
            PairOutcome::CounterReset(CounterField::InOctets)
        );
    }

    #[test]
    fn test_reset_names_the_counter_that_tripped() {
        let engine = RateEngine::default();
        let prev = sample(0, 1_000, 2_000_000_000, 100_000_000);
        let curr = sample(10, 2_000, 1_000, 100_000_000);

        let outcome = engine.compute(&prev, &curr);
        assert_eq!(outcome, PairOutcome::CounterReset(CounterField::OutOctets));
        assert_eq!(CounterField::OutOctets.read(&prev), 2_000_000_000);
        assert_eq!(CounterField::OutOctets.as_str(), "out_octets");
    }

    #[test]
    fn test_error_counter_reset_voids_pair() {
        let engine = RateEngine::default();
        let mut prev = sample(0, 1_000, 1_000, 100_000_000);
        prev.in_errors = 500;
        let mut curr = sample(10, 2_000, 2_000, 100_000_000);
        curr.in_errors = 3;

        assert_eq!(
            engine.compute(&prev, &curr),
            PairOutcome::CounterReset(CounterField::InErrors)
        );
    }

    #[test]
    fn test_utilization_clamped() {
        let engine = RateEngine::default();
        // 100 Mbit/s link, 150 MB in 10s => 120% raw, under the 1.5x reset headroom
        let prev = sample(0, 0, 0, 100_000_000);
        let curr = sample(10, 150_000_000, 12_500_000, 100_000_000);

        let rates = engine.compute(&prev, &curr).rates().cloned().unwrap();
        assert_eq!(rates.in_util_percent, Some(100.0));
        assert!((rates.out_util_percent.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_utilization_always_in_range() {
        let engine = RateEngine::default();
        let prev = sample(0, 0, 0, 1_000);
        for octets in [0u64, 1, 10, 1_250, 10_000, 1_000_000] {
            let curr = sample(10, octets, octets, 1_000);
            if let PairOutcome::Usable(rates) = engine.compute(&prev, &curr) {
                let util = rates.in_util_percent.unwrap();
                assert!((0.0..=100.0).contains(&util));
            }
        }
    }

    #[test]
    fn test_error_rate_from_packet_estimate() {
        let engine = RateEngine::default();
        let prev = sample(0, 0, 0, 0);
        let mut curr = sample(10, 150_000, 0, 0);
        curr.in_errors = 5;

        let rates = engine.compute(&prev, &curr).rates().cloned().unwrap();
        // 150_000 octets / 1500 = 100 packets, 5 errors => 5%
        assert_eq!(rates.in_error_rate_percent, Some(5.0));
        assert_eq!(rates.error_rate_percent, Some(5.0));
    }

    #[test]
    fn test_error_rate_without_traffic() {
        let engine = RateEngine::default();
        let prev = sample(0, 100, 100, 0);

        let idle = sample(10, 100, 100, 0);
        let rates = engine.compute(&prev, &idle).rates().cloned().unwrap();
        assert_eq!(rates.in_error_rate_percent, Some(0.0));

        let mut erroring = sample(10, 100, 100, 0);
        erroring.out_errors = 3;
        let rates = engine.compute(&prev, &erroring).rates().cloned().unwrap();
        assert_eq!(rates.out_error_rate_percent, None);
        assert_eq!(rates.error_rate_percent, None);
    }

    #[test]
    fn test_octet_ratio_with_unit_packet_size() {
        let engine = RateEngine::new(RateConfig {
            mean_packet_octets: 1,
            ..RateConfig::default()
        });
        let prev = sample(0, 0, 0, 0);
        let mut curr = sample(10, 1_000, 0, 0);
        curr.in_errors = 10;

        let rates = engine.compute(&prev, &curr).rates().cloned().unwrap();
        assert_eq!(rates.in_error_rate_percent, Some(1.0));
    }

    #[test]
    fn test_rate_config_validation() {
        assert!(RateConfig::default().validate().is_ok());
        let bad = RateConfig {
            reset_headroom: 0.5,
            ..RateConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = RateConfig {
            mean_packet_octets: 0,
            ..RateConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_counter_width_from_bits() {
        assert_eq!(CounterWidth::from_bits(32), Ok(CounterWidth::Bits32));
        assert_eq!(CounterWidth::from_bits(64), Ok(CounterWidth::Bits64));
        assert_eq!(
            CounterWidth::from_bits(16),
            Err(ConfigError::UnsupportedCounterWidth(16))
        );
        assert_eq!(CounterWidth::Bits32.reduce(1u128 << 32 | 7), 7);
    }
}
