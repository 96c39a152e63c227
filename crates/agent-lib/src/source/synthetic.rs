//! Deterministic synthetic counters
//!
//! Every interface gets a smooth, periodic load profile derived from its
//! index. Counters are the integral of that profile since a fixed epoch,
//! reduced to the configured counter width, so they wrap the way a real
//! agent's counters do. The same instant always yields the same snapshot.

use super::CounterSource;
use crate::error::SourceError;
use crate::models::{IfIndex, IfStatus, RawCounters};
use crate::rate::CounterWidth;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::f64::consts::TAU;

/// 2024-01-01T00:00:00Z in milliseconds
const EPOCH_MS: i64 = 1_704_067_200_000;

const FAST_SPEED_BPS: u64 = 1_000_000_000;
const SLOW_SPEED_BPS: u64 = 100_000_000;

/// Relative swing of the load around its base
const LOAD_AMPLITUDE: f64 = 0.3;

#[derive(Debug, Clone, Copy)]
pub struct SyntheticSource {
    width: CounterWidth,
}

impl SyntheticSource {
    pub fn new(width: CounterWidth) -> Self {
        Self { width }
    }

    /// Counters of `if_index` as they read at `now`
    pub fn snapshot_at(&self, if_index: IfIndex, now: DateTime<Utc>) -> RawCounters {
        let profile = Profile::for_index(if_index);
        let t = seconds_since_epoch(now);

        let in_octets = profile.octets(profile.in_load, t);
        let out_octets = profile.octets(profile.in_load * 0.6, t);
        let in_errors = (t / profile.error_period_secs).floor() as u128;
        let out_errors = (t / (profile.error_period_secs * 3.0)).floor() as u128;

        RawCounters {
            if_index,
            if_name: format!("synthetic-if{}", if_index),
            admin_status: IfStatus::Up,
            oper_status: profile.oper_status(t),
            in_octets: self.width.reduce(in_octets),
            out_octets: self.width.reduce(out_octets),
            in_errors: self.width.reduce(in_errors),
            out_errors: self.width.reduce(out_errors),
            if_speed_bps: profile.speed_bps,
        }
    }
}

#[async_trait]
impl CounterSource for SyntheticSource {
    async fn snapshot(&self, if_index: IfIndex) -> Result<RawCounters, SourceError> {
        Ok(self.snapshot_at(if_index, Utc::now()))
    }

    fn kind(&self) -> &'static str {
        "synthetic"
    }
}

fn seconds_since_epoch(now: DateTime<Utc>) -> f64 {
    ((now.timestamp_millis() - EPOCH_MS).max(0)) as f64 / 1000.0
}

struct Profile {
    if_index: IfIndex,
    speed_bps: u64,
    /// Mean inbound load as a fraction of link speed
    in_load: f64,
    load_period_secs: f64,
    error_period_secs: f64,
}

impl Profile {
    fn for_index(if_index: IfIndex) -> Self {
        Self {
            if_index,
            speed_bps: if if_index % 3 == 0 {
                FAST_SPEED_BPS
            } else {
                SLOW_SPEED_BPS
            },
            in_load: 0.10 + 0.15 * f64::from(if_index % 5),
            load_period_secs: 3600.0 + 600.0 * f64::from(if_index % 7),
            error_period_secs: 900.0 + 300.0 * f64::from(if_index % 4),
        }
    }

    /// Octets transferred in `[0, t]` at `load * speed * (1 + A sin(2πt/P))`
    fn octets(&self, load: f64, t: f64) -> u128 {
        let bytes_per_sec = self.speed_bps as f64 * load / 8.0;
        let p = self.load_period_secs;
        let swing = LOAD_AMPLITUDE * p / TAU * (1.0 - (TAU * t / p).cos());
        (bytes_per_sec * (t + swing)).floor() as u128
    }

    /// Fast links drop for one minute every hour
    fn oper_status(&self, t: f64) -> IfStatus {
        let minute_of_hour = ((t / 60.0).floor() as u64) % 60;
        if self.if_index % 3 == 0 && minute_of_hour == u64::from(self.if_index % 60) {
            IfStatus::Down
        } else {
            IfStatus::Up
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;
    use crate::rate::{PairOutcome, RateConfig, RateEngine};
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let source = SyntheticSource::new(CounterWidth::Bits64);
        assert_eq!(source.snapshot_at(2, at(0)), source.snapshot_at(2, at(0)));
        assert_ne!(source.snapshot_at(2, at(0)), source.snapshot_at(2, at(10)));
    }

    #[test]
    fn test_counters_never_decrease_at_full_width() {
        let source = SyntheticSource::new(CounterWidth::Bits64);
        let mut prev = source.snapshot_at(4, at(0));
        for step in 1..200 {
            let curr = source.snapshot_at(4, at(step * 37));
            assert!(curr.in_octets >= prev.in_octets);
            assert!(curr.out_octets >= prev.out_octets);
            assert!(curr.in_errors >= prev.in_errors);
            prev = curr;
        }
    }

    #[test]
    fn test_rates_stay_within_link_speed() {
        let engine = RateEngine::new(RateConfig {
            width: CounterWidth::Bits32,
            ..RateConfig::default()
        });
        let source = SyntheticSource::new(CounterWidth::Bits32);

        for if_index in 1..=12 {
            for step in 0..30 {
                let t0 = at(step * 120);
                let t1 = t0 + Duration::seconds(10);
                let prev = Sample::from_counters(source.snapshot_at(if_index, t0), t0);
                let curr = Sample::from_counters(source.snapshot_at(if_index, t1), t1);

                match engine.compute(&prev, &curr) {
                    PairOutcome::Usable(rates) => {
                        let util = rates.in_util_percent.unwrap();
                        assert!(util > 0.0 && util <= 100.0, "if {} util {}", if_index, util);
                    }
                    other => panic!("if {} unexpected outcome {:?}", if_index, other),
                }
            }
        }
    }

    #[test]
    fn test_profile_speeds_and_names() {
        let source = SyntheticSource::new(CounterWidth::Bits32);
        let fast = source.snapshot_at(3, at(0));
        let slow = source.snapshot_at(1, at(0));

        assert_eq!(fast.if_speed_bps, 1_000_000_000);
        assert_eq!(slow.if_speed_bps, 100_000_000);
        assert_eq!(slow.if_name, "synthetic-if1");
        assert_eq!(slow.admin_status, IfStatus::Up);
    }

    #[test]
    fn test_fast_link_flaps_once_per_hour() {
        let source = SyntheticSource::new(CounterWidth::Bits32);
        let down_minutes = (0..60)
            .filter(|m| source.snapshot_at(3, at(m * 60 + 30)).oper_status == IfStatus::Down)
            .count();
        assert_eq!(down_minutes, 1);

        let always_up = (0..60).all(|m| source.snapshot_at(2, at(m * 60 + 30)).oper_status.is_up());
        assert!(always_up);
    }

    #[tokio::test]
    async fn test_snapshot_never_fails() {
        let source = SyntheticSource::new(CounterWidth::Bits64);
        let raw = source.snapshot(7).await.unwrap();
        assert_eq!(raw.if_index, 7);
    }
}
