//! Immutable monitor configuration
//!
//! Built once at startup (the agent binary loads it from files and
//! environment) and passed explicitly into the source, poller and
//! query service.

use crate::classifier::Thresholds;
use crate::error::ConfigError;
use crate::models::IfIndex;
use crate::rate::{CounterWidth, RateConfig};
use std::collections::BTreeSet;
use std::time::Duration;

/// Validated configuration for one monitored device
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Host name or IP address of the polled device
    pub target_address: String,
    pub target_port: u16,
    /// SNMPv2c community string
    pub community: String,
    pub interface_indexes: BTreeSet<IfIndex>,
    pub poll_interval: Duration,
    pub use_synthetic_source: bool,
    pub snmp_timeout: Duration,
    pub snmp_retries: u32,
    /// Upper bound on concurrent snapshot calls within one tick
    pub max_concurrent_polls: usize,
    pub thresholds: Thresholds,
    pub rate: RateConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_address: "127.0.0.1".to_string(),
            target_port: 161,
            community: "public".to_string(),
            interface_indexes: BTreeSet::from([1]),
            poll_interval: Duration::from_secs(10),
            use_synthetic_source: true,
            snmp_timeout: Duration::from_secs(1),
            snmp_retries: 1,
            max_concurrent_polls: 4,
            thresholds: Thresholds::default(),
            rate: RateConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface_indexes.is_empty() {
            return Err(ConfigError::NoInterfaces);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_concurrent_polls == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if !self.use_synthetic_source && self.target_address.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        self.thresholds.validate()?;
        self.rate.validate()?;
        Ok(())
    }

    /// `host:port` of the polled device
    pub fn target(&self) -> String {
        if self.target_address.contains(':') && !self.target_address.starts_with('[') {
            format!("[{}]:{}", self.target_address, self.target_port)
        } else {
            format!("{}:{}", self.target_address, self.target_port)
        }
    }

    pub fn counter_width(&self) -> CounterWidth {
        self.rate.width
    }
}
