//! Agent configuration

use anyhow::{Context, Result};
use netpulse_lib::{
    classifier::Thresholds,
    config::MonitorConfig,
    rate::{CounterWidth, RateConfig},
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "NETPULSE";
const DEFAULT_CONFIG_FILE: &str = "netpulse";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Host name or address of the polled device
    #[serde(default = "default_target_address")]
    pub target_address: String,

    #[serde(default = "default_target_port")]
    pub target_port: u16,

    #[serde(default = "default_community")]
    pub community: String,

    #[serde(default = "default_interface_indexes")]
    pub interface_indexes: Vec<u32>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Generate counters instead of polling a device
    #[serde(default = "default_use_synthetic_source")]
    pub use_synthetic_source: bool,

    #[serde(default = "default_snmp_timeout")]
    pub snmp_timeout_ms: u64,

    #[serde(default = "default_snmp_retries")]
    pub snmp_retries: u32,

    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,

    /// 32 or 64
    #[serde(default = "default_counter_width_bits")]
    pub counter_width_bits: u32,

    #[serde(default = "default_warn_util")]
    pub warn_util_percent: f64,

    #[serde(default = "default_critical_util")]
    pub critical_util_percent: f64,

    #[serde(default = "default_reset_headroom")]
    pub reset_headroom: f64,

    #[serde(default = "default_mean_packet_octets")]
    pub mean_packet_octets: u64,

    /// JSON-lines sample log; samples stay in memory when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_api_port() -> u16 {
    8080
}

fn default_target_address() -> String {
    "127.0.0.1".to_string()
}

fn default_target_port() -> u16 {
    161
}

fn default_community() -> String {
    "public".to_string()
}

fn default_interface_indexes() -> Vec<u32> {
    vec![1]
}

fn default_poll_interval() -> u64 {
    10
}

fn default_use_synthetic_source() -> bool {
    true
}

fn default_snmp_timeout() -> u64 {
    1000
}

fn default_snmp_retries() -> u32 {
    1
}

fn default_max_concurrent_polls() -> usize {
    4
}

fn default_counter_width_bits() -> u32 {
    32
}

fn default_warn_util() -> f64 {
    Thresholds::default().warn_util_percent
}

fn default_critical_util() -> f64 {
    Thresholds::default().critical_util_percent
}

fn default_reset_headroom() -> f64 {
    RateConfig::default().reset_headroom
}

fn default_mean_packet_octets() -> u64 {
    RateConfig::default().mean_packet_octets
}

impl AgentConfig {
    /// Load configuration from the optional config file and `NETPULSE_*` environment
    ///
    /// `NETPULSE_CONFIG` overrides the config file name.
    pub fn load() -> Result<Self> {
        let file = std::env::var(format!("{}_CONFIG", ENV_PREFIX))
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file, None)
    }

    /// Load from `file` (any supported extension, optional) layered under the
    /// environment. `env` replaces the process environment when given.
    pub fn load_from(file: &str, env: Option<config::Map<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("interface_indexes")
                    .source(env),
            )
            .build()
            .context("Failed to read configuration sources")?;

        config
            .try_deserialize()
            .context("Failed to parse agent configuration")
    }

    /// Validated monitor configuration for the library
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let width = CounterWidth::from_bits(self.counter_width_bits)?;

        let monitor = MonitorConfig {
            target_address: self.target_address.clone(),
            target_port: self.target_port,
            community: self.community.clone(),
            interface_indexes: self.interface_indexes.iter().copied().collect(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            use_synthetic_source: self.use_synthetic_source,
            snmp_timeout: Duration::from_millis(self.snmp_timeout_ms),
            snmp_retries: self.snmp_retries,
            max_concurrent_polls: self.max_concurrent_polls,
            thresholds: Thresholds {
                warn_util_percent: self.warn_util_percent,
                critical_util_percent: self.critical_util_percent,
            },
            rate: RateConfig {
                width,
                reset_headroom: self.reset_headroom,
                mean_packet_octets: self.mean_packet_octets,
            },
        };

        monitor.validate().context("Invalid monitor configuration")?;
        Ok(monitor)
    }
}
