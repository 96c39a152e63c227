//! Interface counter sources
//!
//! A counter source produces one raw snapshot per interface index. Two
//! implementations exist: an SNMPv2c client reading the IF-MIB interface
//! table from a real device, and a deterministic synthetic generator for
//! running the pipeline without one. The variant is chosen once, when
//! the source is created.

pub mod ber;
mod snmp;
mod synthetic;

pub use snmp::{SnmpSource, SnmpTarget};
pub use synthetic::SyntheticSource;

use crate::config::MonitorConfig;
use crate::error::SourceError;
use crate::models::{IfIndex, RawCounters};
use std::sync::Arc;

pub use async_trait::async_trait;

/// Trait for interface counter retrieval
#[async_trait]
pub trait CounterSource: Send + Sync {
    /// Read the current counters of one interface
    async fn snapshot(&self, if_index: IfIndex) -> Result<RawCounters, SourceError>;

    /// Short name of the implementation, used in logs
    fn kind(&self) -> &'static str;
}

/// Create the counter source selected by the configuration
pub fn create_source(config: &MonitorConfig) -> Arc<dyn CounterSource> {
    if config.use_synthetic_source {
        tracing::info!("Using synthetic counter source");
        Arc::new(SyntheticSource::new(config.counter_width()))
    } else {
        let target = SnmpTarget::from_config(config);
        tracing::info!(
            device = %target.address,
            timeout_ms = target.timeout.as_millis() as u64,
            retries = target.retries,
            "Using SNMPv2c counter source"
        );
        Arc::new(SnmpSource::new(target))
    }
}
