//! Interface health monitoring library
//!
//! This crate provides the core functionality for:
//! - Polling interface counters over SNMPv2c or from a synthetic generator
//! - Append-only sample storage (in memory or as a JSON-lines log)
//! - Wrap-aware rate and utilization computation
//! - Window summaries and HEALTHY / WARN / CRITICAL classification
//! - Health checks and observability for the agent itself

pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod poller;
pub mod query;
pub mod rate;
pub mod source;
pub mod store;

pub use classifier::{classify, Thresholds};
pub use config::MonitorConfig;
pub use error::{ConfigError, SourceError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use poller::{CycleReport, Poller, PollerBuilder, PollerConfig};
pub use query::{InterfaceHealthService, InterfaceReport, SummaryWindow};
pub use rate::{CounterField, CounterWidth, PairOutcome, RateConfig, RateEngine};
pub use source::{create_source, CounterSource};
pub use store::{FileSampleStore, MemorySampleStore, SampleStore};
