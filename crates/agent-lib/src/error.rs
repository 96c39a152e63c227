//! Error types shared across the collection pipeline

use crate::models::IfIndex;
use thiserror::Error;

/// Failures of a counter source call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("no response from {target} after {attempts} attempt(s)")]
    Timeout { target: String, attempts: u32 },

    #[error("target {target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("malformed response for ifIndex {if_index}: {reason}")]
    MalformedResponse { if_index: IfIndex, reason: String },
}

impl SourceError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Timeout { .. } => "timeout",
            SourceError::Unreachable { .. } => "unreachable",
            SourceError::MalformedResponse { .. } => "malformed_response",
        }
    }

    pub(crate) fn malformed(if_index: IfIndex, reason: impl Into<String>) -> Self {
        SourceError::MalformedResponse {
            if_index,
            reason: reason.into(),
        }
    }
}

/// Failures of the sample store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to append sample for ifIndex {if_index}: {reason}")]
    WriteFailure { if_index: IfIndex, reason: String },

    #[error("failed to open sample log {path}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid monitor configuration
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one interface index must be configured")]
    NoInterfaces,

    #[error("poll interval must be positive")]
    ZeroPollInterval,

    #[error("max concurrent polls must be at least 1")]
    ZeroConcurrency,

    #[error("target address must not be empty")]
    EmptyTarget,

    #[error("unsupported counter width {0} (expected 32 or 64)")]
    UnsupportedCounterWidth(u32),

    #[error("invalid utilization thresholds: warn {warn}%, critical {critical}%")]
    InvalidThresholds { warn: f64, critical: f64 },

    #[error("invalid rate engine setting: {0}")]
    InvalidRateSetting(String),
}
