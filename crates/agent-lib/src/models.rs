//! Core data models for interface health monitoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of one monitored interface (IF-MIB ifIndex)
pub type IfIndex = u32;

/// Administrative / operational interface status as defined by IF-MIB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfStatus {
    Up,
    Down,
    Testing,
    Unknown,
    Dormant,
    NotPresent,
    LowerLayerDown,
}

impl IfStatus {
    /// Map an IF-MIB enumeration value to a status
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(IfStatus::Up),
            2 => Some(IfStatus::Down),
            3 => Some(IfStatus::Testing),
            4 => Some(IfStatus::Unknown),
            5 => Some(IfStatus::Dormant),
            6 => Some(IfStatus::NotPresent),
            7 => Some(IfStatus::LowerLayerDown),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            IfStatus::Up => 1,
            IfStatus::Down => 2,
            IfStatus::Testing => 3,
            IfStatus::Unknown => 4,
            IfStatus::Dormant => 5,
            IfStatus::NotPresent => 6,
            IfStatus::LowerLayerDown => 7,
        }
    }

    pub fn is_up(self) -> bool {
        self == IfStatus::Up
    }
}

/// Raw counter snapshot for one interface, as returned by a counter source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCounters {
    pub if_index: IfIndex,
    pub if_name: String,
    pub admin_status: IfStatus,
    pub oper_status: IfStatus,
    pub in_octets: u64,
    pub out_octets: u64,
    pub in_errors: u64,
    pub out_errors: u64,
    /// Nominal link capacity in bits per second, 0 when unknown
    pub if_speed_bps: u64,
}

/// One stored poll result. Immutable once appended to a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub if_index: IfIndex,
    pub if_name: String,
    pub admin_status: IfStatus,
    pub oper_status: IfStatus,
    pub in_octets: u64,
    pub out_octets: u64,
    pub in_errors: u64,
    pub out_errors: u64,
    pub if_speed_bps: u64,
    pub sample_time: DateTime<Utc>,
}

impl Sample {
    /// Stamp a snapshot with the time it was taken
    pub fn from_counters(raw: RawCounters, sample_time: DateTime<Utc>) -> Self {
        Self {
            if_index: raw.if_index,
            if_name: raw.if_name,
            admin_status: raw.admin_status,
            oper_status: raw.oper_status,
            in_octets: raw.in_octets,
            out_octets: raw.out_octets,
            in_errors: raw.in_errors,
            out_errors: raw.out_errors,
            if_speed_bps: raw.if_speed_bps,
            sample_time,
        }
    }
}

/// Interface health classification, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Warn,
    Critical,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Warn => "WARN",
            HealthStatus::Critical => "CRITICAL",
        }
    }
}

/// Metrics derived from a sample and its predecessor. Never persisted.
///
/// Rate fields are `None` when there was no usable previous sample, and
/// utilization is `None` when the link speed is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub if_index: IfIndex,
    pub in_bps: Option<f64>,
    pub out_bps: Option<f64>,
    pub in_util_percent: Option<f64>,
    pub out_util_percent: Option<f64>,
    pub in_error_rate_percent: Option<f64>,
    pub out_error_rate_percent: Option<f64>,
    /// Seconds between the two samples the rates came from
    pub elapsed_secs: Option<f64>,
    pub status: HealthStatus,
}

/// Per-interface KPIs over one query window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryKpi {
    pub if_index: IfIndex,
    /// Name reported by the newest sample in the window
    pub if_name: Option<String>,
    pub sample_count: usize,
    /// Consecutive pairs that produced usable rates
    pub pair_count: usize,
    pub availability_percent: f64,
    pub error_rate_percent: f64,
    pub mean_in_util_percent: Option<f64>,
    pub mean_out_util_percent: Option<f64>,
    pub first_sample_time: Option<DateTime<Utc>>,
    pub last_sample_time: Option<DateTime<Utc>>,
    /// Set when the window held no samples at all
    pub no_data: bool,
}
