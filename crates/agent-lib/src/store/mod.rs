//! Append-only sample storage
//!
//! The pipeline only depends on the [`SampleStore`] contract: ordered
//! appends per interface, the newest sample per interface, and time-range
//! queries. Two engines are provided: an in-memory map and a JSON-lines
//! log that is replayed into memory on open.

mod file;
mod memory;

pub use file::FileSampleStore;
pub use memory::MemorySampleStore;

use crate::error::StoreError;
use crate::models::{IfIndex, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only log of interface samples
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Append one sample. Samples are never updated or removed.
    async fn append(&self, sample: Sample) -> Result<(), StoreError>;

    /// Exactly one newest sample per interface, ascending by ifIndex
    async fn latest_per_key(&self) -> Result<Vec<Sample>, StoreError>;

    /// Samples for `if_index` with `since <= sample_time <= until`, oldest first
    async fn range_for_key(
        &self,
        if_index: IfIndex,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError>;

    /// The newest `count` samples for `if_index`, oldest first
    async fn tail_for_key(
        &self,
        if_index: IfIndex,
        count: usize,
    ) -> Result<Vec<Sample>, StoreError> {
        let mut samples = self
            .range_for_key(if_index, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .await?;
        let skip = samples.len().saturating_sub(count);
        samples.drain(..skip);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests;
