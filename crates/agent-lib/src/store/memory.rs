//! In-memory sample store

use super::SampleStore;
use crate::error::StoreError;
use crate::models::{IfIndex, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Sample series keyed by ifIndex.
///
/// Each append happens under the shard write lock of its series, so a
/// reader sees either the whole sample or none of it.
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    series: DashMap<IfIndex, Vec<Sample>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored samples
    pub fn len(&self) -> usize {
        self.series.iter().map(|s| s.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.value().is_empty())
    }

    pub(crate) fn insert(&self, sample: Sample) {
        self.series.entry(sample.if_index).or_default().push(sample);
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn append(&self, sample: Sample) -> Result<(), StoreError> {
        self.insert(sample);
        Ok(())
    }

    async fn latest_per_key(&self) -> Result<Vec<Sample>, StoreError> {
        let mut latest: Vec<Sample> = self
            .series
            .iter()
            // max_by_key keeps the last of equal maxima, i.e. the later insertion
            .filter_map(|series| series.value().iter().max_by_key(|s| s.sample_time).cloned())
            .collect();
        latest.sort_by_key(|s| s.if_index);
        Ok(latest)
    }

    async fn range_for_key(
        &self,
        if_index: IfIndex,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        let mut range: Vec<Sample> = self
            .series
            .get(&if_index)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.sample_time >= since && s.sample_time <= until)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Wall-clock stamps can step backwards; ties keep insertion order
        range.sort_by_key(|s| s.sample_time);
        Ok(range)
    }

    async fn tail_for_key(
        &self,
        if_index: IfIndex,
        count: usize,
    ) -> Result<Vec<Sample>, StoreError> {
        let mut series = self
            .series
            .get(&if_index)
            .map(|series| series.value().clone())
            .unwrap_or_default();
        series.sort_by_key(|s| s.sample_time);
        let skip = series.len().saturating_sub(count);
        series.drain(..skip);
        Ok(series)
    }
}
