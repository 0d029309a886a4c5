use crate::TimeSeriesStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regway_error::StorageResult;
use regway_models::{constants::DEVICE_TAG, domain::prelude::HistoryRecord};
use std::collections::VecDeque;

/// Points kept per measurement before the oldest are discarded.
pub const DEFAULT_RETENTION_POINTS: usize = 100_000;

/// Process-local store used when no external time-series database is configured.
pub struct MemoryStore {
    series: DashMap<String, VecDeque<HistoryRecord>>,
    retention: usize,
}

impl MemoryStore {
    pub fn new(retention: usize) -> Self {
        Self {
            series: DashMap::new(),
            retention: retention.max(1),
        }
    }

    pub fn point_count(&self, measurement: &str) -> usize {
        self.series.get(measurement).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_POINTS)
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    async fn write_point(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, f64)],
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let device = tags
            .iter()
            .find(|(k, _)| *k == DEVICE_TAG)
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        let mut series = self.series.entry(measurement.to_string()).or_default();
        for (field, value) in fields {
            series.push_back(HistoryRecord {
                field: field.to_string(),
                value: *value,
                device: device.clone(),
                time: timestamp,
            });
        }
        while series.len() > self.retention {
            series.pop_front();
        }
        Ok(())
    }

    async fn query_range(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<HistoryRecord>> {
        let mut rows: Vec<HistoryRecord> = self
            .series
            .get(measurement)
            .map(|s| {
                s.iter()
                    .filter(|r| r.time >= start && r.time < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.time);
        Ok(rows)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Store that accepts and discards every point.
#[derive(Debug, Default)]
pub struct DisabledStore;

#[async_trait]
impl TimeSeriesStore for DisabledStore {
    async fn write_point(
        &self,
        _measurement: &str,
        _tags: &[(&str, &str)],
        _fields: &[(&str, f64)],
        _timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn query_range(
        &self,
        _measurement: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> StorageResult<Vec<HistoryRecord>> {
        Ok(Vec::new())
    }

    fn kind(&self) -> &'static str {
        "disabled"
    }
}
