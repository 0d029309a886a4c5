//! Durable store collaborator: the time-series sink observations are
//! persisted to and history is queried from.
pub mod influx;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use influx::InfluxStore;
use memory::{DisabledStore, MemoryStore};
use regway_error::{init::InitContextError, RGResult, StorageResult};
use regway_models::{
    domain::prelude::HistoryRecord,
    settings::{Store, StoreKind},
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Append-only time-series store.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync + 'static {
    /// Persist one point; timestamps are the observation's `captured_at`.
    async fn write_point(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, f64)],
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Points of `measurement` in `[start, end)`, ascending by time.
    ///
    /// No matching points is an empty result, not an error.
    async fn query_range(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<HistoryRecord>>;

    fn kind(&self) -> &'static str;
}

/// Build the configured store.
#[instrument(name = "init-store", skip_all, fields(kind = ?cfg.kind))]
pub fn init_store(cfg: &Store) -> RGResult<Arc<dyn TimeSeriesStore>, InitContextError> {
    let store: Arc<dyn TimeSeriesStore> = match cfg.kind {
        StoreKind::Influx => Arc::new(InfluxStore::new(cfg)?),
        StoreKind::Memory => Arc::new(MemoryStore::default()),
        StoreKind::Disabled => Arc::new(DisabledStore),
    };
    info!(store = store.kind(), bucket = %cfg.bucket, "Time-series store initialized");
    Ok(store)
}
