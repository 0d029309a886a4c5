use crate::{cache::StateCache, realtime::RGRealtimeHub};
use regway_error::storage::StorageError;
use regway_models::{
    constants::DEVICE_TAG,
    domain::prelude::{DeviceConfig, DeviceStatus, Observation},
    RealtimeHub,
};
use regway_storage::TimeSeriesStore;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Routes each completed observation to the cache, the durable store and
/// live subscribers, in that order.
///
/// Store failures are logged and dropped: the cache and subscribers still see
/// the observation and the poll loop carries on.
pub struct ObservationFanout {
    cache: Arc<StateCache>,
    store: Arc<dyn TimeSeriesStore>,
    hub: Arc<RGRealtimeHub>,
    persist_timeout: Duration,
}

impl ObservationFanout {
    pub fn new(
        cache: Arc<StateCache>,
        store: Arc<dyn TimeSeriesStore>,
        hub: Arc<RGRealtimeHub>,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            hub,
            persist_timeout,
        }
    }

    #[inline]
    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Install a completed observation in the cache.
    ///
    /// Callers hold the device's transaction guard, so a concurrent write
    /// failure cannot be overwritten by an observation read before it.
    pub fn commit(&self, device: &DeviceConfig, mut observation: Observation) -> Arc<Observation> {
        // Keep captured_at non-decreasing per device even if the wall clock steps back.
        if let Some(prev) = self.cache.observation(&device.id) {
            if observation.captured_at < prev.captured_at {
                debug!(prev = %prev.captured_at, now = %observation.captured_at, "Clock went backwards, clamping");
                observation.captured_at = prev.captured_at;
            }
        }
        let observation = Arc::new(observation);
        self.cache.commit(&device.id, Arc::clone(&observation));
        observation
    }

    /// Persist a committed observation, then publish it to subscribers.
    #[instrument(level = "debug", skip_all, fields(device = %device.id))]
    pub async fn deliver(&self, device: &DeviceConfig, observation: &Arc<Observation>) {
        if let Err(e) = self.persist(device, observation).await {
            warn!(error = %e, "Observation not persisted");
        }
        self.hub.publish(observation);
    }

    /// Record a failed cycle or write without touching cached values.
    pub fn record_failure(&self, device_id: &str, error: impl ToString) {
        self.cache.mark_failure(device_id, DeviceStatus::Error, error);
    }

    async fn persist(&self, device: &DeviceConfig, observation: &Observation) -> Result<(), StorageError> {
        let fields: Vec<(&str, f64)> = observation.present_fields().collect();
        if fields.is_empty() {
            return Ok(());
        }
        let tags = [(DEVICE_TAG, device.display_name())];
        timeout(
            self.persist_timeout,
            self.store
                .write_point(device.measurement(), &tags, &fields, observation.captured_at),
        )
        .await
        .map_err(|_| StorageError::PersistenceTimeout(self.persist_timeout))?
    }
}
