//! Shared latest-state cache.
//!
//! One `ArcSwap` slot per device: readers load a complete snapshot without
//! locking, writers replace it whole, so a reader never sees fields from two
//! different cycles.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use regway_models::domain::prelude::{DeviceSnapshot, DeviceStatus, Observation};
use std::sync::Arc;

#[derive(Default)]
pub struct StateCache {
    devices: DashMap<String, ArcSwap<DeviceSnapshot>>,
}

impl StateCache {
    pub fn new<'a>(device_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let devices = DashMap::new();
        for id in device_ids {
            devices.insert(id.to_string(), ArcSwap::from_pointee(DeviceSnapshot::default()));
        }
        Self { devices }
    }

    /// Current snapshot; `None` for an unknown device.
    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceSnapshot>> {
        self.devices.get(device_id).map(|slot| slot.load_full())
    }

    /// Last completed observation, if any.
    pub fn observation(&self, device_id: &str) -> Option<Arc<Observation>> {
        self.get(device_id).and_then(|s| s.observation.clone())
    }

    /// Install a completed observation and mark the device connected.
    pub fn commit(&self, device_id: &str, observation: Arc<Observation>) {
        if let Some(slot) = self.devices.get(device_id) {
            slot.store(Arc::new(DeviceSnapshot {
                status: DeviceStatus::Connected,
                observation: Some(observation),
                last_error: None,
            }));
        }
    }

    /// Record a failure; previously cached values stay untouched.
    pub fn mark_failure(&self, device_id: &str, status: DeviceStatus, error: impl ToString) {
        let error = error.to_string();
        if let Some(slot) = self.devices.get(device_id) {
            slot.rcu(|cur| DeviceSnapshot {
                status,
                observation: cur.observation.clone(),
                last_error: Some(error.clone()),
            });
        }
    }

    pub fn status(&self, device_id: &str) -> DeviceStatus {
        self.get(device_id).map(|s| s.status).unwrap_or_default()
    }
}
