use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// Session state of a device as seen by consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    Connected,
    Error,
}

/// One set of field values captured from a device in a single poll cycle.
///
/// A `None` field means that register's transaction failed during the cycle.
/// Observations are shared behind `Arc` and never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub device_id: String,
    pub fields: BTreeMap<String, Option<f64>>,
    pub captured_at: DateTime<Utc>,
    pub status: DeviceStatus,
}

impl Observation {
    /// True when at least one register failed within the cycle.
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.fields.values().any(Option::is_none)
    }

    /// Fields that were actually read, for persistence.
    pub fn present_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.map(|v| (k.as_str(), v)))
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied().flatten()
    }
}

/// Latest cached state of one device: the last completed observation plus
/// the current session status.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    pub status: DeviceStatus,
    pub observation: Option<Arc<Observation>>,
    pub last_error: Option<String>,
}

/// Response shape for `GetLatest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestView {
    pub device_id: String,
    pub name: String,
    pub status: DeviceStatus,
    pub fields: BTreeMap<String, Option<f64>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LatestView {
    pub fn from_snapshot(device_id: &str, name: &str, snapshot: &DeviceSnapshot) -> Self {
        Self {
            device_id: device_id.to_string(),
            name: name.to_string(),
            status: snapshot.status,
            fields: snapshot
                .observation
                .as_ref()
                .map(|o| o.fields.clone())
                .unwrap_or_default(),
            captured_at: snapshot.observation.as_ref().map(|o| o.captured_at),
            last_error: snapshot.last_error.clone(),
        }
    }
}
