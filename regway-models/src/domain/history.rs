use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One stored point as returned by the time-series store.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub field: String,
    pub value: f64,
    pub device: String,
    pub time: DateTime<Utc>,
}

/// Query parameters for the history endpoint.
///
/// Bounds accept `%Y-%m-%d %H:%M:%S` in the display offset or RFC 3339.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[validate(length(min = 1, max = 256))]
    pub measurement: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Normalized history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub field: String,
    pub value: f64,
    pub device: String,
    pub time: String,
}
