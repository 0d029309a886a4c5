use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regway_error::{RGError, RGResult};
use regway_models::{
    constants::{DEFAULT_HISTORY_WINDOW_DAYS, HISTORY_TIME_FORMAT},
    domain::prelude::{HistoryQuery, HistoryRecord, HistoryRow},
};
use regway_storage::TimeSeriesStore;
use std::sync::Arc;
use tracing::instrument;

/// Turns history requests into store range queries and normalizes the rows.
///
/// Bounds and row times are rendered in a fixed display offset.
pub struct HistoryAdapter {
    store: Arc<dyn TimeSeriesStore>,
    offset: FixedOffset,
}

impl HistoryAdapter {
    pub fn new(store: Arc<dyn TimeSeriesStore>, utc_offset_minutes: i32) -> RGResult<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            RGError::ConfigurationError(format!("invalid utc offset: {utc_offset_minutes} minutes"))
        })?;
        Ok(Self { store, offset })
    }

    #[instrument(name = "history-query", skip_all, fields(measurement = %query.measurement))]
    pub async fn query(&self, query: &HistoryQuery) -> RGResult<Vec<HistoryRow>> {
        let (start, end) = self.resolve_range(query, Utc::now())?;
        let records = self
            .store
            .query_range(&query.measurement, start, end)
            .await?;
        Ok(records.into_iter().map(|r| self.row(r)).collect())
    }

    /// Missing `end` is now; missing `start` is the default window before `end`.
    pub fn resolve_range(
        &self,
        query: &HistoryQuery,
        now: DateTime<Utc>,
    ) -> RGResult<(DateTime<Utc>, DateTime<Utc>)> {
        let end = match non_empty(&query.end) {
            Some(s) => self.parse_bound(s)?,
            None => now,
        };
        let start = match non_empty(&query.start) {
            Some(s) => self.parse_bound(s)?,
            None => end - ChronoDuration::days(DEFAULT_HISTORY_WINDOW_DAYS),
        };
        if start >= end {
            return Err(RGError::InvalidArgument(format!(
                "start `{start}` must be before end `{end}`"
            )));
        }
        Ok((start, end))
    }

    fn parse_bound(&self, s: &str) -> RGResult<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(s, HISTORY_TIME_FORMAT).map_err(|e| {
            RGError::InvalidArgument(format!("invalid time `{s}`: {e}"))
        })?;
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| RGError::InvalidArgument(format!("ambiguous time `{s}`")))
    }

    fn row(&self, r: HistoryRecord) -> HistoryRow {
        HistoryRow {
            field: r.field,
            value: r.value,
            device: r.device,
            time: r
                .time
                .with_timezone(&self.offset)
                .format(HISTORY_TIME_FORMAT)
                .to_string(),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regway_storage::memory::MemoryStore;

    fn adapter() -> HistoryAdapter {
        HistoryAdapter::new(Arc::new(MemoryStore::default()), 330).unwrap()
    }

    fn query(start: Option<&str>, end: Option<&str>) -> HistoryQuery {
        HistoryQuery {
            measurement: "fy600".into(),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    #[test]
    fn default_window_is_trailing_week() {
        let now = Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap();
        let (start, end) = adapter().resolve_range(&query(None, None), now).unwrap();
        assert_eq!(end, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn local_bounds_use_display_offset() {
        let now = Utc::now();
        let (start, end) = adapter()
            .resolve_range(
                &query(Some("2024-05-01 05:30:00"), Some("2024-05-02T00:00:00Z")),
                now,
            )
            .unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_inverted_or_garbled_bounds() {
        let a = adapter();
        let now = Utc::now();
        assert!(matches!(
            a.resolve_range(&query(Some("2024-05-02 00:00:00"), Some("2024-05-01 00:00:00")), now),
            Err(RGError::InvalidArgument(_))
        ));
        assert!(matches!(
            a.resolve_range(&query(Some("yesterday"), None), now),
            Err(RGError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rows_render_in_display_offset() {
        let row = adapter().row(HistoryRecord {
            field: "pv".into(),
            value: 120.0,
            device: "FY600".into(),
            time: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        });
        assert_eq!(row.time, "2024-05-01 05:30:00");
    }
}
