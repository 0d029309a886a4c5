//! Flux query construction and annotated-CSV result parsing.
use chrono::{DateTime, SecondsFormat, Utc};
use regway_error::{storage::StorageError, StorageResult};
use regway_models::{constants::DEVICE_TAG, domain::prelude::HistoryRecord};
use tracing::debug;

/// Range query for one measurement, sorted by time.
pub fn range_query(bucket: &str, measurement: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "from(bucket: \"{}\")\n  |> range(start: {}, stop: {})\n  |> filter(fn: (r) => r._measurement == \"{}\")\n  |> sort(columns: [\"_time\"])",
        escape_string(bucket),
        start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        end.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        escape_string(measurement),
    )
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

struct Columns {
    time: usize,
    value: usize,
    field: usize,
    device: Option<usize>,
}

impl Columns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let idx = |name: &str| cells.iter().position(|c| c == name);
        Some(Self {
            time: idx("_time")?,
            value: idx("_value")?,
            field: idx("_field")?,
            device: idx(DEVICE_TAG),
        })
    }
}

/// Parse the CSV body returned by `/api/v2/query`.
///
/// Tables are separated by blank lines and may repeat their header; annotation
/// rows (`#...`) are skipped. Rows whose value is not numeric are dropped.
pub fn parse_csv(body: &str) -> StorageResult<Vec<HistoryRecord>> {
    let mut columns: Option<Columns> = None;
    let mut records = Vec::new();
    for raw in body.lines() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            columns = None;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let cells = split_csv_line(line);
        if columns.is_none() {
            columns = Some(Columns::from_header(&cells).ok_or_else(|| {
                StorageError::Decode(format!("unexpected query header: {line}"))
            })?);
            continue;
        }
        let Some(cols) = columns.as_ref() else {
            continue;
        };
        let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");
        let value = match cell(cols.value).parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                debug!(value = cell(cols.value), "Skipping non-numeric history value");
                continue;
            }
        };
        let time = DateTime::parse_from_rfc3339(cell(cols.time))
            .map_err(|e| StorageError::Decode(format!("bad _time `{}`: {e}", cell(cols.time))))?
            .with_timezone(&Utc);
        records.push(HistoryRecord {
            field: cell(cols.field).to_string(),
            value,
            device: cols.device.map(|i| cell(i).to_string()).unwrap_or_default(),
            time,
        });
    }
    Ok(records)
}

/// Split one CSV line, honoring double-quoted cells with `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => cells.push(std::mem::take(&mut cur)),
            (c, _) => cur.push(c),
        }
    }
    cells.push(cur);
    cells
}
