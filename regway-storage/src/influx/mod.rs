mod flux;
mod line;

pub use line::encode_point;

use crate::TimeSeriesStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regway_error::{init::InitContextError, storage::StorageError, StorageResult};
use regway_models::{domain::prelude::HistoryRecord, settings::Store};
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

/// InfluxDB v2 HTTP adapter: line-protocol writes, Flux range queries.
pub struct InfluxStore {
    client: Client,
    base_url: String,
    org: String,
    bucket: String,
    token: String,
    request_timeout: Duration,
}

impl InfluxStore {
    pub fn new(cfg: &Store) -> Result<Self, InitContextError> {
        let required = |v: &Option<String>, key: &str| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| InitContextError::ComponentMissing(format!("store.{key}")))
        };
        let request_timeout = Duration::from_millis(cfg.request_timeout_ms);
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| InitContextError::Primitive(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: required(&cfg.url, "url")?.trim_end_matches('/').to_string(),
            org: required(&cfg.org, "org")?,
            bucket: cfg.bucket.clone(),
            token: required(&cfg.token, "token")?,
            request_timeout,
        })
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }

    fn map_send_error(&self, e: reqwest::Error) -> StorageError {
        if e.is_timeout() {
            StorageError::PersistenceTimeout(self.request_timeout)
        } else {
            StorageError::Unavailable(e.to_string())
        }
    }

    async fn check(resp: reqwest::Response) -> StorageResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
                StorageError::Unavailable(format!("{status}: {body}"))
            }
            _ => StorageError::Rejected(format!("{status}: {body}")),
        })
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    #[instrument(level = "debug", skip_all, fields(measurement = %measurement))]
    async fn write_point(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, f64)],
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let ts = timestamp
            .timestamp_nanos_opt()
            .ok_or_else(|| StorageError::Rejected(format!("timestamp out of range: {timestamp}")))?;
        let Some(line) = encode_point(measurement, tags, fields, ts) else {
            debug!("No fields to persist");
            return Ok(());
        };
        let resp = self
            .client
            .post(format!("{}/api/v2/write", self.base_url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(header::AUTHORIZATION, self.auth())
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::check(resp).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn query_range(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<HistoryRecord>> {
        let query = flux::range_query(&self.bucket, measurement, start, end);
        let resp = self
            .client
            .post(format!("{}/api/v2/query", self.base_url))
            .query(&[("org", self.org.as_str())])
            .header(header::AUTHORIZATION, self.auth())
            .header(header::CONTENT_TYPE, "application/vnd.flux")
            .header(header::ACCEPT, "application/csv")
            .body(query)
            .send()
            .await
            .map_err(|e| match self.map_send_error(e) {
                StorageError::PersistenceTimeout(d) => {
                    StorageError::Query(format!("query timed out after {}ms", d.as_millis()))
                }
                other => other,
            })?;
        let body = Self::check(resp)
            .await?
            .text()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        flux::parse_csv(&body)
    }

    fn kind(&self) -> &'static str {
        "influx"
    }
}
