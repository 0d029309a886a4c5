use config::{Config, File};
use regway_error::{RGError, RGResult};
use serde::{self, Deserialize};
use std::{collections::HashSet, ops::Deref, sync::Arc, time::Duration};
use sysinfo::System;

use crate::{constants::ALL_DEVICES, domain::device::DeviceConfig};

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    pub fn new(config_path: String) -> RGResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path.as_str()).required(false))
            .add_source(
                config::Environment::with_prefix("RG")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("web.cors.whitelist.origins")
                    .with_list_parse_key("web.cors.whitelist.methods")
                    .with_list_parse_key("web.cors.whitelist.headers"),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Self::from_inner(inner)
    }

    /// Resolve device profiles and check cross-field constraints.
    pub fn from_inner(mut inner: Inner) -> RGResult<Self> {
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(inner.devices.len());
        for dev in inner.devices.drain(..) {
            let dev = dev.resolve().map_err(RGError::ConfigurationError)?;
            if dev.id == ALL_DEVICES {
                return Err(RGError::ConfigurationError(format!(
                    "device id `{ALL_DEVICES}` is reserved"
                )));
            }
            if !seen.insert(dev.id.clone()) {
                return Err(RGError::ConfigurationError(format!(
                    "duplicate device id `{}`",
                    dev.id
                )));
            }
            devices.push(dev);
        }
        inner.devices = devices;

        if inner.store.kind == StoreKind::Influx {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if missing(&inner.store.token) {
                return Err(RGError::ConfigurationError(
                    "store.token is required for the influx store (RG__STORE__TOKEN)".into(),
                ));
            }
            if missing(&inner.store.url) || missing(&inner.store.org) {
                return Err(RGError::ConfigurationError(
                    "store.url and store.org are required for the influx store".into(),
                ));
            }
        }
        Ok(Self(Arc::new(inner)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub web: Web,
    #[serde(default)]
    pub poller: Poller,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Runtime root directory; relative paths (logs) resolve from here.
    ///
    /// Override: `RG__GENERAL__RUNTIME_DIR=/var/lib/regway`
    #[serde(default = "General::runtime_dir_default")]
    pub runtime_dir: String,
    /// Log level (`trace`..`error`); build default when absent
    #[serde(default)]
    pub log_level: Option<String>,
    /// Display offset for history timestamps, in minutes east of UTC
    #[serde(default = "General::utc_offset_minutes_default")]
    pub utc_offset_minutes: i32,
}

impl Default for General {
    fn default() -> Self {
        General {
            runtime_dir: General::runtime_dir_default(),
            log_level: None,
            utc_offset_minutes: General::utc_offset_minutes_default(),
        }
    }
}

impl General {
    fn runtime_dir_default() -> String {
        ".".into()
    }

    fn utc_offset_minutes_default() -> i32 {
        330
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Poller {
    #[serde(default = "Poller::interval_ms_default")]
    pub interval_ms: u64,
    /// Constant delay before a failed device is retried
    #[serde(default = "Poller::backoff_ms_default")]
    pub backoff_ms: u64,
    #[serde(default = "Poller::connect_timeout_ms_default")]
    pub connect_timeout_ms: u64,
    #[serde(default = "Poller::transaction_timeout_ms_default")]
    pub transaction_timeout_ms: u64,
    /// Cap on a single store write issued from a poll cycle
    #[serde(default = "Poller::persist_timeout_ms_default")]
    pub persist_timeout_ms: u64,
    #[serde(default = "Poller::subscriber_queue_capacity_default")]
    pub subscriber_queue_capacity: usize,
    #[serde(default = "Poller::shutdown_timeout_ms_default")]
    pub shutdown_timeout_ms: u64,
}

impl Default for Poller {
    fn default() -> Self {
        Poller {
            interval_ms: Poller::interval_ms_default(),
            backoff_ms: Poller::backoff_ms_default(),
            connect_timeout_ms: Poller::connect_timeout_ms_default(),
            transaction_timeout_ms: Poller::transaction_timeout_ms_default(),
            persist_timeout_ms: Poller::persist_timeout_ms_default(),
            subscriber_queue_capacity: Poller::subscriber_queue_capacity_default(),
            shutdown_timeout_ms: Poller::shutdown_timeout_ms_default(),
        }
    }
}

impl Poller {
    fn interval_ms_default() -> u64 {
        2000
    }

    fn backoff_ms_default() -> u64 {
        3000
    }

    fn connect_timeout_ms_default() -> u64 {
        3000
    }

    fn transaction_timeout_ms_default() -> u64 {
        2000
    }

    fn persist_timeout_ms_default() -> u64 {
        1500
    }

    fn subscriber_queue_capacity_default() -> usize {
        64
    }

    fn shutdown_timeout_ms_default() -> u64 {
        5000
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    #[inline]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[inline]
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    #[inline]
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    #[inline]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Influx,
    #[default]
    Memory,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default = "Store::bucket_default")]
    pub bucket: String,
    /// Influx API token; supply via `RG__STORE__TOKEN`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "Store::request_timeout_ms_default")]
    pub request_timeout_ms: u64,
}

impl Default for Store {
    fn default() -> Self {
        Store {
            kind: StoreKind::default(),
            url: None,
            org: None,
            bucket: Store::bucket_default(),
            token: None,
            request_timeout_ms: Store::request_timeout_ms_default(),
        }
    }
}

impl Store {
    fn bucket_default() -> String {
        "modbus_data".into()
    }

    fn request_timeout_ms_default() -> u64 {
        5000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Web {
    #[serde(default = "Web::router_prefix_default")]
    pub router_prefix: String,
    #[serde(default = "Web::host_default")]
    pub host: String,
    #[serde(default = "Web::port_default")]
    pub port: u16,
    #[serde(default = "Web::workers_default")]
    pub workers: i32,
    #[serde(default)]
    pub cors: Cors,
}

impl Default for Web {
    fn default() -> Self {
        Web {
            router_prefix: Web::router_prefix_default(),
            host: Web::host_default(),
            port: Web::port_default(),
            workers: Web::workers_default(),
            cors: Default::default(),
        }
    }
}

impl Web {
    fn router_prefix_default() -> String {
        "/api".into()
    }

    fn port_default() -> u16 {
        3000
    }

    fn host_default() -> String {
        "0.0.0.0".into()
    }

    fn workers_default() -> i32 {
        0
    }

    /// Get actual number of workers based on configuration
    pub fn get_worker_count(&self) -> usize {
        match self.workers {
            0 => System::new_all().cpus().len().max(1),
            n if n > 0 => n as usize,
            n => std::cmp::max(
                1,
                (System::new_all().cpus().len() as i32 / n.abs()) as usize,
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cors {
    #[serde(default)]
    pub mode: CorsMode,
    #[serde(default)]
    pub whitelist: Whitelist,
}

#[derive(Default, Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorsMode {
    #[default]
    AllowAll,
    Whitelist,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Whitelist {
    #[serde(default = "Whitelist::origins_default")]
    pub origins: Vec<String>,
    #[serde(default = "Whitelist::methods_default")]
    pub methods: Vec<String>,
    #[serde(default = "Whitelist::headers_default")]
    pub headers: Vec<String>,
    #[serde(default)]
    pub credentials: bool,
}

impl Default for Whitelist {
    fn default() -> Self {
        Whitelist {
            origins: Whitelist::origins_default(),
            methods: Whitelist::methods_default(),
            headers: Whitelist::headers_default(),
            credentials: false,
        }
    }
}

impl Whitelist {
    fn origins_default() -> Vec<String> {
        vec!["*".into()]
    }

    fn methods_default() -> Vec<String> {
        vec!["GET".into(), "POST".into()]
    }

    fn headers_default() -> Vec<String> {
        vec!["Content-Type".into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> RGResult<Settings> {
        let inner: Inner = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Settings::from_inner(inner)
    }

    #[test]
    fn defaults_apply_to_empty_file() {
        let s = parse("").unwrap();
        assert_eq!(s.web.port, 3000);
        assert_eq!(s.web.router_prefix, "/api");
        assert_eq!(s.poller.interval_ms, 2000);
        assert_eq!(s.poller.backoff_ms, 3000);
        assert_eq!(s.store.kind, StoreKind::Memory);
        assert_eq!(s.store.bucket, "modbus_data");
        assert_eq!(s.general.utc_offset_minutes, 330);
        assert!(s.devices.is_empty());
    }

    #[test]
    fn devices_resolve_profiles() {
        let s = parse(
            r#"
            [[devices]]
            id = "production_clean_room"
            profile = "float_meter"
            unit_id = 1
            connection = { type = "tcp", host = "192.168.0.7" }

            [[devices]]
            id = "fy600"
            profile = "fy600"
            connection = { type = "rtu", port = "/dev/ttyUSB0" }
            "#,
        )
        .unwrap();
        assert_eq!(s.devices.len(), 2);
        assert_eq!(s.devices[0].measurement(), "modbus_reading");
        match &s.devices[1].connection {
            crate::domain::device::ConnectionConfig::Rtu { baud_rate, .. } => {
                assert_eq!(*baud_rate, 9600)
            }
            other => panic!("unexpected connection {other:?}"),
        }
    }

    #[test]
    fn influx_requires_token() {
        let err = parse(
            r#"
            [store]
            kind = "influx"
            url = "http://localhost:8086"
            org = "factory_iot"
            "#,
        );
        assert!(matches!(err, Err(RGError::ConfigurationError(_))));
    }

    #[test]
    fn duplicate_device_ids_rejected() {
        let err = parse(
            r#"
            [[devices]]
            id = "a"
            profile = "fy600"
            connection = { type = "tcp", host = "10.0.0.1" }
            [[devices]]
            id = "a"
            profile = "fy600"
            connection = { type = "tcp", host = "10.0.0.2" }
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn wildcard_device_id_rejected() {
        let err = parse(
            r#"
            [[devices]]
            id = "*"
            profile = "fy600"
            connection = { type = "tcp", host = "10.0.0.1" }
            "#,
        );
        assert!(matches!(err, Err(RGError::ConfigurationError(_))));
    }
}
