#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regway_core::RGGateway;
use regway_driver_modbus::{RegisterSession, SessionConnector};
use regway_error::{comm::CommError, storage::StorageError, CommResult, StorageResult};
use regway_models::{
    domain::prelude::{ConnectionConfig, DeviceConfig, HistoryRecord, RegisterKind},
    settings::Poller,
};
use regway_storage::{memory::MemoryStore, TimeSeriesStore};
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    time::Duration,
};
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Simulated FY600 controller.
#[derive(Default)]
pub struct MockDevice {
    pub registers: Mutex<HashMap<(RegisterKind, u16), u16>>,
    pub exception_addresses: Mutex<HashSet<u16>>,
    pub drop_link: AtomicBool,
    pub refuse_connect: AtomicBool,
    pub panic_on_read: AtomicBool,
    pub connect_delay_ms: AtomicU64,
    pub op_delay_ms: AtomicU64,
    pub in_flight: AtomicBool,
    pub overlaps: AtomicUsize,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub log: Mutex<Vec<String>>,
}

impl MockDevice {
    /// pv = 120, sv = 25.0, output = 45.5
    pub fn fy600() -> Arc<Self> {
        let dev = Arc::new(Self::default());
        dev.set(RegisterKind::Input, 0x8A, 120);
        dev.set(RegisterKind::Holding, 0x00, 250);
        dev.set(RegisterKind::Input, 0x87, 455);
        dev
    }

    pub fn set(&self, kind: RegisterKind, address: u16, value: u16) {
        self.registers.lock().unwrap().insert((kind, address), value);
    }

    pub fn get(&self, kind: RegisterKind, address: u16) -> Option<u16> {
        self.registers.lock().unwrap().get(&(kind, address)).copied()
    }

    pub fn fail_address(&self, address: u16) {
        self.exception_addresses.lock().unwrap().insert(address);
    }

    pub fn clear_failures(&self) {
        self.exception_addresses.lock().unwrap().clear();
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.log().into_iter().filter(|l| l.starts_with('W')).collect()
    }

    async fn transaction<T>(&self, entry: String, address: u16, op: impl FnOnce() -> T) -> CommResult<T> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.op_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.log.lock().unwrap().push(entry);
        let res = if self.drop_link.swap(false, Ordering::SeqCst) {
            Err(CommError::ConnectFailed("connection reset by peer".into()))
        } else if self.exception_addresses.lock().unwrap().contains(&address) {
            Err(CommError::TransactionFailed("Modbus exception: IllegalDataAddress".into()))
        } else {
            Ok(op())
        };
        self.in_flight.store(false, Ordering::SeqCst);
        res
    }
}

pub struct MockConnector {
    pub device: Arc<MockDevice>,
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, _device: &DeviceConfig) -> CommResult<Box<dyn RegisterSession>> {
        open_session(&self.device).await
    }
}

/// Routes each device id to its own simulated controller.
pub struct MultiConnector {
    pub devices: HashMap<String, Arc<MockDevice>>,
}

#[async_trait]
impl SessionConnector for MultiConnector {
    async fn connect(&self, device: &DeviceConfig) -> CommResult<Box<dyn RegisterSession>> {
        match self.devices.get(&device.id) {
            Some(dev) => open_session(dev).await,
            None => Err(CommError::ConnectFailed(format!("no route to {}", device.id))),
        }
    }
}

async fn open_session(device: &Arc<MockDevice>) -> CommResult<Box<dyn RegisterSession>> {
    let delay = device.connect_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if device.refuse_connect.load(Ordering::SeqCst) {
        return Err(CommError::ConnectFailed("connection refused".into()));
    }
    device.connects.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(MockSession {
        device: Arc::clone(device),
    }))
}

struct MockSession {
    device: Arc<MockDevice>,
}

#[async_trait]
impl RegisterSession for MockSession {
    async fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> CommResult<Vec<u16>> {
        if self.device.panic_on_read.load(Ordering::SeqCst) {
            panic!("simulated driver panic at R{address}");
        }
        let dev = Arc::clone(&self.device);
        self.device
            .transaction(format!("R{address}"), address, || {
                (0..count).map(|i| dev.get(kind, address + i).unwrap_or(0)).collect()
            })
            .await
    }

    async fn write_register(&mut self, address: u16, value: u16) -> CommResult<()> {
        self.write_registers(address, &[value]).await
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> CommResult<()> {
        let dev = Arc::clone(&self.device);
        let values = values.to_vec();
        self.device
            .transaction(format!("W{address}={values:?}"), address, || {
                for (i, v) in values.iter().enumerate() {
                    dev.set(RegisterKind::Holding, address + i as u16, *v);
                }
            })
            .await
    }

    async fn close(&mut self) {
        self.device.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store wrapper that can be slowed down or made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub delay_ms: AtomicU64,
    pub fail: AtomicBool,
    pub writes: AtomicUsize,
}

#[async_trait]
impl TimeSeriesStore for FlakyStore {
    async fn write_point(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, f64)],
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("connection refused".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_point(measurement, tags, fields, timestamp).await
    }

    async fn query_range(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<HistoryRecord>> {
        self.inner.query_range(measurement, start, end).await
    }

    fn kind(&self) -> &'static str {
        "flaky"
    }
}

pub fn fy600_config(id: &str) -> DeviceConfig {
    DeviceConfig {
        id: id.to_string(),
        name: Some("FY600".into()),
        profile: Some("fy600".into()),
        measurement: None,
        connection: ConnectionConfig::Tcp {
            host: "127.0.0.1".into(),
            port: 502,
        },
        unit_id: 1,
        interval_ms: None,
        registers: vec![],
    }
    .resolve()
    .unwrap()
}

pub fn fast_poller() -> Poller {
    Poller {
        interval_ms: 20,
        backoff_ms: 30,
        connect_timeout_ms: 200,
        transaction_timeout_ms: 200,
        persist_timeout_ms: 100,
        subscriber_queue_capacity: 16,
        shutdown_timeout_ms: 1000,
    }
}

pub struct Harness {
    pub gateway: Arc<RGGateway>,
    pub device: Arc<MockDevice>,
    pub store: Arc<FlakyStore>,
}

pub fn harness_with(poller: Poller, device: Arc<MockDevice>) -> Harness {
    init_tracing();
    let store = Arc::new(FlakyStore::default());
    let connector = Arc::new(MockConnector {
        device: Arc::clone(&device),
    });
    let gateway = RGGateway::new(
        poller,
        vec![fy600_config("fy600")],
        330,
        Arc::clone(&store) as Arc<dyn TimeSeriesStore>,
        connector,
    )
    .unwrap();
    Harness {
        gateway: Arc::new(gateway),
        device,
        store,
    }
}

pub fn harness() -> Harness {
    harness_with(fast_poller(), MockDevice::fy600())
}

/// Poll `cond` until it holds or the deadline passes.
pub async fn wait_until<F, Fut>(deadline: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let until = tokio::time::Instant::now() + deadline;
    loop {
        if cond().await {
            return true;
        }
        if tokio::time::Instant::now() >= until {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
