#![allow(dead_code)]

use async_trait::async_trait;
use regway_driver_modbus::{RegisterSession, SessionConnector};
use regway_error::{comm::CommError, CommResult};
use regway_models::domain::prelude::{
    ConnectionConfig, DeviceConfig, RegisterDescriptor, RegisterKind,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
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

/// Simulated controller shared by every session the connector hands out.
#[derive(Default)]
pub struct MockDevice {
    pub registers: Mutex<HashMap<(RegisterKind, u16), u16>>,
    /// Addresses answering with a Modbus exception
    pub exception_addresses: Mutex<HashSet<u16>>,
    /// Next transaction fails as a broken link
    pub drop_link: AtomicBool,
    pub refuse_connect: AtomicBool,
    pub connect_delay_ms: AtomicUsize,
    pub op_delay_ms: AtomicUsize,
    pub in_flight: AtomicBool,
    pub overlaps: AtomicUsize,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    /// Transaction log: `R<addr>` / `W<addr>=<words>`
    pub log: Mutex<Vec<String>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
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

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.log().into_iter().filter(|l| l.starts_with('W')).collect()
    }

    async fn transaction<T>(
        &self,
        entry: String,
        address: u16,
        op: impl FnOnce() -> T,
    ) -> CommResult<T> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.op_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.log.lock().unwrap().push(entry);
        let res = if self.drop_link.swap(false, Ordering::SeqCst) {
            Err(CommError::ConnectFailed("connection reset by peer".into()))
        } else if self.exception_addresses.lock().unwrap().contains(&address) {
            Err(CommError::TransactionFailed(
                "Modbus exception: IllegalDataAddress".into(),
            ))
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

impl MockConnector {
    pub fn new(device: Arc<MockDevice>) -> Arc<Self> {
        Arc::new(Self { device })
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, _device: &DeviceConfig) -> CommResult<Box<dyn RegisterSession>> {
        let delay = self.device.connect_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.device.refuse_connect.load(Ordering::SeqCst) {
            return Err(CommError::ConnectFailed("connection refused".into()));
        }
        self.device.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            device: Arc::clone(&self.device),
        }))
    }
}

pub struct MockSession {
    device: Arc<MockDevice>,
}

#[async_trait]
impl RegisterSession for MockSession {
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> CommResult<Vec<u16>> {
        let dev = Arc::clone(&self.device);
        self.device
            .transaction(format!("R{address}"), address, || {
                (0..count)
                    .map(|i| dev.get(kind, address + i).unwrap_or(0))
                    .collect()
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

/// FY600-like device: pv (input 0x8A), sv (holding 0, /10), output (input 0x87, /10).
pub fn fy600_device(id: &str) -> DeviceConfig {
    DeviceConfig {
        id: id.to_string(),
        name: None,
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

pub fn holding(name: &str, address: u16, scale: u32) -> RegisterDescriptor {
    RegisterDescriptor::word(name, RegisterKind::Holding, address, scale)
}
