pub mod constants;
pub mod domain;
pub mod settings;
pub mod web;

use async_trait::async_trait;
use domain::prelude::{
    DeviceInfo, HistoryQuery, HistoryRow, LatestView, Observation, RegisterWrite, WriteReport,
};
use regway_error::{init::InitContextError, RGResult};
use settings::Settings;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Request-facing facade over the polling engine.
///
/// Implemented by the core crate and consumed by the web layer. Device and
/// register lookups failing here are reported as `CommError::InvalidCommand`
/// (or `RGError::DeviceNotFound` for reads) before any protocol transaction.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Start one poll task per configured device.
    async fn start(&self) -> RGResult<()>;

    /// Cancel poll timers, wait for in-flight cycles, close every session.
    async fn stop(&self) -> RGResult<()>;

    /// Configured devices with their current status.
    fn list_devices(&self) -> Vec<DeviceInfo>;

    /// Last known values plus status; never fails because a device is offline.
    fn get_latest(&self, device_id: &str) -> RGResult<LatestView>;

    /// Latest view of every device matching the filter (`None` = all).
    fn snapshot(&self, device_id: Option<&str>) -> Vec<LatestView>;

    /// Time-range query against the durable store.
    async fn get_history(&self, query: HistoryQuery) -> RGResult<Vec<HistoryRow>>;

    /// Write one named register.
    async fn set_register(
        &self,
        device_id: &str,
        register: &str,
        value: f64,
    ) -> RGResult<WriteReport>;

    /// Ordered write of several named registers under one guard acquisition.
    async fn set_registers(
        &self,
        device_id: &str,
        writes: Vec<RegisterWrite>,
    ) -> RGResult<WriteReport>;

    /// Live observation stream for one device or, with `None`, for all devices.
    fn subscribe(&self, device_id: Option<&str>) -> RGResult<Subscription>;
}

/// HTTP front end lifecycle.
#[async_trait]
pub trait WebServer: Send + Sync + 'static {
    async fn init(
        settings: &Settings,
        gateway: Arc<dyn Gateway>,
    ) -> RGResult<Arc<Self>, InitContextError>
    where
        Self: Sized;

    /// Gracefully stops the web server.
    async fn stop(&self) -> RGResult<()>;
}

/// Fan-out registry for live observations.
pub trait RealtimeHub: Send + Sync + 'static {
    /// Register a bounded subscriber queue; `None` filter matches every device.
    fn subscribe(self: Arc<Self>, device_id: Option<String>) -> Subscription;

    /// Drop a subscriber; idempotent.
    fn unsubscribe(&self, id: u64);

    /// Deliver an observation without blocking the caller.
    fn publish(&self, observation: &Arc<Observation>);

    fn subscriber_count(&self) -> usize;
}

/// Handle on a live observation stream.
///
/// The stream ends (`recv` yields `None`) if the hub evicts this subscriber
/// for falling behind. Dropping the handle releases the registration.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<Observation>>,
    hub: Arc<dyn RealtimeHub>,
}

impl Subscription {
    pub fn new(id: u64, rx: mpsc::Receiver<Arc<Observation>>, hub: Arc<dyn RealtimeHub>) -> Self {
        Self { id, rx, hub }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<Observation>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Arc<Observation>, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
