use crate::{
    cache::StateCache,
    fanout::ObservationFanout,
    history::HistoryAdapter,
    poller::{DevicePoller, PollState},
    realtime::RGRealtimeHub,
};
use async_trait::async_trait;
use futures::future::join_all;
use regway_driver_modbus::{
    ConnectionManager, ConnectionState, ModbusConnector, RegisterCodec, RegisterWriter,
    SessionConnector,
};
use regway_error::{comm::CommError, init::InitContextError, RGError, RGResult};
use regway_models::{
    constants::ALL_DEVICES,
    domain::prelude::{
        DeviceConfig, DeviceInfo, DeviceStatus, HistoryQuery, HistoryRow, LatestView, RegisterInfo,
        RegisterWrite, WriteCommand, WriteReport,
    },
    settings::{Poller, Settings},
    Gateway, RealtimeHub, Subscription,
};
use regway_storage::TimeSeriesStore;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

struct DeviceRuntime {
    device: Arc<DeviceConfig>,
    manager: Arc<ConnectionManager>,
    poller: Arc<DevicePoller>,
}

/// Polling engine facade: owns one connection manager and poller per device
/// plus the shared cache, realtime hub and history adapter.
pub struct RGGateway {
    devices: Vec<DeviceRuntime>,
    index: HashMap<String, usize>,
    cache: Arc<StateCache>,
    hub: Arc<RGRealtimeHub>,
    history: HistoryAdapter,
    config: Poller,
    master_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl RGGateway {
    pub fn new(
        config: Poller,
        devices: Vec<DeviceConfig>,
        utc_offset_minutes: i32,
        store: Arc<dyn TimeSeriesStore>,
        connector: Arc<dyn SessionConnector>,
    ) -> RGResult<Self> {
        let cache = Arc::new(StateCache::new(devices.iter().map(|d| d.id.as_str())));
        let hub = Arc::new(RGRealtimeHub::new(config.subscriber_queue_capacity));
        let fanout = Arc::new(ObservationFanout::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            Arc::clone(&hub),
            config.persist_timeout(),
        ));
        let history = HistoryAdapter::new(store, utc_offset_minutes)?;

        let mut index = HashMap::with_capacity(devices.len());
        let mut runtimes = Vec::with_capacity(devices.len());
        for device in devices {
            if index.insert(device.id.clone(), runtimes.len()).is_some() {
                return Err(RGError::ConfigurationError(format!(
                    "duplicate device id `{}`",
                    device.id
                )));
            }
            let device = Arc::new(device);
            let manager = Arc::new(ConnectionManager::new(
                Arc::clone(&device),
                Arc::clone(&connector),
                config.connect_timeout(),
                config.transaction_timeout(),
            ));
            let interval = device
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.interval());
            let poller = Arc::new(DevicePoller::new(
                Arc::clone(&manager),
                Arc::clone(&fanout),
                interval,
                config.backoff(),
            ));
            runtimes.push(DeviceRuntime {
                device,
                manager,
                poller,
            });
        }

        Ok(Self {
            devices: runtimes,
            index,
            cache,
            hub,
            history,
            config,
            master_token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Build the gateway for the configured devices over real Modbus sessions.
    #[instrument(name = "init-gateway", skip_all)]
    pub async fn init(
        settings: &Settings,
        store: Arc<dyn TimeSeriesStore>,
    ) -> RGResult<Arc<Self>, InitContextError> {
        let gateway = Self::new(
            settings.poller,
            settings.devices.clone(),
            settings.general.utc_offset_minutes,
            store,
            Arc::new(ModbusConnector),
        )
        .map_err(|e| InitContextError::Primitive(e.to_string()))?;
        info!(devices = gateway.devices.len(), "Gateway initialized");
        Ok(Arc::new(gateway))
    }

    fn runtime(&self, device_id: &str) -> Option<&DeviceRuntime> {
        self.index.get(device_id).map(|&i| &self.devices[i])
    }

    pub fn hub(&self) -> &Arc<RGRealtimeHub> {
        &self.hub
    }

    pub fn poll_state(&self, device_id: &str) -> Option<watch::Receiver<PollState>> {
        self.runtime(device_id).map(|rt| rt.poller.subscribe_state())
    }

    pub fn connection_state(&self, device_id: &str) -> Option<watch::Receiver<ConnectionState>> {
        self.runtime(device_id).map(|rt| rt.manager.subscribe_state())
    }

    fn latest_of(&self, rt: &DeviceRuntime) -> LatestView {
        let snapshot = self.cache.get(&rt.device.id).unwrap_or_default();
        LatestView::from_snapshot(&rt.device.id, rt.device.display_name(), &snapshot)
    }

    /// Resolve named writes to encoded commands; nothing is sent on error.
    fn plan_writes(
        &self,
        device: &DeviceConfig,
        writes: &[RegisterWrite],
    ) -> Result<Vec<WriteCommand>, CommError> {
        if writes.is_empty() {
            return Err(CommError::InvalidCommand("no registers to write".into()));
        }
        writes
            .iter()
            .map(|w| {
                let desc = device.register(&w.name).ok_or_else(|| {
                    CommError::InvalidCommand(format!(
                        "unknown register `{}` on device `{}`",
                        w.name, device.id
                    ))
                })?;
                if !desc.is_writable() {
                    return Err(CommError::InvalidCommand(format!(
                        "register `{}` is read-only",
                        w.name
                    )));
                }
                Ok(WriteCommand {
                    device_id: device.id.clone(),
                    register: desc.name.clone(),
                    register_address: desc.address,
                    raw_value: RegisterCodec::encode(w.value, desc)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Gateway for RGGateway {
    #[instrument(name = "gateway-start", skip_all)]
    async fn start(&self) -> RGResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("🚀 Starting polling for {} devices", self.devices.len());
        let mut tasks = self.tasks.lock().await;
        for (i, rt) in self.devices.iter().enumerate() {
            let period_ms = rt.device.interval_ms.unwrap_or(self.config.interval_ms).max(1);
            // Spread first cycles so devices sharing a bus do not fire together.
            let jitter = Duration::from_millis((i as u64 * 37) % (period_ms / 10).max(1));
            tasks.push(
                Arc::clone(&rt.poller).spawn(self.master_token.child_token(), jitter),
            );
        }
        Ok(())
    }

    #[instrument(name = "gateway-stop", skip_all)]
    async fn stop(&self) -> RGResult<()> {
        info!("🛑 Stopping polling engine gracefully");
        self.master_token.cancel();

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        let shutdown_timeout = self.config.shutdown_timeout();
        let mut first_failure = None;
        match timeout(shutdown_timeout, join_all(handles)).await {
            Ok(results) => {
                let total = results.len();
                let mut failed = 0;
                for e in results.into_iter().filter_map(Result::err) {
                    error!(error = %e, "Poll task ended abnormally");
                    failed += 1;
                    first_failure.get_or_insert(e);
                }
                info!("✅ Poll tasks stopped: {} completed, {failed} failed", total - failed);
            }
            Err(_) => warn!("⚠️ Some poll tasks did not complete within timeout"),
        }

        join_all(self.devices.iter().map(|rt| rt.manager.close())).await;
        info!("All device sessions closed");
        match first_failure {
            Some(e) => Err(RGError::JoinError(e)),
            None => Ok(()),
        }
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .iter()
            .map(|rt| DeviceInfo {
                id: rt.device.id.clone(),
                name: rt.device.display_name().to_string(),
                measurement: rt.device.measurement().to_string(),
                endpoint: rt.device.connection.endpoint(),
                unit_id: rt.device.unit_id,
                status: self.cache.status(&rt.device.id),
                registers: rt.device.registers.iter().map(RegisterInfo::from).collect(),
            })
            .collect()
    }

    fn get_latest(&self, device_id: &str) -> RGResult<LatestView> {
        self.runtime(device_id)
            .map(|rt| self.latest_of(rt))
            .ok_or_else(|| RGError::DeviceNotFound(device_id.to_string()))
    }

    fn snapshot(&self, device_id: Option<&str>) -> Vec<LatestView> {
        let device_id = device_filter(device_id);
        self.devices
            .iter()
            .filter(|rt| device_id.map_or(true, |id| rt.device.id == id))
            .map(|rt| self.latest_of(rt))
            .collect()
    }

    async fn get_history(&self, query: HistoryQuery) -> RGResult<Vec<HistoryRow>> {
        self.history.query(&query).await
    }

    async fn set_register(
        &self,
        device_id: &str,
        register: &str,
        value: f64,
    ) -> RGResult<WriteReport> {
        self.set_registers(
            device_id,
            vec![RegisterWrite {
                name: register.to_string(),
                value,
            }],
        )
        .await
    }

    #[instrument(name = "gateway-write", skip(self, writes), fields(count = writes.len()))]
    async fn set_registers(
        &self,
        device_id: &str,
        writes: Vec<RegisterWrite>,
    ) -> RGResult<WriteReport> {
        let rt = self.runtime(device_id).ok_or_else(|| {
            CommError::InvalidCommand(format!("unknown device `{device_id}`"))
        })?;
        let commands = self.plan_writes(&rt.device, &writes)?;

        let mut guard = rt.manager.acquire().await;
        let was_connected = guard.is_connected();
        let result = RegisterWriter::write(&mut guard, &commands).await;
        if let Err(failure) = &result {
            // Marked before releasing the guard so the next poll cycle supersedes it.
            if was_connected && failure.error.is_session_fatal() {
                self.cache
                    .mark_failure(&rt.device.id, DeviceStatus::Error, &failure.error);
            }
        }
        drop(guard);

        match result {
            Ok(applied) => {
                info!(applied, "Register write applied");
                Ok(WriteReport {
                    applied,
                    failed_index: None,
                    error: None,
                })
            }
            Err(failure) => {
                warn!(
                    applied = failure.applied,
                    index = failure.index,
                    error = %failure.error,
                    "Register write failed"
                );
                Ok(WriteReport {
                    applied: failure.applied,
                    failed_index: Some(failure.index),
                    error: Some(failure.error.to_string()),
                })
            }
        }
    }

    fn subscribe(&self, device_id: Option<&str>) -> RGResult<Subscription> {
        let device_id = device_filter(device_id);
        if let Some(id) = device_id {
            if self.runtime(id).is_none() {
                return Err(RGError::DeviceNotFound(id.to_string()));
            }
        }
        Ok(Arc::clone(&self.hub).subscribe(device_id.map(str::to_string)))
    }
}

/// `*` selects every device, the same as no filter.
fn device_filter(device_id: Option<&str>) -> Option<&str> {
    device_id.filter(|id| *id != ALL_DEVICES)
}
