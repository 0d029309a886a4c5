use crate::{
    session::{RegisterSession, SessionConnector},
    types::ConnectionState,
};
use regway_error::{comm::CommError, CommResult};
use regway_models::domain::prelude::{DeviceConfig, RegisterKind};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{watch, Mutex, MutexGuard},
    time::{error::Elapsed, timeout},
};
use tracing::{debug, info, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the session of one device and the per-device transaction guard.
///
/// Every register transaction (poll read or caller write) goes through
/// [`acquire`](Self::acquire), so at most one transaction is in flight per
/// device. Different devices have independent managers and never contend.
pub struct ConnectionManager {
    device: Arc<DeviceConfig>,
    connector: Arc<dyn SessionConnector>,
    connect_timeout: Duration,
    op_timeout: Duration,
    session: Mutex<Option<Box<dyn RegisterSession>>>,
    healthy: AtomicBool,
    shutdown: AtomicBool,
    last_error: std::sync::Mutex<Option<String>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        device: Arc<DeviceConfig>,
        connector: Arc<dyn SessionConnector>,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            device,
            connector,
            connect_timeout,
            op_timeout,
            session: Mutex::new(None),
            healthy: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            last_error: std::sync::Mutex::new(None),
            state_tx,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<DeviceConfig> {
        &self.device
    }

    /// Wait for the device's transaction guard.
    pub async fn acquire(&self) -> SessionGuard<'_> {
        SessionGuard {
            manager: self,
            slot: self.session.lock().await,
        }
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|g| g.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Refuse further connects and close the current session.
    ///
    /// Waits for any in-flight transaction to release the guard first.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        let mut guard = self.acquire().await;
        if let Some(mut session) = guard.slot.take() {
            let _ = timeout(CLOSE_TIMEOUT, session.close()).await;
        }
        self.healthy.store(false, Ordering::Release);
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!(device = %self.device.id, "Session closed");
    }

    fn record_error(&self, err: &CommError) {
        if let Ok(mut g) = self.last_error.lock() {
            *g = Some(err.to_string());
        }
    }
}

/// Exclusive access to one device's session for the lifetime of the guard.
pub struct SessionGuard<'a> {
    manager: &'a ConnectionManager,
    slot: MutexGuard<'a, Option<Box<dyn RegisterSession>>>,
}

impl SessionGuard<'_> {
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.slot.is_some()
    }

    #[inline]
    pub fn device(&self) -> &DeviceConfig {
        &self.manager.device
    }

    /// Establish a session if none is held, bounded by the connect timeout.
    pub async fn ensure(&mut self) -> CommResult<()> {
        if self.slot.is_some() {
            return Ok(());
        }
        let m = self.manager;
        if m.shutdown.load(Ordering::Acquire) {
            return Err(CommError::ConnectFailed("connection manager closed".into()));
        }
        m.state_tx.send_replace(ConnectionState::Connecting);
        let res = match timeout(m.connect_timeout, m.connector.connect(&m.device)).await {
            Ok(res) => res,
            Err(_) => Err(CommError::Timeout(m.connect_timeout)),
        };
        match res {
            Ok(session) => {
                *self.slot = Some(session);
                m.healthy.store(true, Ordering::Release);
                m.state_tx.send_replace(ConnectionState::Connected);
                info!(device = %m.device.id, endpoint = %m.device.connection.endpoint(), "Session established");
                Ok(())
            }
            Err(e) => {
                m.healthy.store(false, Ordering::Release);
                m.record_error(&e);
                m.state_tx.send_replace(ConnectionState::Failed(e.to_string()));
                warn!(device = %m.device.id, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    /// Fail fast when no session is held; never connects.
    pub fn require_connected(&self) -> CommResult<()> {
        if self.slot.is_some() {
            Ok(())
        } else {
            Err(CommError::ConnectFailed(format!(
                "device `{}` has no healthy session",
                self.manager.device.id
            )))
        }
    }

    /// Discard the current session so the next `ensure` re-establishes it.
    pub async fn invalidate(&mut self, reason: &CommError) {
        let m = self.manager;
        if let Some(mut session) = self.slot.take() {
            let _ = timeout(CLOSE_TIMEOUT, session.close()).await;
        }
        m.healthy.store(false, Ordering::Release);
        m.record_error(reason);
        m.state_tx
            .send_replace(ConnectionState::Failed(reason.to_string()));
        warn!(device = %m.device.id, error = %reason, "Session invalidated");
    }

    pub async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> CommResult<Vec<u16>> {
        let op_timeout = self.manager.op_timeout;
        let session = self.session_mut()?;
        let res = timeout(op_timeout, session.read_registers(kind, address, count)).await;
        self.settle("read", op_timeout, res).await
    }

    /// One transaction: single-register write for one word, multi-register otherwise.
    pub async fn write(&mut self, address: u16, words: &[u16]) -> CommResult<()> {
        let op_timeout = self.manager.op_timeout;
        let session = self.session_mut()?;
        let res = match words {
            [] => return Err(CommError::InvalidCommand("empty write".into())),
            [word] => timeout(op_timeout, session.write_register(address, *word)).await,
            _ => timeout(op_timeout, session.write_registers(address, words)).await,
        };
        self.settle("write", op_timeout, res).await
    }

    fn session_mut(&mut self) -> CommResult<&mut Box<dyn RegisterSession>> {
        let device = &self.manager.device.id;
        self.slot
            .as_mut()
            .ok_or_else(|| CommError::ConnectFailed(format!("device `{device}` has no session")))
    }

    /// Resolve a timed transaction; session-fatal outcomes invalidate the session.
    async fn settle<T>(
        &mut self,
        op_label: &'static str,
        op_timeout: Duration,
        res: Result<CommResult<T>, Elapsed>,
    ) -> CommResult<T> {
        let res = res.unwrap_or(Err(CommError::Timeout(op_timeout)));
        if let Err(e) = &res {
            if e.is_session_fatal() {
                self.invalidate(e).await;
            } else {
                debug!(device = %self.manager.device.id, op = op_label, error = %e, "Transaction failed");
            }
        }
        res
    }
}
