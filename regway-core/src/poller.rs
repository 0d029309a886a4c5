use crate::fanout::ObservationFanout;
use backoff::backoff::{Backoff, Constant};
use regway_driver_modbus::{ConnectionManager, RegisterReader};
use regway_error::comm::CommError;
use regway_models::domain::prelude::{DeviceConfig, Observation, RegisterDescriptor};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, sleep, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Per-device scheduler state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollState {
    #[default]
    Idle,
    InCycle,
    Backoff,
}

/// How a single cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Observation committed, possibly with some fields missing
    Completed(Arc<Observation>),
    /// Session is healthy but no register could be read; cache values kept
    Empty,
    /// Session lost or never established; the scheduler backs off
    SessionLost(CommError),
}

/// Drives the poll loop of one device.
///
/// Cycles never overlap: the loop awaits each cycle (read, cache, persist,
/// publish) before waiting for the next tick, and ticks that fall due while a
/// cycle runs long are skipped rather than queued.
pub struct DevicePoller {
    manager: Arc<ConnectionManager>,
    fanout: Arc<ObservationFanout>,
    descriptors: Vec<RegisterDescriptor>,
    interval: Duration,
    backoff: Duration,
    state_tx: watch::Sender<PollState>,
}

impl DevicePoller {
    pub fn new(
        manager: Arc<ConnectionManager>,
        fanout: Arc<ObservationFanout>,
        interval: Duration,
        backoff: Duration,
    ) -> Self {
        let descriptors = manager.device().polled_registers();
        let (state_tx, _) = watch::channel(PollState::Idle);
        Self {
            manager,
            fanout,
            descriptors,
            interval: interval.max(Duration::from_millis(1)),
            backoff,
            state_tx,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<DeviceConfig> {
        self.manager.device()
    }

    #[inline]
    pub fn state(&self) -> PollState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollState> {
        self.state_tx.subscribe()
    }

    /// Run one cycle: connect if needed, read every polled register, fan out.
    #[instrument(name = "poll-cycle", skip_all, fields(device = %self.device().id))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let device = Arc::clone(self.device());
        let mut guard = self.manager.acquire().await;
        if let Err(e) = guard.ensure().await {
            self.fanout.record_failure(&device.id, &e);
            return CycleOutcome::SessionLost(e);
        }
        let read = RegisterReader::read(&mut guard, &self.descriptors).await;

        // Cache updates stay under the guard so they order with write failures.
        let committed = match read {
            Ok(obs) if !self.descriptors.is_empty() && obs.present_fields().next().is_none() => {
                warn!("No register could be read this cycle");
                self.fanout.record_failure(&device.id, "all register reads failed");
                return CycleOutcome::Empty;
            }
            Ok(obs) => self.fanout.commit(&device, obs),
            Err(e) => {
                self.fanout.record_failure(&device.id, &e);
                return CycleOutcome::SessionLost(e);
            }
        };
        drop(guard);

        self.fanout.deliver(&device, &committed).await;
        CycleOutcome::Completed(committed)
    }

    /// Spawn the poll loop; it exits when `token` is cancelled, after any
    /// in-flight cycle has finished.
    pub fn spawn(self: Arc<Self>, token: CancellationToken, jitter: Duration) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token, jitter).await })
    }

    async fn run(&self, token: CancellationToken, jitter: Duration) {
        let id = self.device().id.clone();
        if !jitter.is_zero() {
            tokio::select! {
                _ = sleep(jitter) => {}
                _ = token.cancelled() => return,
            }
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut backoff = Constant::new(self.backoff);
        info!(
            "✅ Device [{id}] polling started with {}ms interval",
            self.interval.as_millis()
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.state_tx.send_replace(PollState::InCycle);
            match self.run_cycle().await {
                CycleOutcome::Completed(obs) => {
                    debug!(device = %id, partial = obs.is_partial(), "Cycle completed");
                    self.state_tx.send_replace(PollState::Idle);
                }
                CycleOutcome::Empty => {
                    self.state_tx.send_replace(PollState::Idle);
                }
                CycleOutcome::SessionLost(e) => {
                    self.state_tx.send_replace(PollState::Backoff);
                    let delay = backoff.next_backoff().unwrap_or(self.backoff);
                    warn!(device = %id, error = %e, "Device unreachable, retrying in {}ms", delay.as_millis());
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = token.cancelled() => break,
                    }
                    self.state_tx.send_replace(PollState::Idle);
                    ticker.reset_immediately();
                }
            }
        }

        self.state_tx.send_replace(PollState::Idle);
        info!("📨 Device [{id}] polling cancelled");
    }
}
