//! Realtime observation hub.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a subscriber
//! whose queue is full is evicted and its stream ends, so one slow consumer
//! cannot hold back the poll loop or the other subscribers.

use dashmap::DashMap;
use regway_models::{domain::prelude::Observation, RealtimeHub, Subscription};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

struct Subscriber {
    /// `None` receives every device
    device_id: Option<String>,
    tx: mpsc::Sender<Arc<Observation>>,
}

impl Subscriber {
    #[inline]
    fn matches(&self, device_id: &str) -> bool {
        self.device_id.as_deref().map_or(true, |d| d == device_id)
    }
}

pub struct RGRealtimeHub {
    subscribers: DashMap<u64, Subscriber>,
    next_id: AtomicU64,
    capacity: usize,
}

impl RGRealtimeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }
}

impl RealtimeHub for RGRealtimeHub {
    fn subscribe(self: Arc<Self>, device_id: Option<String>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber = id, device = ?device_id, "Realtime subscriber added");
        self.subscribers.insert(id, Subscriber { device_id, tx });
        Subscription::new(id, rx, self)
    }

    fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "Realtime subscriber removed");
        }
    }

    fn publish(&self, observation: &Arc<Observation>) {
        let mut evicted = Vec::new();
        for entry in self.subscribers.iter() {
            if !entry.matches(&observation.device_id) {
                continue;
            }
            match entry.tx.try_send(Arc::clone(observation)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = *entry.key(), "Realtime subscriber lagging, dropping it");
                    evicted.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => evicted.push(*entry.key()),
            }
        }
        // Removal happens after iteration: DashMap shards are read-locked above.
        for id in evicted {
            self.subscribers.remove(&id);
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use regway_models::domain::prelude::DeviceStatus;
    use std::collections::BTreeMap;

    fn obs(device: &str) -> Arc<Observation> {
        Arc::new(Observation {
            device_id: device.into(),
            fields: BTreeMap::new(),
            captured_at: Utc::now(),
            status: DeviceStatus::Connected,
        })
    }

    #[test]
    fn filter_by_device() {
        let hub = Arc::new(RGRealtimeHub::new(4));
        let mut only_a = Arc::clone(&hub).subscribe(Some("a".into()));
        let mut all = Arc::clone(&hub).subscribe(None);

        hub.publish(&obs("a"));
        hub.publish(&obs("b"));

        assert_eq!(only_a.try_recv().unwrap().device_id, "a");
        assert!(only_a.try_recv().is_err());
        assert_eq!(all.try_recv().unwrap().device_id, "a");
        assert_eq!(all.try_recv().unwrap().device_id, "b");
    }

    #[test]
    fn full_queue_evicts_subscriber() {
        let hub = Arc::new(RGRealtimeHub::new(1));
        let mut slow = Arc::clone(&hub).subscribe(None);
        let mut fast = Arc::clone(&hub).subscribe(None);

        hub.publish(&obs("a"));
        assert!(fast.try_recv().is_ok());
        hub.publish(&obs("a"));

        assert_eq!(hub.subscriber_count(), 1);
        assert!(slow.try_recv().is_ok());
        assert!(matches!(
            slow.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(fast.try_recv().is_ok());
    }

    #[test]
    fn drop_releases_registration() {
        let hub = Arc::new(RGRealtimeHub::new(4));
        let sub = Arc::clone(&hub).subscribe(Some("a".into()));
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        hub.publish(&obs("a"));
    }
}
