//! Polling engine: per-device poll loops, latest-state cache, observation
//! fan-out to the store and live subscribers, and the request facade.
pub mod cache;
pub mod fanout;
pub mod gateway;
pub mod history;
pub mod poller;
pub mod realtime;

pub use cache::StateCache;
pub use fanout::ObservationFanout;
pub use gateway::RGGateway;
pub use history::HistoryAdapter;
pub use poller::{CycleOutcome, DevicePoller, PollState};
pub use realtime::RGRealtimeHub;
