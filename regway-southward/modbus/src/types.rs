use regway_models::domain::prelude::DeviceStatus;

/// Session lifecycle published by a [`ConnectionManager`](crate::ConnectionManager)
/// on its watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl ConnectionState {
    /// Collapse into the status consumers see.
    pub fn as_status(&self) -> DeviceStatus {
        match self {
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                DeviceStatus::Disconnected
            }
            ConnectionState::Connected => DeviceStatus::Connected,
            ConnectionState::Failed(_) => DeviceStatus::Error,
        }
    }
}
