pub use super::command::{
    RegisterWrite, WriteCommand, WriteRegisterPayload, WriteRegistersPayload, WriteReport,
    WriteResultView,
};
pub use super::device::{
    ConnectionConfig, DeviceConfig, DeviceInfo, DeviceProfile, Endianness, RegisterDataType,
    RegisterDescriptor, RegisterInfo, RegisterKind, SerialParity,
};
pub use super::history::{HistoryQuery, HistoryRecord, HistoryRow};
pub use super::observation::{DeviceSnapshot, DeviceStatus, LatestView, Observation};
