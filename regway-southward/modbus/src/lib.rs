//! Modbus southbound driver: per-device session ownership, ordered register
//! reads and writes, and the register value codec.
pub mod codec;
pub mod connection;
pub mod reader;
pub mod session;
pub mod types;
pub mod writer;

pub use codec::RegisterCodec;
pub use connection::{ConnectionManager, SessionGuard};
pub use reader::RegisterReader;
pub use session::{ModbusConnector, RegisterSession, SessionConnector};
pub use types::ConnectionState;
pub use writer::{RegisterWriter, WriteFailure};
