use async_trait::async_trait;
use regway_error::{comm::CommError, CommResult};
use regway_models::domain::prelude::{ConnectionConfig, DeviceConfig, RegisterKind, SerialParity};
use std::fmt::Display;
use tokio_modbus::{
    client::{rtu, tcp, Client as _, Context, Reader, Writer},
    slave::Slave,
    ExceptionCode,
};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};

/// A live, stateful link to one device.
///
/// Implementations are not safe for concurrent use; callers serialize access
/// through the owning [`ConnectionManager`](crate::ConnectionManager).
///
/// Errors follow the driver taxonomy: a rejected request on a working link is
/// `TransactionFailed`; a broken link is `ConnectFailed`.
#[async_trait]
pub trait RegisterSession: Send {
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> CommResult<Vec<u16>>;

    async fn write_register(&mut self, address: u16, value: u16) -> CommResult<()>;

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> CommResult<()>;

    /// Best-effort release of the underlying transport.
    async fn close(&mut self);
}

/// Opens sessions for a device; the connection manager bounds the call with a timeout.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    async fn connect(&self, device: &DeviceConfig) -> CommResult<Box<dyn RegisterSession>>;
}

/// tokio-modbus backed connector for TCP and RTU devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModbusConnector;

#[async_trait]
impl SessionConnector for ModbusConnector {
    async fn connect(&self, device: &DeviceConfig) -> CommResult<Box<dyn RegisterSession>> {
        let slave = Slave(device.unit_id);
        let ctx = match &device.connection {
            ConnectionConfig::Tcp { host, port } => {
                let addr = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| CommError::ConnectFailed(format!("resolve {host}: {e}")))?
                    .next()
                    .ok_or_else(|| {
                        CommError::ConnectFailed(format!("no address for {host}:{port}"))
                    })?;
                tcp::connect_slave(addr, slave).await.map_err(|e| {
                    CommError::ConnectFailed(format!("Modbus TCP connect {addr}: {e}"))
                })?
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                parity,
                data_bits,
                stop_bits,
            } => {
                let stream = tokio_serial::new(port, *baud_rate)
                    .data_bits(data_bits_of(*data_bits)?)
                    .stop_bits(stop_bits_of(*stop_bits)?)
                    .parity(parity_of(*parity))
                    .open_native_async()
                    .map_err(|e| {
                        CommError::ConnectFailed(format!("Failed to open serial port {port}: {e}"))
                    })?;
                rtu::attach_slave(stream, slave)
            }
        };
        Ok(Box::new(ModbusSession { ctx }))
    }
}

fn data_bits_of(bits: u8) -> CommResult<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        n => Err(CommError::ConnectFailed(format!("unsupported data bits {n}"))),
    }
}

fn stop_bits_of(bits: u8) -> CommResult<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        n => Err(CommError::ConnectFailed(format!("unsupported stop bits {n}"))),
    }
}

fn parity_of(parity: SerialParity) -> Parity {
    match parity {
        SerialParity::None => Parity::None,
        SerialParity::Odd => Parity::Odd,
        SerialParity::Even => Parity::Even,
    }
}

struct ModbusSession {
    ctx: Context,
}

/// Flatten tokio-modbus' nested result into the driver taxonomy.
fn classify<T, E: Display>(
    op: &str,
    res: Result<Result<T, ExceptionCode>, E>,
) -> CommResult<T> {
    match res {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(code)) => Err(CommError::TransactionFailed(format!(
            "Modbus exception on {op}: {code:?}"
        ))),
        Err(e) => Err(CommError::ConnectFailed(format!("{op}: {e}"))),
    }
}

#[async_trait]
impl RegisterSession for ModbusSession {
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> CommResult<Vec<u16>> {
        match kind {
            RegisterKind::Holding => classify(
                "read_holding_registers",
                self.ctx.read_holding_registers(address, count).await,
            ),
            RegisterKind::Input => classify(
                "read_input_registers",
                self.ctx.read_input_registers(address, count).await,
            ),
        }
    }

    async fn write_register(&mut self, address: u16, value: u16) -> CommResult<()> {
        classify(
            "write_single_register",
            self.ctx.write_single_register(address, value).await,
        )
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> CommResult<()> {
        classify(
            "write_multiple_registers",
            self.ctx.write_multiple_registers(address, values).await,
        )
    }

    async fn close(&mut self) {
        let _ = self.ctx.disconnect().await;
    }
}
