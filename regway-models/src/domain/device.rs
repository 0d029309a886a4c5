use serde::{Deserialize, Serialize};

use super::observation::DeviceStatus;

/// Register bank addressed by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Read-only input registers (function code 0x04)
    Input,
    /// Read/write holding registers (function code 0x03)
    Holding,
}

/// Logical value type stored in one or more consecutive registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterDataType {
    #[default]
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl RegisterDataType {
    /// Number of 16-bit registers occupied by one value.
    #[inline]
    pub fn word_count(&self) -> u16 {
        match self {
            RegisterDataType::U16 | RegisterDataType::I16 => 1,
            RegisterDataType::U32 | RegisterDataType::I32 | RegisterDataType::F32 => 2,
        }
    }
}

/// Byte or word ordering for multi-byte register values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    #[serde(rename = "big", alias = "big_endian")]
    BigEndian,
    #[serde(rename = "little", alias = "little_endian")]
    LittleEndian,
}

/// Static description of one named register on a device.
///
/// `scale` is the integer divisor turning a raw value into engineering units;
/// writes encode `round(value * scale)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    pub name: String,
    pub kind: RegisterKind,
    pub address: u16,
    /// Explicit register count; must agree with `data_type` when present.
    #[serde(default)]
    pub count: Option<u16>,
    #[serde(default = "RegisterDescriptor::scale_default")]
    pub scale: u32,
    #[serde(default)]
    pub data_type: RegisterDataType,
    #[serde(default)]
    pub byte_order: Endianness,
    #[serde(default)]
    pub word_order: Endianness,
    /// Decimal places kept after scaling
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub writable: Option<bool>,
    /// Whether the poller reads this register every cycle
    #[serde(default = "RegisterDescriptor::poll_default")]
    pub poll: bool,
}

impl RegisterDescriptor {
    fn scale_default() -> u32 {
        1
    }

    fn poll_default() -> bool {
        true
    }

    /// Shorthand for a single-word register with a scale divisor.
    pub fn word(name: &str, kind: RegisterKind, address: u16, scale: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            address,
            count: None,
            scale,
            data_type: RegisterDataType::U16,
            byte_order: Endianness::BigEndian,
            word_order: Endianness::BigEndian,
            precision: None,
            writable: None,
            poll: true,
        }
    }

    /// Registers transferred per transaction for this descriptor.
    #[inline]
    pub fn word_count(&self) -> u16 {
        self.data_type.word_count()
    }

    /// Input registers are never writable; holding registers are unless disabled.
    #[inline]
    pub fn is_writable(&self) -> bool {
        match self.kind {
            RegisterKind::Input => false,
            RegisterKind::Holding => self.writable.unwrap_or(true),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("register name must not be empty".into());
        }
        if self.scale == 0 {
            return Err(format!("register `{}`: scale must be > 0", self.name));
        }
        if let Some(count) = self.count {
            if count != self.word_count() {
                return Err(format!(
                    "register `{}`: count {} does not match data type {:?} ({} words)",
                    self.name,
                    count,
                    self.data_type,
                    self.word_count()
                ));
            }
        }
        if self.kind == RegisterKind::Input && self.writable == Some(true) {
            return Err(format!(
                "register `{}`: input registers cannot be writable",
                self.name
            ));
        }
        if self.address.checked_add(self.word_count() - 1).is_none() {
            return Err(format!("register `{}`: address range overflows", self.name));
        }
        Ok(())
    }
}

/// Parity setting for serial links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    None,
    Odd,
    #[default]
    Even,
}

/// Transport used to reach a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Tcp {
        host: String,
        #[serde(default = "ConnectionConfig::tcp_port_default")]
        port: u16,
    },
    Rtu {
        port: String,
        #[serde(default = "ConnectionConfig::baud_rate_default")]
        baud_rate: u32,
        #[serde(default)]
        parity: SerialParity,
        #[serde(default = "ConnectionConfig::data_bits_default")]
        data_bits: u8,
        #[serde(default = "ConnectionConfig::stop_bits_default")]
        stop_bits: u8,
    },
}

impl ConnectionConfig {
    fn tcp_port_default() -> u16 {
        502
    }

    fn baud_rate_default() -> u32 {
        9600
    }

    fn data_bits_default() -> u8 {
        8
    }

    fn stop_bits_default() -> u8 {
        1
    }

    /// Human readable endpoint, used in logs and error messages.
    pub fn endpoint(&self) -> String {
        match self {
            ConnectionConfig::Tcp { host, port } => format!("{host}:{port}"),
            ConnectionConfig::Rtu {
                port, baud_rate, ..
            } => format!("{port}@{baud_rate}"),
        }
    }
}

/// Static configuration of one physical controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Built-in register map to start from (`fy600`, `float_meter`)
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub measurement: Option<String>,
    pub connection: ConnectionConfig,
    #[serde(default = "DeviceConfig::unit_id_default")]
    pub unit_id: u8,
    /// Per-device override of the poll interval
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub registers: Vec<RegisterDescriptor>,
}

impl DeviceConfig {
    fn unit_id_default() -> u8 {
        1
    }

    /// Name used for the `device` tag and in logs; falls back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Apply the named profile (if any) and check the register map.
    ///
    /// Explicit registers override profile registers with the same name.
    pub fn resolve(mut self) -> Result<Self, String> {
        if self.id.trim().is_empty() {
            return Err("device id must not be empty".into());
        }
        if let Some(profile) = self.profile.as_deref() {
            let profile = DeviceProfile::by_name(profile)
                .ok_or_else(|| format!("device `{}`: unknown profile `{profile}`", self.id))?;
            let mut registers = profile.registers();
            for explicit in self.registers.drain(..) {
                match registers.iter_mut().find(|r| r.name == explicit.name) {
                    Some(slot) => *slot = explicit,
                    None => registers.push(explicit),
                }
            }
            self.registers = registers;
            if self.measurement.is_none() {
                self.measurement = Some(profile.measurement().to_string());
            }
        }
        if self.registers.is_empty() {
            return Err(format!("device `{}`: no registers configured", self.id));
        }
        for (i, reg) in self.registers.iter().enumerate() {
            reg.validate()
                .map_err(|e| format!("device `{}`: {e}", self.id))?;
            if self.registers[..i].iter().any(|r| r.name == reg.name) {
                return Err(format!(
                    "device `{}`: duplicate register `{}`",
                    self.id, reg.name
                ));
            }
        }
        if self.measurement.is_none() {
            self.measurement = Some(self.id.clone());
        }
        Ok(self)
    }

    pub fn measurement(&self) -> &str {
        self.measurement.as_deref().unwrap_or(&self.id)
    }

    pub fn register(&self, name: &str) -> Option<&RegisterDescriptor> {
        self.registers.iter().find(|r| r.name == name)
    }

    /// Registers read on every poll cycle, in configured order.
    pub fn polled_registers(&self) -> Vec<RegisterDescriptor> {
        self.registers.iter().filter(|r| r.poll).cloned().collect()
    }
}

/// Register maps for controller families deployed in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// FY600 temperature controller: process value, setpoint, output, PID tuning
    Fy600,
    /// Two-register IEEE-754 meter, little-endian word order
    FloatMeter,
}

impl DeviceProfile {
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "fy600" => Some(DeviceProfile::Fy600),
            "float_meter" => Some(DeviceProfile::FloatMeter),
            _ => None,
        }
    }

    pub fn measurement(&self) -> &'static str {
        match self {
            DeviceProfile::Fy600 => "fy600",
            DeviceProfile::FloatMeter => "modbus_reading",
        }
    }

    pub fn registers(&self) -> Vec<RegisterDescriptor> {
        use RegisterKind::*;
        match self {
            DeviceProfile::Fy600 => {
                let tuning = |name: &str, address: u16, scale: u32| RegisterDescriptor {
                    poll: false,
                    ..RegisterDescriptor::word(name, Holding, address, scale)
                };
                vec![
                    RegisterDescriptor::word("pv", Input, 0x008A, 1),
                    RegisterDescriptor::word("sv", Holding, 0x0000, 10),
                    RegisterDescriptor::word("output", Input, 0x0087, 10),
                    tuning("pid_p", 0x0039, 10),
                    tuning("pid_i", 0x003A, 1),
                    tuning("pid_d", 0x003B, 1),
                ]
            }
            DeviceProfile::FloatMeter => vec![RegisterDescriptor {
                data_type: RegisterDataType::F32,
                word_order: Endianness::LittleEndian,
                precision: Some(2),
                ..RegisterDescriptor::word("value", Holding, 0x0000, 1)
            }],
        }
    }
}

/// Register summary exposed by device listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInfo {
    pub name: String,
    pub kind: RegisterKind,
    pub address: u16,
    pub scale: u32,
    pub writable: bool,
    pub polled: bool,
}

impl From<&RegisterDescriptor> for RegisterInfo {
    fn from(r: &RegisterDescriptor) -> Self {
        Self {
            name: r.name.clone(),
            kind: r.kind,
            address: r.address,
            scale: r.scale,
            writable: r.is_writable(),
            polled: r.poll,
        }
    }
}

/// Device information used for read-only responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub measurement: String,
    pub endpoint: String,
    pub unit_id: u8,
    pub status: DeviceStatus,
    pub registers: Vec<RegisterInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp() -> ConnectionConfig {
        ConnectionConfig::Tcp {
            host: "127.0.0.1".into(),
            port: 502,
        }
    }

    #[test]
    fn fy600_profile_resolves() {
        let dev = DeviceConfig {
            id: "fy600".into(),
            name: None,
            profile: Some("fy600".into()),
            measurement: None,
            connection: tcp(),
            unit_id: 1,
            interval_ms: None,
            registers: vec![],
        }
        .resolve()
        .unwrap();
        assert_eq!(dev.measurement(), "fy600");
        let polled: Vec<_> = dev.polled_registers().into_iter().map(|r| r.name).collect();
        assert_eq!(polled, vec!["pv", "sv", "output"]);
        assert!(dev.register("pid_p").unwrap().is_writable());
        assert!(!dev.register("pv").unwrap().is_writable());
    }

    #[test]
    fn explicit_register_overrides_profile() {
        let dev = DeviceConfig {
            id: "fy".into(),
            name: Some("Line 1".into()),
            profile: Some("fy600".into()),
            measurement: Some("line1".into()),
            connection: tcp(),
            unit_id: 3,
            interval_ms: None,
            registers: vec![RegisterDescriptor::word("pv", RegisterKind::Input, 0x008A, 10)],
        }
        .resolve()
        .unwrap();
        assert_eq!(dev.register("pv").unwrap().scale, 10);
        assert_eq!(dev.measurement(), "line1");
        assert_eq!(dev.display_name(), "Line 1");
    }

    #[test]
    fn rejects_writable_input_and_bad_count() {
        let mut reg = RegisterDescriptor::word("x", RegisterKind::Input, 1, 1);
        reg.writable = Some(true);
        assert!(reg.validate().is_err());

        let mut reg = RegisterDescriptor::word("y", RegisterKind::Holding, 1, 1);
        reg.data_type = RegisterDataType::F32;
        reg.count = Some(1);
        assert!(reg.validate().is_err());
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let res = DeviceConfig {
            id: "d".into(),
            name: None,
            profile: Some("nope".into()),
            measurement: None,
            connection: tcp(),
            unit_id: 1,
            interval_ms: None,
            registers: vec![],
        }
        .resolve();
        assert!(res.is_err());
    }
}
