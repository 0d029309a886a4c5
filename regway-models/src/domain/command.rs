use serde::{Deserialize, Serialize};
use validator::Validate;

/// A single encoded register write, resolved from a named request.
///
/// Transient: lives only for the duration of one write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub device_id: String,
    pub register: String,
    pub register_address: u16,
    /// Raw words, already scaled and ordered for the wire
    pub raw_value: Vec<u16>,
}

/// Outcome of an ordered write call.
///
/// `applied` counts the commands that completed, in order; when `failed_index`
/// is set, every command after it was left unattempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub applied: usize,
    pub failed_index: Option<usize>,
    pub error: Option<String>,
}

impl WriteReport {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.failed_index.is_none()
    }
}

/// Named engineering-unit value destined for a register.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWrite {
    #[validate(length(min = 1))]
    pub name: String,
    pub value: f64,
}

/// Payload for writing one named register.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WriteRegisterPayload {
    pub value: f64,
}

/// Payload for an ordered multi-register write.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WriteRegistersPayload {
    #[validate(length(min = 1), nested)]
    pub writes: Vec<RegisterWrite>,
}

/// Response shape for `SetRegister` / `SetRegisters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResultView {
    pub ok: bool,
    pub applied_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_index: Option<usize>,
    pub message: String,
}

impl From<WriteReport> for WriteResultView {
    fn from(r: WriteReport) -> Self {
        let message = match (&r.failed_index, &r.error) {
            (None, _) => format!("{} register(s) written", r.applied),
            (Some(i), Some(e)) => format!("write #{i} failed: {e}"),
            (Some(i), None) => format!("write #{i} failed"),
        };
        Self {
            ok: r.is_ok(),
            applied_count: r.applied,
            failed_index: r.failed_index,
            message,
        }
    }
}
