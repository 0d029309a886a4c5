use crate::{codec::RegisterCodec, connection::SessionGuard};
use chrono::Utc;
use regway_error::CommResult;
use regway_models::domain::prelude::{DeviceStatus, Observation, RegisterDescriptor};
use std::collections::BTreeMap;
use tracing::{instrument, warn};

/// Executes one read cycle over a held session.
pub struct RegisterReader;

impl RegisterReader {
    /// Read every descriptor in order, one transaction each.
    ///
    /// A failed transaction leaves its field `None` and the cycle continues;
    /// a session-fatal error aborts the cycle (the guard has already
    /// invalidated the session). `captured_at` is taken when the cycle completes.
    #[instrument(level = "debug", skip_all, fields(device = %guard.device().id))]
    pub async fn read(
        guard: &mut SessionGuard<'_>,
        descriptors: &[RegisterDescriptor],
    ) -> CommResult<Observation> {
        let mut fields = BTreeMap::new();
        for desc in descriptors {
            let value = match guard.read(desc.kind, desc.address, desc.word_count()).await {
                Ok(words) => RegisterCodec::decode(&words, desc),
                Err(e) => Err(e),
            };
            match value {
                Ok(v) => {
                    fields.insert(desc.name.clone(), Some(v));
                }
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => {
                    warn!(register = %desc.name, address = desc.address, error = %e, "Register read failed");
                    fields.insert(desc.name.clone(), None);
                }
            }
        }
        Ok(Observation {
            device_id: guard.device().id.clone(),
            fields,
            captured_at: Utc::now(),
            status: DeviceStatus::Connected,
        })
    }
}
