use crate::connection::SessionGuard;
use regway_error::comm::CommError;
use regway_models::domain::prelude::WriteCommand;
use tracing::{info, instrument, warn};

/// First failure of an ordered write: `applied` commands completed before
/// command `index` failed; later commands were not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub applied: usize,
    pub index: usize,
    pub error: CommError,
}

/// Applies write commands in order over a held session.
pub struct RegisterWriter;

impl RegisterWriter {
    /// Write each command as its own transaction, stopping at the first failure.
    ///
    /// Never connects: with no session held the call fails before any transaction.
    #[instrument(level = "debug", skip_all, fields(device = %guard.device().id, commands = commands.len()))]
    pub async fn write(
        guard: &mut SessionGuard<'_>,
        commands: &[WriteCommand],
    ) -> Result<usize, WriteFailure> {
        if commands.is_empty() {
            return Ok(0);
        }
        guard.require_connected().map_err(|error| WriteFailure {
            applied: 0,
            index: 0,
            error,
        })?;
        for (index, cmd) in commands.iter().enumerate() {
            if let Err(error) = guard.write(cmd.register_address, &cmd.raw_value).await {
                warn!(register = %cmd.register, index, error = %error, "Register write failed");
                return Err(WriteFailure {
                    applied: index,
                    index,
                    error,
                });
            }
            info!(register = %cmd.register, address = cmd.register_address, raw = ?cmd.raw_value, "Register written");
        }
        Ok(commands.len())
    }
}
