use clap::Parser;
use regway_common::RGAppContext;
use regway_core::RGGateway;
use regway_error::{RGError, RGResult};
use regway_models::{constants::DEFAULT_CONFIG_FILE_NAME, Gateway};
use regway_storage::init_store;
use regway_web::RGWebServer;
use std::{env::current_dir, path::PathBuf, sync::Arc};

/// Register gateway
///
/// Polls Modbus controllers on a fixed cadence, keeps their latest values,
/// persists every reading to a time-series store and serves them over
/// HTTP and WebSocket.
#[derive(Parser)]
#[command(name = "regway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Register gateway", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, the gateway looks for 'regway.toml' in the current
    /// working directory.
    #[arg(short, long, env = "RG_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> RGResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| RGError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };

    let ctx = RGAppContext::init::<RGWebServer, _, _>(
        config_path.to_string_lossy().to_string(),
        |settings| async move {
            let store = init_store(&settings.store)?;
            let gateway: Arc<dyn Gateway> = RGGateway::init(&settings, store).await?;
            Ok(gateway)
        },
    )
    .await?;

    ctx.run().await
}
