//! Process-level plumbing shared by the regway binary: logging setup, the
//! application context that wires settings, gateway and web server, and
//! signal-driven graceful shutdown.
mod logger;

pub use logger::Logger;
pub use regway_error::{RGError, RGResult};

use regway_models::{settings::Settings, Gateway, WebServer};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
#[cfg(windows)]
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, instrument, span, Level};

pub struct RGAppContext {
    settings: Settings,
    logger: Logger,
    gateway: Arc<dyn Gateway>,
    web_server: Arc<dyn WebServer>,
    /// Flag to prevent duplicate shutdowns
    shutting_down: AtomicBool,
    shutdown_token: CancellationToken,
}

impl RGAppContext {
    /// Builds the application: settings, runtime dir, logger, gateway, web server.
    ///
    /// `build_gateway` receives the loaded settings and returns the polling
    /// engine (store included); the web server is initialized on top of it.
    pub async fn init<W, F, Fut>(config: String, build_gateway: F) -> RGResult<Self>
    where
        W: WebServer + 'static,
        F: FnOnce(Settings) -> Fut,
        Fut: Future<Output = RGResult<Arc<dyn Gateway>>>,
    {
        let settings = Settings::new(config)?;

        apply_runtime_dir(&settings.general.runtime_dir)?;

        let mut logger = Logger::new(Some(Logger::parse_level(
            settings.general.log_level.as_deref(),
        )));
        logger.initialize()?;

        let span = span!(Level::INFO, "init-app");
        let _guard = span.enter();

        info!(devices = settings.devices.len(), store = ?settings.store.kind, "Settings loaded");

        let gateway = build_gateway(settings.clone()).await?;
        info!("Gateway initialized successfully.");

        let web_server: Arc<dyn WebServer> = W::init(&settings, Arc::clone(&gateway)).await?;
        info!("Web server initialized successfully.");

        Ok(RGAppContext {
            settings,
            logger,
            gateway,
            web_server,
            shutting_down: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        })
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::clone(&self.gateway)
    }

    #[inline]
    pub fn change_log_level(&self, level: Level) {
        self.logger.set_level(level);
    }

    /// Request shutdown from inside the process.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Starts device polling, then blocks until a shutdown signal arrives.
    pub async fn run(&self) -> RGResult<()> {
        self.gateway.start().await?;
        info!("Polling started; waiting for shutdown signal");
        self.listen_for_shutdown(async { self.graceful_shutdown().await })
            .await
    }

    async fn listen_for_shutdown<F>(&self, shutdown_fn: F) -> RGResult<()>
    where
        F: Future<Output = RGResult<()>>,
    {
        let shutdown_token = self.shutdown_token.clone();

        #[cfg(unix)]
        {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
            let mut sighup =
                signal(SignalKind::hangup()).expect("failed to register SIGHUP handler");
            let mut sigquit =
                signal(SignalKind::quit()).expect("failed to register SIGQUIT handler");

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT signal");
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP signal");
                }
                _ = sigquit.recv() => {
                    info!("Received SIGQUIT signal");
                }
                _ = shutdown_token.cancelled() => {}
            }
        }

        #[cfg(windows)]
        {
            tokio::select! {
                _ = ctrl_c() => {
                    info!("Received ctrl-c signal");
                }
                _ = shutdown_token.cancelled() => {}
            }
        }

        shutdown_fn.await
    }

    /// Stops the request layer first, then the pollers (which close sessions).
    #[instrument(name = "graceful-shutdown", skip_all)]
    pub async fn graceful_shutdown(&self) -> RGResult<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Starting graceful shutdown...");

        if let Err(e) = self.web_server.stop().await {
            error!(error = %e, "Web server stop failed");
        }

        let tracker = TaskTracker::new();
        let gateway = Arc::clone(&self.gateway);
        tracker.spawn(async move {
            if let Err(e) = gateway.stop().await {
                error!(error = %e, "Gateway stop failed");
            }
        });

        info!("Waiting for pollers to finish...");
        tracker.close();
        tracker.wait().await;

        info!("Graceful shutdown completed");
        Ok(())
    }
}

/// Switch the process working directory so relative paths (`./logs`) resolve under it.
fn apply_runtime_dir(runtime_dir: &str) -> RGResult<()> {
    let dir = runtime_dir.trim();
    if dir.is_empty() || dir == "." {
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .map_err(|e| RGError::from(format!("Failed to create runtime_dir {}: {}", dir, e)))?;

    std::env::set_current_dir(dir).map_err(|e| {
        RGError::from(format!(
            "Failed to set current_dir to runtime_dir {}: {}",
            dir, e
        ))
    })?;

    Ok(())
}
