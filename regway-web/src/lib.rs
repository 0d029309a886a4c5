//! HTTP and WebSocket request layer.
mod api;
mod middleware;

use actix_web::{
    dev::{Server, ServerHandle},
    middleware::{Compress, Logger, NormalizePath},
    web::{self, Data},
    App, HttpServer,
};
use async_trait::async_trait;
use middleware::cors::middleware;
use regway_error::{init::InitContextError, RGError, RGResult};
use regway_models::{settings::Settings, Gateway, WebServer};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<dyn Gateway>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

/// Register every route: public ones at the root, the API under `router_prefix`.
pub fn configure_app(router_prefix: String) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        cfg.configure(api::configure_public_routes)
            .service(web::scope(&router_prefix).configure(api::configure_routes));
    }
}

#[derive(Clone)]
pub struct RGWebServer {
    /// Server handle for graceful shutdown
    server: Arc<Mutex<Option<ServerHandle>>>,
}

impl RGWebServer {
    fn create_server(settings: &Settings, gateway: Arc<dyn Gateway>) -> RGResult<Server> {
        let addr = format!("{}:{}", settings.web.host, settings.web.port);
        let routes = configure_app(settings.web.router_prefix.clone());
        let worker_count = settings.web.get_worker_count();
        let cors_config = settings.web.cors.clone();
        let state = Arc::new(AppState::new(gateway));

        let server = HttpServer::new(move || {
            App::new()
                .app_data(Data::new(Arc::clone(&state)))
                .wrap(middleware(&cors_config))
                .wrap(Logger::default())
                .wrap(Compress::default())
                .wrap(NormalizePath::trim())
                .configure(routes.clone())
        })
        .workers(worker_count)
        .bind(&addr)
        .map_err(|e| RGError::from(format!("Failed to bind HTTP server to {addr}: {e}")))?;

        info!("HTTP server listening on {addr} with {worker_count} workers");
        Ok(server.run())
    }
}

#[async_trait]
impl WebServer for RGWebServer {
    #[instrument(name = "init-web-server", skip_all)]
    async fn init(
        settings: &Settings,
        gateway: Arc<dyn Gateway>,
    ) -> RGResult<Arc<Self>, InitContextError> {
        let server = Self::create_server(settings, gateway).map_err(|e| {
            InitContextError::Primitive(format!("Failed to create web server: {e}"))
        })?;
        let server_handle = server.handle();

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!(error=%e, "Web server failed to start");
            }
        });

        Ok(Arc::new(RGWebServer {
            server: Arc::new(Mutex::new(Some(server_handle))),
        }))
    }

    #[instrument(name = "web-server-stop", skip_all)]
    async fn stop(&self) -> RGResult<()> {
        info!("🛑 Stopping web server...");
        if let Some(handle) = self.server.lock().await.take() {
            handle.stop(true).await;
        }
        info!("✅ Web server stopped successfully");
        Ok(())
    }
}
