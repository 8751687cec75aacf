//! Gateway server with deferred startup.
//!
//! `new()` assembles shared state, `start()` binds the listener, and
//! `serve()` accepts connections until shutdown. Between `new()` and
//! `serve()` other code can grab the pending registry, e.g. to wire an
//! in-process reply path.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::TlsConfig;
use super::handlers::{
    dispatch_handler, health_handler, liveness_handler, readiness_handler, reply_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::api::ApiTable;
use crate::config::GatewayConfig;
use crate::pending::PendingRegistry;
use crate::transport::Transport;

/// How long in-flight dispatches may run after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the gateway's shared state and HTTP listener.
pub struct NetworkModule {
    state: AppState,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Assembles shared state without binding any port.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured API table is invalid.
    pub fn new(config: GatewayConfig, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        let apis = ApiTable::new(config.apis.iter().cloned())?;
        let state = AppState {
            pending: Arc::new(PendingRegistry::new()),
            apis: Arc::new(apis),
            transport,
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
        };
        Ok(Self {
            state,
            listener: None,
        })
    }

    /// Registry of requests waiting for a reply.
    #[must_use]
    pub fn pending(&self) -> Arc<PendingRegistry> {
        Arc::clone(&self.state.pending)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Routes:
    /// - `POST /` -- dispatch to the API named by `X-API`
    /// - `POST /reply` -- bus reply ingress
    /// - `GET /health`, `/health/live`, `/health/ready`
    ///
    /// Request bodies are unbounded unless `max_body_bytes` is configured.
    pub fn build_router(&self) -> Router {
        let body_limit = match self.state.config.network.max_body_bytes {
            Some(max) => DefaultBodyLimit::max(max),
            None => DefaultBodyLimit::disable(),
        };
        Router::new()
            .route("/", post(dispatch_handler))
            .route("/reply", post(reply_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(body_limit)
            .layer(build_http_layers(&self.state.config.network))
            .with_state(self.state.clone())
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let network = &self.state.config.network;
        let addr = format!("{}:{}", network.host, network.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", network.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight dispatches.
    ///
    /// # Errors
    ///
    /// Returns an error on a fatal I/O or TLS setup failure.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();
        let controller = self.shutdown_controller();

        controller.set_ready();

        if let Some(tls) = self.state.config.network.tls.clone() {
            serve_tls(listener, router, &tls, shutdown).await?;
        } else {
            info!("Serving plain HTTP");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }

        drain(&controller, &self.state.pending).await;
        Ok(())
    }
}

/// Serves TLS from the pre-bound listener using `axum-server` with rustls.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn drain(controller: &ShutdownController, pending: &PendingRegistry) {
    controller.trigger_shutdown();

    let waiting = pending.len();
    if waiting > 0 {
        info!(waiting, "Draining requests still waiting for a reply");
    }

    if controller.wait_for_drain(DRAIN_TIMEOUT).await {
        info!("All dispatches drained");
    } else {
        warn!(
            in_flight = controller.in_flight_count(),
            "Drain timeout expired with dispatches outstanding"
        );
    }
}
