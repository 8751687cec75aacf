//! `busgate` -- runs the HTTP gateway in front of the bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use busgate_server::network::TlsConfig;
use busgate_server::{GatewayConfig, HttpTransport, NetworkModule};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Fmt,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "busgate", about = "HTTP gateway dispatching requests into a component bus")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "BUSGATE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind; 0 picks a free port.
    #[arg(long, env = "BUSGATE_PORT", default_value_t = 8080)]
    port: u16,

    /// JSON file declaring the entrance and the API table.
    #[arg(long, env = "BUSGATE_APIS")]
    apis: PathBuf,

    /// Seconds to wait for a bus reply before answering 500.
    #[arg(long, env = "BUSGATE_RESPONSE_TIMEOUT_SECS", default_value_t = 15)]
    response_timeout_secs: u64,

    /// Largest accepted request body in bytes; unlimited when unset.
    #[arg(long, env = "BUSGATE_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,

    #[arg(long, env = "BUSGATE_LOG_FORMAT", value_enum, default_value = "fmt")]
    log_format: LogFormat,

    /// PEM certificate chain; enables TLS together with `--tls-key`.
    #[arg(long, env = "BUSGATE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "BUSGATE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Fmt => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = GatewayConfig::default();
    config.network.host = args.host;
    config.network.port = args.port;
    config.response_timeout = Duration::from_secs(args.response_timeout_secs);
    if let (Some(cert_path), Some(key_path)) = (args.tls_cert, args.tls_key) {
        config.network.tls = Some(TlsConfig {
            cert_path,
            key_path,
        });
    }
    config.load_apis(&args.apis)?;
    config.network.max_body_bytes = args.max_body_bytes;
    config.fit_request_timeout();

    info!(apis = config.apis.len(), entrance = ?config.entrance, "configuration loaded");

    let mut module = NetworkModule::new(config, Arc::new(HttpTransport::default()))?;
    module.start().await?;
    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
