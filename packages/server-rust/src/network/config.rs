//! Listener configuration for the gateway's HTTP front-end.

use std::path::PathBuf;
use std::time::Duration;

/// Bind address, TLS, CORS, and the outer HTTP timeout.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Hard ceiling on any HTTP request. Kept above the gateway's response
    /// timeout so a dispatch always answers with its own timeout message.
    pub request_timeout: Duration,
    /// Largest accepted request body. `None` reads bodies of any size.
    pub max_body_bytes: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_bytes: None,
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain.
    pub cert_path: PathBuf,
    /// Path to the PEM private key.
    pub key_path: PathBuf,
}
