//! Gateway-level configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use busgate_core::ComponentRef;
use serde::Deserialize;

use crate::api::ApiPort;
use crate::network::NetworkConfig;

/// How long a dispatch waits for its bus reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Slack between the response timeout and the outer HTTP timeout.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Top-level configuration for a gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listener, TLS, CORS, and outer request timeout.
    pub network: NetworkConfig,
    /// Maximum time to wait for a reply before answering 500.
    pub response_timeout: Duration,
    /// Stamped on every envelope so the terminal hop knows where to reply.
    pub entrance: Option<ComponentRef>,
    /// Registered APIs, selected per request by the `X-API` header.
    pub apis: Vec<ApiPort>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            entrance: None,
            apis: Vec::new(),
        }
    }
}

/// On-disk layout of the API file.
///
/// ```json
/// {
///   "entrance": {"name": "gateway", "mq_type": "http", "in": "http://gw:8080/reply"},
///   "apis": [
///     {"name": "svcA", "graph": [{"name": "auth", "mq_type": "http", "in": "http://auth/in"}]}
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
struct ApiFile {
    #[serde(default)]
    entrance: Option<ComponentRef>,
    #[serde(default)]
    apis: Vec<ApiPort>,
}

impl GatewayConfig {
    /// Loads the entrance and API list from a JSON file, replacing any
    /// previously configured APIs. An entrance already set is kept when the
    /// file does not declare one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_apis(&mut self, path: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read api file {}", path.display()))?;
        let file: ApiFile = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse api file {}", path.display()))?;

        if file.entrance.is_some() {
            self.entrance = file.entrance;
        }
        self.apis = file.apis;
        Ok(())
    }

    /// Raises the outer HTTP timeout above the response timeout so a slow
    /// dispatch still answers with its own timeout body.
    pub fn fit_request_timeout(&mut self) {
        if self.network.request_timeout <= self.response_timeout {
            self.network.request_timeout =
                self.response_timeout.saturating_add(REQUEST_TIMEOUT_MARGIN);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn gateway_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.response_timeout, Duration::from_secs(15));
        assert!(config.entrance.is_none());
        assert!(config.apis.is_empty());
    }

    #[test]
    fn load_apis_reads_entrance_and_ports() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "entrance": {{"name": "gateway", "mq_type": "http", "in": "http://gw/reply"}},
                "apis": [
                    {{"name": "svcA", "graph": [{{"name": "auth", "mq_type": "http", "in": "http://auth/in"}}]}}
                ]
            }}"#
        )
        .unwrap();

        let mut config = GatewayConfig::default();
        config.load_apis(file.path()).unwrap();
        assert_eq!(config.entrance.as_ref().unwrap().name, "gateway");
        assert_eq!(config.apis.len(), 1);
        assert_eq!(config.apis[0].name, "svcA");
    }

    #[test]
    fn load_apis_keeps_existing_entrance() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"apis": []}}"#).unwrap();

        let mut config = GatewayConfig {
            entrance: Some(ComponentRef::new("gw", "http", "http://gw/reply")),
            ..GatewayConfig::default()
        };
        config.load_apis(file.path()).unwrap();
        assert_eq!(config.entrance.unwrap().name, "gw");
    }

    #[test]
    fn load_apis_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let mut config = GatewayConfig::default();
        let err = config.load_apis(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse api file"));
    }

    #[test]
    fn fit_request_timeout_keeps_larger_ceiling() {
        let mut config = GatewayConfig::default();
        config.fit_request_timeout();
        assert_eq!(config.network.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn fit_request_timeout_raises_low_ceiling() {
        let mut config = GatewayConfig {
            response_timeout: Duration::from_secs(60),
            ..GatewayConfig::default()
        };
        config.fit_request_timeout();
        assert_eq!(config.network.request_timeout, Duration::from_secs(65));
    }

    #[test]
    fn fit_request_timeout_saturates_on_huge_response_timeout() {
        let mut config = GatewayConfig {
            response_timeout: Duration::from_secs(u64::MAX),
            ..GatewayConfig::default()
        };
        config.fit_request_timeout();
        assert_eq!(config.network.request_timeout, Duration::MAX);
    }

    #[test]
    fn load_apis_reports_missing_file() {
        let mut config = GatewayConfig::default();
        assert!(config.load_apis(Path::new("/nonexistent/apis.json")).is_err());
    }
}
