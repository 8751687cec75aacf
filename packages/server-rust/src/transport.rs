//! Bus transport seam.
//!
//! The gateway only needs fire-and-forget publishing toward a hop's inbound
//! address. Replies come back through [`PendingRegistry::deliver`]
//! (see the `/reply` handler), not through this trait.
//!
//! [`PendingRegistry::deliver`]: crate::pending::PendingRegistry::deliver

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Publishes encoded envelopes toward a bus endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `bytes` to `endpoint`. Returning `Ok` does not imply the
    /// message was processed, only that it was handed off.
    async fn send(&self, endpoint: &str, bytes: Vec<u8>) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Posts envelopes as JSON to the endpoint URL.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let len = bytes.len();
        self.client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;
        debug!(endpoint, len, "envelope published");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// A frame captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub endpoint: String,
    pub bytes: Vec<u8>,
}

/// In-process transport that forwards every send onto an mpsc channel.
///
/// Used to wire a gateway to in-process components and in tests.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<SentFrame>,
}

impl MemoryTransport {
    /// Creates the transport and the receiver that observes its frames.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SentFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, endpoint: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.tx
            .send(SentFrame {
                endpoint: endpoint.to_string(),
                bytes,
            })
            .map_err(|_| anyhow::anyhow!("memory transport receiver dropped"))
    }
}
