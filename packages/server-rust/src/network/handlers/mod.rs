//! HTTP handlers and the shared state they extract.

pub mod dispatch;
pub mod health;
pub mod reply;

pub use dispatch::{dispatch_handler, DispatchError, ReplyBody};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use reply::reply_handler;

use std::sync::Arc;
use std::time::Instant;

use crate::api::ApiTable;
use crate::config::GatewayConfig;
use crate::pending::PendingRegistry;
use crate::transport::Transport;

use super::ShutdownController;

/// Shared state passed to all handlers via `State` extraction.
///
/// Every field is behind an `Arc`, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Requests waiting for a bus reply, keyed by envelope id.
    pub pending: Arc<PendingRegistry>,
    /// `X-API` selector to outbound route.
    pub apis: Arc<ApiTable>,
    /// Publishes envelopes toward the first hop.
    pub transport: Arc<dyn Transport>,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<GatewayConfig>,
    /// Process start, for uptime reporting.
    pub start_time: Instant,
}
