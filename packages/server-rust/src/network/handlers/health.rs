//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Detailed health as JSON. Always 200; the `state` field carries the verdict.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "pending": state.pending.len(),
        "in_flight": state.shutdown.in_flight_count(),
        "apis": state.apis.len(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe -- the process is up.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- 200 only while `Ready`.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::api::ApiTable;
    use crate::config::GatewayConfig;
    use crate::network::ShutdownController;
    use crate::pending::PendingRegistry;
    use crate::transport::MemoryTransport;

    fn test_state() -> AppState {
        let (transport, _frames) = MemoryTransport::new();
        AppState {
            pending: Arc::new(PendingRegistry::new()),
            apis: Arc::new(ApiTable::default()),
            transport: Arc::new(transport),
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(GatewayConfig::default()),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_reports_all_fields() {
        let state = test_state();
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["pending"], 0);
        assert_eq!(json["in_flight"], 0);
        assert_eq!(json["apis"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_counts_pending_requests() {
        let state = test_state();
        let _reply = state.pending.register("waiting").unwrap();
        let _guard = state.shutdown.in_flight_guard();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "starting");
        assert_eq!(json["pending"], 1);
        assert_eq!(json["in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
