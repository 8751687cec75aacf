//! Bus reply ingress: hands a returning envelope's payload to its waiter.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use busgate_core::Envelope;
use bytes::Bytes;
use tracing::{debug, warn};

use super::AppState;

/// `POST /reply` -- accepts a serialized envelope from the terminal hop.
///
/// - 202 when a waiting request received the payload
/// - 404 when the id is unknown or its request already timed out
/// - 400 when the body is not an envelope
pub async fn reply_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let envelope = match Envelope::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "rejecting malformed reply");
            return (StatusCode::BAD_REQUEST, "malformed envelope").into_response();
        }
    };

    let id = envelope.id().to_owned();
    debug!(%id, chain = ?envelope.chain(), "reply received");
    if state.pending.deliver(&id, envelope.into_payload()) {
        StatusCode::ACCEPTED.into_response()
    } else {
        (StatusCode::NOT_FOUND, "unknown or expired request").into_response()
    }
}
