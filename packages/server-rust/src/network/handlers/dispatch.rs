//! Front-end dispatch: wrap an HTTP request in an envelope, send it into the
//! bus toward the selected API's first hop, and wait for the reply.

use std::time::Instant;

use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use busgate_core::{Envelope, EnvelopeError, Value};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::AppState;
use crate::api::X_API;
use crate::network::middleware::X_REQUEST_ID;
use crate::pending::{RegistryError, WaitError};

/// Body returned to the caller once a reply arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyBody {
    pub code: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Fixed body for a dispatch that received no reply in time.
pub const TIMEOUT_MESSAGE: &str = "Couldn't process request in a given time";

const INTERNAL_MESSAGE: &str = "Service Internal Error";

/// Everything that can end a dispatch without a reply body.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("missing X-API header")]
    MissingApi,
    #[error("unknown api {name}")]
    UnknownApi { name: String },
    #[error("api {name} has no route")]
    NoRoute { name: String },
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] BytesRejection),
    #[error("request body exceeds the configured limit")]
    BodyTooLarge,
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to publish envelope: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("no reply before the response timeout")]
    Timeout,
    #[error("reply channel closed without a reply")]
    Closed,
    #[error("reply result could not be decoded: {0}")]
    Reply(#[source] EnvelopeError),
}

impl From<WaitError> for DispatchError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout { .. } => Self::Timeout,
            WaitError::Closed => Self::Closed,
        }
    }
}

impl DispatchError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingApi | Self::UnknownApi { .. } | Self::NoRoute { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::BodyRead(_)
            | Self::InvalidBody(_)
            | Self::Envelope(EnvelopeError::InvalidResult { .. }) => StatusCode::BAD_REQUEST,
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Envelope(_)
            | Self::Registry(_)
            | Self::Timeout
            | Self::Closed
            | Self::Reply(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label recorded on the dispatch span.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::MissingApi | Self::UnknownApi { .. } | Self::NoRoute { .. } => "not_found",
            Self::BodyRead(_)
            | Self::InvalidBody(_)
            | Self::Envelope(EnvelopeError::InvalidResult { .. }) => "bad_request",
            Self::BodyTooLarge => "too_large",
            Self::Transport(_) => "transport_error",
            Self::Timeout => "timeout",
            Self::Envelope(_) | Self::Registry(_) | Self::Closed | Self::Reply(_) => "error",
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Timeout => TIMEOUT_MESSAGE.to_string(),
            Self::BodyRead(_) => "Read request body error".to_string(),
            Self::BodyTooLarge => "Request body too large".to_string(),
            Self::MissingApi | Self::UnknownApi { .. } | Self::NoRoute { .. } => {
                "404 page not found".to_string()
            }
            Self::InvalidBody(_) | Self::Envelope(EnvelopeError::InvalidResult { .. }) => {
                self.to_string()
            }
            Self::Transport(_) => "Bad Gateway".to_string(),
            _ => INTERNAL_MESSAGE.to_string(),
        };
        (status, body).into_response()
    }
}

/// `POST /` -- dispatches the body to the API named by `X-API`.
pub async fn dispatch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let api = header_str(&headers, X_API).to_owned();
    let span = info_span!(
        "dispatch",
        api = %api,
        request_id = header_str(&headers, X_REQUEST_ID),
        envelope_id = tracing::field::Empty,
        outcome = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    let result = dispatch(&state, &api, body).instrument(span.clone()).await;

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);

    match result {
        Ok(reply) => {
            span.record("outcome", "ok");
            (StatusCode::OK, Json(reply)).into_response()
        }
        Err(err) => {
            span.record("outcome", err.outcome());
            span.in_scope(|| match &err {
                DispatchError::Timeout | DispatchError::Transport(_) => {
                    warn!(error = %err, "dispatch failed");
                }
                _ => debug!(error = %err, "dispatch rejected"),
            });
            err.into_response()
        }
    }
}

async fn dispatch(
    state: &AppState,
    api: &str,
    body: Result<Bytes, BytesRejection>,
) -> Result<ReplyBody, DispatchError> {
    let _in_flight = state.shutdown.in_flight_guard();

    if api.is_empty() {
        return Err(DispatchError::MissingApi);
    }
    let port = state.apis.get(api).ok_or_else(|| DispatchError::UnknownApi {
        name: api.to_owned(),
    })?;
    let Some(first_hop) = port.first_hop() else {
        return Err(DispatchError::NoRoute {
            name: api.to_owned(),
        });
    };

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            DispatchError::BodyTooLarge
        } else {
            DispatchError::BodyRead(rejection)
        }
    })?;
    debug!(len = body.len(), "request body read");
    let initial: Option<Value> = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body).map_err(DispatchError::InvalidBody)?)
    };

    let mut envelope = Envelope::new(state.config.entrance.clone(), &initial)?;
    envelope.set_graph(port.graph.clone());
    if let Some(entrance) = &state.config.entrance {
        envelope.append_chain(entrance.name.clone());
    }
    Span::current().record("envelope_id", envelope.id());

    // Registered before sending so a fast reply cannot miss its waiter.
    // Dropping `pending` on any early return releases the entry.
    let pending = state.pending.register(envelope.id())?;
    let bytes = envelope.to_vec()?;

    info!(endpoint = %first_hop.inbound_address, "forwarding to first hop");
    state
        .transport
        .send(&first_hop.inbound_address, bytes)
        .await
        .map_err(DispatchError::Transport)?;

    debug!("waiting for reply");
    let payload = pending.wait(state.config.response_timeout).await?;
    info!(code = payload.code, "reply arrived");

    let result = payload.unmarshal_result().map_err(DispatchError::Reply)?;
    Ok(ReplyBody {
        code: payload.code,
        message: payload.message,
        result,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
