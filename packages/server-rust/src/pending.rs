//! Pending-request registry and response waiter.
//!
//! Correlates an asynchronous bus reply with the HTTP request that caused
//! it. Each in-flight request registers a one-shot channel under its
//! envelope id; whatever receives the reply from the bus calls
//! [`PendingRegistry::deliver`] with that id. The waiting side races the
//! channel against a fixed timeout.
//!
//! Cleanup is tied to [`PendingReply`]: dropping it deregisters the id and
//! closes the channel, so every exit path of a handler releases its entry.

use std::sync::Arc;
use std::time::Duration;

use busgate_core::Payload;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{trace, warn};

/// Errors from registering a pending request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("request id {id} is already pending")]
    Duplicate { id: String },
}

/// Outcome of waiting for a reply that never arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("no reply within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("reply channel closed before a reply arrived")]
    Closed,
}

/// Thread-safe table from request id to the sender half of its reply channel.
///
/// Operations on different ids never contend on a shared lock; operations
/// on the same id are serialized by the owning `DashMap` shard.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    pending: DashMap<String, oneshot::Sender<Payload>>,
}

impl PendingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Registers `id` and returns the handle that waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if `id` is already pending.
    pub fn register(self: &Arc<Self>, id: impl Into<String>) -> Result<PendingReply, RegistryError> {
        let id = id.into();
        match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate { id }),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                trace!(%id, "request registered");
                Ok(PendingReply {
                    id,
                    rx,
                    registry: Arc::clone(self),
                })
            }
        }
    }

    /// Removes `id` if present. Returns whether an entry was removed.
    pub fn deregister(&self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Hands `payload` to the waiter registered under `id`.
    ///
    /// The entry is consumed, so at most one delivery per id succeeds.
    /// Returns `false` when the id is unknown or already expired, or when
    /// the waiter has gone away; in both cases the payload is dropped.
    pub fn deliver(&self, id: &str, payload: Payload) -> bool {
        let Some((_, tx)) = self.pending.remove(id) else {
            warn!(%id, "dropping reply for unknown or expired request");
            return false;
        };
        if tx.send(payload).is_err() {
            warn!(%id, "dropping reply, waiter already gone");
            return false;
        }
        trace!(%id, "reply delivered");
        true
    }

    /// Whether `id` is currently waiting for a reply.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of requests currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Receive end of one pending request.
///
/// Deregisters its id and closes the channel when dropped.
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    rx: oneshot::Receiver<Payload>,
    registry: Arc<PendingRegistry>,
}

impl PendingReply {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the reply, then releases the registry entry.
    ///
    /// # Errors
    ///
    /// See [`await_response`].
    pub async fn wait(mut self, timeout: Duration) -> Result<Payload, WaitError> {
        await_response(&mut self.rx, timeout).await
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.registry.deregister(&self.id);
        self.rx.close();
    }
}

/// Races a reply against `timeout`; whichever resolves first wins.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] if the timer fires first, or
/// [`WaitError::Closed`] if the sender was dropped without a reply.
pub async fn await_response(
    rx: &mut oneshot::Receiver<Payload>,
    timeout: Duration,
) -> Result<Payload, WaitError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(_)) => Err(WaitError::Closed),
        Err(_elapsed) => Err(WaitError::Timeout { timeout }),
    }
}
