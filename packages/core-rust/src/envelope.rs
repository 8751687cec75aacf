//! The routed message unit that travels the bus.
//!
//! Wire schema (JSON):
//!
//! ```text
//! {
//!   "id": "<uuid>",
//!   "entrance": {"name", "mq_type", "in"} | null,
//!   "graph": [{"name", "mq_type", "in"}, ...] | null,
//!   "chain": ["<name>", ...] | null,
//!   "payload": {"code", "message", "context", "command", "result"}
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::error::EnvelopeError;
use crate::payload::Payload;
use crate::route::ComponentRef;

/// Deserializes a sequence that may be written as `null` on the wire.
fn null_as_empty<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A message with its routing state and payload.
///
/// `id` is fixed at creation. `graph` only shrinks and `chain` only grows;
/// see [`crate::route`] for the routing operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) entrance: Option<ComponentRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub(crate) graph: Vec<ComponentRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub(crate) chain: Vec<String>,
    #[serde(default)]
    pub(crate) payload: Payload,
}

impl Envelope {
    /// Creates an envelope with a fresh id and `initial_result` as its result.
    ///
    /// Pass `&()` or `&None::<T>` for an envelope without a result.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidResult`] if `initial_result` is neither
    /// an object nor an array of objects.
    pub fn new<T: Serialize + ?Sized>(
        entrance: Option<ComponentRef>,
        initial_result: &T,
    ) -> Result<Self, EnvelopeError> {
        let mut payload = Payload::default();
        payload.set_result(initial_result)?;

        let envelope = Self {
            id: Uuid::new_v4().to_string(),
            entrance,
            graph: Vec::new(),
            chain: Vec::new(),
            payload,
        };
        trace!(id = %envelope.id, "envelope created");
        Ok(envelope)
    }

    /// Decodes an envelope from its wire form.
    ///
    /// `context`/`command` stay uninitialized when the source omits them.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] on malformed JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::Decode)
    }

    /// Encodes the envelope to its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::Encode)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The component that originated the envelope and receives the reply.
    #[must_use]
    pub fn entrance(&self) -> Option<&ComponentRef> {
        self.entrance.as_ref()
    }

    pub fn set_entrance(&mut self, entrance: ComponentRef) {
        self.entrance = Some(entrance);
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Consumes the envelope, keeping only its payload.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Shorthand for [`Payload::unmarshal_result`].
    ///
    /// # Errors
    ///
    /// See [`Payload::unmarshal_result`].
    pub fn unmarshal_result<T: DeserializeOwned>(&self) -> Result<Option<T>, EnvelopeError> {
        self.payload.unmarshal_result()
    }
}
