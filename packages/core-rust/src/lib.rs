//! Busgate Core — message envelope, payload accessors, and routing graph.
//!
//! Everything in this crate is pure data: no I/O, no runtime. The server
//! crate builds the request/reply correlation on top of these types.

pub mod envelope;
pub mod error;
pub mod payload;
pub mod route;

pub use envelope::Envelope;
pub use error::{Container, EnvelopeError, PayloadError};
pub use payload::{Fields, Payload};
pub use route::ComponentRef;

/// Re-exported so callers can build context/command values without a
/// direct `serde_json` dependency.
pub use serde_json::{json, Map, Value};
