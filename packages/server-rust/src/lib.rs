//! Busgate Server — HTTP front-end that dispatches requests into a message
//! bus and correlates the asynchronous replies back to their callers.

pub mod api;
pub mod config;
pub mod network;
pub mod pending;
pub mod transport;

pub use api::{ApiPort, ApiTable};
pub use config::GatewayConfig;
pub use network::NetworkModule;
pub use pending::{PendingRegistry, PendingReply, RegistryError, WaitError};
pub use transport::{HttpTransport, MemoryTransport, Transport};
