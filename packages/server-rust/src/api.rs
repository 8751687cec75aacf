//! API table: maps an `X-API` selector to its outbound route.

use std::collections::HashMap;
use std::sync::Arc;

use busgate_core::ComponentRef;
use serde::{Deserialize, Serialize};

/// Header that selects the API a request is dispatched to.
pub const X_API: &str = "x-api";

/// A named outbound port and the route its envelopes follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPort {
    pub name: String,
    /// Ordered out-endpoints. The first hop is where the envelope is sent;
    /// the whole list travels with it as the routing graph.
    pub graph: Vec<ComponentRef>,
}

impl ApiPort {
    #[must_use]
    pub fn first_hop(&self) -> Option<&ComponentRef> {
        self.graph.first()
    }
}

/// Errors from assembling the API table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiTableError {
    #[error("api {name} is declared more than once")]
    Duplicate { name: String },
    #[error("api {name} has no out-endpoints")]
    EmptyGraph { name: String },
}

/// Immutable lookup table of registered APIs.
#[derive(Debug, Default)]
pub struct ApiTable {
    ports: HashMap<String, Arc<ApiPort>>,
}

impl ApiTable {
    /// Builds the table.
    ///
    /// # Errors
    ///
    /// Rejects duplicate names and ports without any hop.
    pub fn new(ports: impl IntoIterator<Item = ApiPort>) -> Result<Self, ApiTableError> {
        let mut table = HashMap::new();
        for port in ports {
            if port.graph.is_empty() {
                return Err(ApiTableError::EmptyGraph { name: port.name });
            }
            if table.contains_key(&port.name) {
                return Err(ApiTableError::Duplicate { name: port.name });
            }
            table.insert(port.name.clone(), Arc::new(port));
        }
        Ok(Self { ports: table })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ApiPort>> {
        self.ports.get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
