//! Routing graph carried inside an envelope.
//!
//! The graph is the ordered list of hops that remain to be visited. It only
//! ever shrinks from the front: each component consumes its own hop with
//! [`Envelope::pop_graph`] and forwards to whatever is next. The chain is the
//! mirror image, an append-only record of the components already visited.

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Identifies one hop's bus endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Component name, recorded in the chain once visited.
    pub name: String,
    /// Transport kind used to reach the component (e.g. `"http"`).
    #[serde(rename = "mq_type")]
    pub transport_kind: String,
    /// Inbound address the transport sends to.
    #[serde(rename = "in")]
    pub inbound_address: String,
}

impl ComponentRef {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        transport_kind: impl Into<String>,
        inbound_address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport_kind: transport_kind.into(),
            inbound_address: inbound_address.into(),
        }
    }
}

impl Envelope {
    /// Returns the current head hop without consuming it.
    #[must_use]
    pub fn top_graph(&self) -> Option<&ComponentRef> {
        self.graph.first()
    }

    /// Consumes the current head hop and returns the next one.
    ///
    /// `None` means no hops remain: the caller is the terminal component and
    /// should reply to the entrance instead of forwarding.
    pub fn pop_graph(&mut self) -> Option<&ComponentRef> {
        if !self.graph.is_empty() {
            self.graph.remove(0);
        }
        self.graph.first()
    }

    /// Remaining hops, head first.
    #[must_use]
    pub fn graph(&self) -> &[ComponentRef] {
        &self.graph
    }

    /// Installs a route. Intended for the originating component; hops that
    /// receive an envelope only ever pop.
    pub fn set_graph(&mut self, hops: Vec<ComponentRef>) {
        self.graph = hops;
    }

    /// Names of the components already traversed, oldest first.
    #[must_use]
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Records that `name` has handled this envelope.
    pub fn append_chain(&mut self, name: impl Into<String>) {
        self.chain.push(name.into());
    }

    /// Whether `name` already appears in the chain. Diagnostic only.
    #[must_use]
    pub fn has_visited(&self, name: &str) -> bool {
        self.chain.iter().any(|visited| visited == name)
    }
}
