//! Error types for envelope construction, encoding, and payload lookups.

use std::fmt;

/// Identifies which payload mapping a lookup was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// Per-request context values shared along the route.
    Context,
    /// Instructions addressed to downstream components.
    Command,
}

impl Container {
    /// Returns the wire name of the container.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Command => "command",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building, encoding, or decoding an [`Envelope`](crate::Envelope).
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("result must be an object or an array of objects, found {found}")]
    InvalidResult { found: &'static str },
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to decode payload result: {0}")]
    ResultDecode(#[source] serde_json::Error),
}

/// Errors from the typed context/command accessors.
///
/// "Missing", "wrong type", and "container not initialized" are kept as
/// distinct variants so callers can tell an absent key from a bad value.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("the {container} container is not initialized")]
    Uninitialized { container: Container },
    #[error("the {container} key {key} does not exist")]
    MissingKey { container: Container, key: String },
    #[error("the {container} key {key} is {found}, expected {expected}")]
    WrongType {
        container: Container,
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("the {container} key {key} has a non-string element at index {index}")]
    NotStringElement {
        container: Container,
        key: String,
        index: usize,
    },
    #[error("the {container} key {key} exists but its value is null")]
    NullValue { container: Container, key: String },
    #[error("failed to decode {container} key {key}: {source}")]
    Decode {
        container: Container,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PayloadError {
    /// Returns `true` for [`PayloadError::MissingKey`].
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingKey { .. })
    }

    /// Returns `true` for [`PayloadError::WrongType`] and
    /// [`PayloadError::NotStringElement`].
    #[must_use]
    pub fn is_wrong_type(&self) -> bool {
        matches!(self, Self::WrongType { .. } | Self::NotStringElement { .. })
    }
}

/// Short name of a JSON value's shape, used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_f64() => "float",
        serde_json::Value::Number(_) => "integer",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn container_display_matches_wire_name() {
        assert_eq!(Container::Context.to_string(), "context");
        assert_eq!(Container::Command.to_string(), "command");
    }

    #[test]
    fn json_kind_names() {
        assert_eq!(json_kind(&json!(null)), "null");
        assert_eq!(json_kind(&json!(1)), "integer");
        assert_eq!(json_kind(&json!(1.5)), "float");
        assert_eq!(json_kind(&json!("x")), "string");
        assert_eq!(json_kind(&json!([1])), "array");
        assert_eq!(json_kind(&json!({"a": 1})), "object");
    }

    #[test]
    fn error_messages_name_container_and_key() {
        let err = PayloadError::MissingKey {
            container: Container::Command,
            key: "target".to_string(),
        };
        assert_eq!(err.to_string(), "the command key target does not exist");
        assert!(err.is_missing());
        assert!(!err.is_wrong_type());
    }
}
