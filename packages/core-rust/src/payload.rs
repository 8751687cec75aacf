//! Envelope payload: status pair, context/command mappings, and the result blob.
//!
//! `context` and `command` are open-ended JSON mappings. Both are lazily
//! allocated and may be absent after decoding an envelope that omitted them,
//! which is why lookups distinguish an uninitialized container from a
//! missing key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::map::Entry;
use serde_json::{Map, Value};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{json_kind, Container, EnvelopeError, PayloadError};

/// Status, routing context, commands, and result carried by an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Status code; 0 means success.
    #[serde(default)]
    pub code: u64,
    /// Human-readable status message paired with `code`.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    context: Option<Map<String, Value>>,
    #[serde(default)]
    command: Option<Map<String, Value>>,
    /// JSON text of an object or an array of objects.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "raw_result")]
    result: Option<Vec<u8>>,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            code: 0,
            message: "OK".to_string(),
            context: Some(Map::new()),
            command: Some(Map::new()),
            result: None,
        }
    }
}

impl Payload {
    // -----------------------------------------------------------------------
    // Result
    // -----------------------------------------------------------------------

    /// Stores the JSON encoding of `value` as the result.
    ///
    /// A value that serializes to `null` (e.g. `None`, `()`) clears the result.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidResult`] unless `value` is an object or
    /// an array whose elements are all objects, and [`EnvelopeError::Encode`]
    /// if it cannot be serialized.
    pub fn set_result<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EnvelopeError> {
        let json = serde_json::to_value(value).map_err(EnvelopeError::Encode)?;
        match &json {
            Value::Null => {
                self.result = None;
                return Ok(());
            }
            Value::Object(_) => {}
            Value::Array(items) => {
                if let Some(bad) = items.iter().find(|item| !item.is_object()) {
                    return Err(EnvelopeError::InvalidResult {
                        found: json_kind(bad),
                    });
                }
            }
            other => {
                return Err(EnvelopeError::InvalidResult {
                    found: json_kind(other),
                })
            }
        }
        self.result = Some(serde_json::to_vec(&json).map_err(EnvelopeError::Encode)?);
        Ok(())
    }

    /// Raw bytes of the stored result, if any.
    #[must_use]
    pub fn result_bytes(&self) -> Option<&[u8]> {
        self.result.as_deref()
    }

    /// Whether a result is present.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Decodes the result into `T`, accepting both wire encodings in use.
    ///
    /// Producers either embed the result as raw JSON or as a quoted base64
    /// string of the JSON. One pair of surrounding quotes is stripped, base64
    /// is attempted first, and only if that fails are the bytes parsed as
    /// JSON directly. Returns `Ok(None)` when no result is stored.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::ResultDecode`] if the selected bytes are not
    /// valid JSON for `T`.
    pub fn unmarshal_result<T: DeserializeOwned>(&self) -> Result<Option<T>, EnvelopeError> {
        let Some(raw) = self.result.as_deref() else {
            return Ok(None);
        };

        let body = match raw {
            [b'"', inner @ .., b'"'] => inner,
            _ => raw,
        };

        let decoded = match STANDARD.decode(body) {
            Ok(bytes) => serde_json::from_slice(&bytes),
            Err(_) => serde_json::from_slice(body),
        };
        decoded.map(Some).map_err(EnvelopeError::ResultDecode)
    }

    // -----------------------------------------------------------------------
    // Context
    // -----------------------------------------------------------------------

    /// Inserts or replaces a context value.
    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
    }

    /// Read view over the context mapping.
    #[must_use]
    pub fn context(&self) -> Fields<'_> {
        Fields {
            container: Container::Context,
            map: self.context.as_ref(),
        }
    }

    // -----------------------------------------------------------------------
    // Command
    // -----------------------------------------------------------------------

    /// Inserts or replaces a command value.
    pub fn set_command(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.command
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
    }

    /// Merges a command value into any existing entry under `key`.
    ///
    /// - no entry: `value` is stored as-is
    /// - object onto object: keys are unioned, `value` wins on conflict
    /// - array onto array: elements of `value` are appended in order
    /// - anything else: the existing entry is left unchanged
    pub fn append_command(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let command = self.command.get_or_insert_with(Map::new);
        match command.entry(key.into()) {
            Entry::Vacant(slot) => {
                slot.insert(value.into());
            }
            Entry::Occupied(mut slot) => merge_command(slot.get_mut(), value.into()),
        }
    }

    /// Read view over the command mapping.
    #[must_use]
    pub fn command(&self) -> Fields<'_> {
        Fields {
            container: Container::Command,
            map: self.command.as_ref(),
        }
    }
}

fn merge_command(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(extra)) => current.extend(extra),
        (Value::Array(current), Value::Array(extra)) => current.extend(extra),
        // Shape mismatch, or two scalars: keep what is stored.
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Typed, fallible projections over one payload mapping.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    container: Container,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    /// Whether the underlying mapping has been allocated.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.map.is_some()
    }

    /// Plain lookup with no type coercion.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|map| map.get(key))
    }

    /// # Errors
    ///
    /// Fails if the container is uninitialized, the key is missing, or the
    /// value is not a string.
    pub fn get_str(&self, key: &str) -> Result<&'a str, PayloadError> {
        let value = self.lookup(key)?;
        value.as_str().ok_or_else(|| self.wrong_type(key, "string", value))
    }

    /// Integer lookup sized to the platform's pointer width.
    ///
    /// # Errors
    ///
    /// Fails if the container is uninitialized, the key is missing, or the
    /// value is not an integer that fits.
    pub fn get_int(&self, key: &str) -> Result<isize, PayloadError> {
        let value = self.lookup(key)?;
        value
            .as_i64()
            .and_then(|n| isize::try_from(n).ok())
            .ok_or_else(|| self.wrong_type(key, "int", value))
    }

    /// # Errors
    ///
    /// Fails if the container is uninitialized, the key is missing, or the
    /// value is not an integer within `i32` range.
    pub fn get_i32(&self, key: &str) -> Result<i32, PayloadError> {
        let value = self.lookup(key)?;
        value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| self.wrong_type(key, "int32", value))
    }

    /// # Errors
    ///
    /// Fails if the container is uninitialized, the key is missing, or the
    /// value is not an integer within `i64` range.
    pub fn get_i64(&self, key: &str) -> Result<i64, PayloadError> {
        let value = self.lookup(key)?;
        value
            .as_i64()
            .ok_or_else(|| self.wrong_type(key, "int64", value))
    }

    /// # Errors
    ///
    /// Fails if the value is not an array, or on the first element that is
    /// not a string (the error carries that element's index).
    pub fn get_str_array(&self, key: &str) -> Result<Vec<String>, PayloadError> {
        let value = self.lookup(key)?;
        let Value::Array(items) = value else {
            return Err(self.wrong_type(key, "array", value));
        };
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| PayloadError::NotStringElement {
                        container: self.container,
                        key: key.to_string(),
                        index,
                    })
            })
            .collect()
    }

    /// Decodes the stored value into `T`.
    ///
    /// # Errors
    ///
    /// Fails if the key is missing, the value is null, or the value does not
    /// decode as `T`.
    pub fn get_object<T: DeserializeOwned>(&self, key: &str) -> Result<T, PayloadError> {
        let value = self.lookup(key)?;
        if value.is_null() {
            return Err(PayloadError::NullValue {
                container: self.container,
                key: key.to_string(),
            });
        }
        T::deserialize(value).map_err(|source| PayloadError::Decode {
            container: self.container,
            key: key.to_string(),
            source,
        })
    }

    fn lookup(&self, key: &str) -> Result<&'a Value, PayloadError> {
        let map = self.map.ok_or(PayloadError::Uninitialized {
            container: self.container,
        })?;
        map.get(key).ok_or_else(|| PayloadError::MissingKey {
            container: self.container,
            key: key.to_string(),
        })
    }

    fn wrong_type(&self, key: &str, expected: &'static str, found: &Value) -> PayloadError {
        PayloadError::WrongType {
            container: self.container,
            key: key.to_string(),
            expected,
            found: json_kind(found),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire encoding of the result blob
// ---------------------------------------------------------------------------

/// Emits the stored bytes verbatim as embedded JSON and captures whatever
/// JSON text the sender placed there (including a quoted base64 string).
mod raw_result {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::value::RawValue;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        let Some(bytes) = bytes else {
            return serializer.serialize_none();
        };
        let text = std::str::from_utf8(bytes).map_err(serde::ser::Error::custom)?;
        let raw: &RawValue = serde_json::from_str(text).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw = Option::<Box<RawValue>>::deserialize(deserializer)?;
        Ok(raw.map(|raw| raw.get().as_bytes().to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        sku: String,
    }

    fn bare() -> Payload {
        serde_json::from_str(r#"{"code":0,"message":"OK"}"#).unwrap()
    }

    // -- result --------------------------------------------------------------

    #[test]
    fn set_result_rejects_scalars() {
        let mut payload = Payload::default();
        assert!(matches!(
            payload.set_result("hello"),
            Err(EnvelopeError::InvalidResult { found: "string" })
        ));
        assert!(matches!(
            payload.set_result(&42),
            Err(EnvelopeError::InvalidResult { found: "integer" })
        ));
        assert!(!payload.has_result());
    }

    #[test]
    fn set_result_rejects_primitive_arrays() {
        let mut payload = Payload::default();
        let err = payload.set_result(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidResult { found: "integer" }));
    }

    #[test]
    fn set_result_accepts_object_and_object_array() {
        let mut payload = Payload::default();
        payload
            .set_result(&Order { id: 1, sku: "a".into() })
            .unwrap();
        assert_eq!(payload.result_bytes().unwrap(), br#"{"id":1,"sku":"a"}"#);

        payload
            .set_result(&vec![json!({"a": 1}), json!({"b": 2})])
            .unwrap();
        assert_eq!(payload.result_bytes().unwrap(), br#"[{"a":1},{"b":2}]"#);
    }

    #[test]
    fn set_result_none_clears() {
        let mut payload = Payload::default();
        payload.set_result(&json!({"a": 1})).unwrap();
        payload.set_result(&None::<Order>).unwrap();
        assert!(payload.result_bytes().is_none());
    }

    #[test]
    fn unmarshal_result_absent_is_none() {
        let payload = Payload::default();
        let decoded: Option<Order> = payload.unmarshal_result().unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn unmarshal_result_raw_and_base64_agree() {
        let order = Order { id: 7, sku: "x-1".into() };

        let mut raw = Payload::default();
        raw.set_result(&order).unwrap();

        let encoded = STANDARD.encode(raw.result_bytes().unwrap());
        let legacy: Payload = serde_json::from_str(
            &json!({"code": 0, "message": "OK", "result": encoded}).to_string(),
        )
        .unwrap();

        let from_raw: Order = raw.unmarshal_result().unwrap().unwrap();
        let from_b64: Order = legacy.unmarshal_result().unwrap().unwrap();
        assert_eq!(from_raw, order);
        assert_eq!(from_b64, order);
    }

    #[test]
    fn unmarshal_result_reports_bad_json() {
        let payload: Payload = serde_json::from_str(r#"{"result":"not base64 !"}"#).unwrap();
        let err = payload.unmarshal_result::<Value>().unwrap_err();
        assert!(matches!(err, EnvelopeError::ResultDecode(_)));
    }

    // -- context -------------------------------------------------------------

    #[test]
    fn uninitialized_container_is_distinct_from_missing_key() {
        let payload = bare();
        assert!(!payload.context().is_initialized());
        assert!(matches!(
            payload.context().get_str("user"),
            Err(PayloadError::Uninitialized { container: Container::Context })
        ));
        assert!(payload.context().get("user").is_none());

        let payload = Payload::default();
        let err = payload.context().get_str("user").unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn set_context_allocates_lazily() {
        let mut payload = bare();
        payload.set_context("user", "ada");
        assert_eq!(payload.context().get_str("user").unwrap(), "ada");
        assert!(!payload.command().is_initialized());
    }

    #[test]
    fn typed_getters_report_wrong_type() {
        let mut payload = Payload::default();
        payload.set_context("name", "ada");
        payload.set_context("count", 3);
        payload.set_context("big", i64::MAX);
        payload.set_context("ratio", 0.5);

        assert_eq!(payload.context().get_int("count").unwrap(), 3);
        assert_eq!(payload.context().get_i32("count").unwrap(), 3);
        assert_eq!(payload.context().get_i64("big").unwrap(), i64::MAX);

        let err = payload.context().get_i32("big").unwrap_err();
        assert!(err.is_wrong_type());
        let err = payload.context().get_int("ratio").unwrap_err();
        assert!(matches!(
            err,
            PayloadError::WrongType { expected: "int", found: "float", .. }
        ));
        let err = payload.context().get_str("count").unwrap_err();
        assert!(err.is_wrong_type());
        assert!(!err.is_missing());
    }

    #[test]
    fn string_array_identifies_bad_index() {
        let mut payload = Payload::default();
        payload.set_context("tags", json!(["a", "b"]));
        payload.set_context("mixed", json!(["a", 2, "c"]));
        payload.set_context("scalar", "a");

        assert_eq!(payload.context().get_str_array("tags").unwrap(), ["a", "b"]);
        assert!(matches!(
            payload.context().get_str_array("mixed"),
            Err(PayloadError::NotStringElement { index: 1, .. })
        ));
        assert!(matches!(
            payload.context().get_str_array("scalar"),
            Err(PayloadError::WrongType { expected: "array", .. })
        ));
    }

    #[test]
    fn get_object_decodes_and_rejects_null() {
        let mut payload = Payload::default();
        payload.set_context("order", json!({"id": 5, "sku": "z"}));
        payload.set_context("nothing", Value::Null);
        payload.set_context("wrong", json!({"id": "five"}));

        let order: Order = payload.context().get_object("order").unwrap();
        assert_eq!(order, Order { id: 5, sku: "z".into() });
        assert!(matches!(
            payload.context().get_object::<Order>("nothing"),
            Err(PayloadError::NullValue { .. })
        ));
        assert!(matches!(
            payload.context().get_object::<Order>("wrong"),
            Err(PayloadError::Decode { .. })
        ));
        assert!(payload.context().get_object::<Order>("absent").unwrap_err().is_missing());
    }

    // -- command -------------------------------------------------------------

    #[test]
    fn append_command_stores_new_key_directly() {
        let mut payload = bare();
        payload.append_command("notify", json!(["ops"]));
        assert_eq!(payload.command().get("notify").unwrap(), &json!(["ops"]));
    }

    #[test]
    fn append_command_unions_objects() {
        let mut payload = Payload::default();
        payload.set_command("headers", json!({"a": 1, "b": 2}));
        payload.append_command("headers", json!({"b": 20, "c": 30}));
        assert_eq!(
            payload.command().get("headers").unwrap(),
            &json!({"a": 1, "b": 20, "c": 30})
        );
    }

    #[test]
    fn append_command_concatenates_arrays() {
        let mut payload = Payload::default();
        payload.set_command("steps", json!(["x", "y"]));
        payload.append_command("steps", json!(["z", "x"]));
        assert_eq!(
            payload.command().get("steps").unwrap(),
            &json!(["x", "y", "z", "x"])
        );
    }

    #[test]
    fn append_command_ignores_shape_mismatch() {
        let mut payload = Payload::default();
        payload.set_command("steps", json!(["x"]));
        payload.append_command("steps", json!({"y": 1}));
        payload.append_command("steps", "z");
        assert_eq!(payload.command().get("steps").unwrap(), &json!(["x"]));

        payload.set_command("level", 1);
        payload.append_command("level", 2);
        assert_eq!(payload.command().get_i64("level").unwrap(), 1);
    }

    #[test]
    fn set_command_overwrites_regardless_of_shape() {
        let mut payload = Payload::default();
        payload.set_command("steps", json!(["x"]));
        payload.set_command("steps", json!({"y": 1}));
        assert_eq!(payload.command().get("steps").unwrap(), &json!({"y": 1}));
    }
}
