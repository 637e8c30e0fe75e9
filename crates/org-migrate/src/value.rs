//! Database-agnostic value representation for archive entries.
//!
//! Rows travel between the row store and the archive as `DbValue`s. The
//! archive is JSON, so the set of shapes is deliberately small: anything a
//! backend hands us that is not numeric, boolean, or binary is carried as
//! text in a format the drivers know how to re-bind (timestamps use
//! [`TIMESTAMP_FORMAT`], decimals their canonical string form).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;

/// Text format for timestamps without timezone, both backends.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Text format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Text format for times of day.
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// A single column value read from or bound into a row store.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl DbValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Convert to a JSON value for the archive. Binary data becomes base64
    /// text; the column-level decode list on import undoes this.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            DbValue::Null => Value::Null,
            DbValue::Bool(v) => Value::Bool(*v),
            DbValue::Int(v) => Value::Number((*v).into()),
            DbValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DbValue::Text(v) => Value::String(v.clone()),
            DbValue::Bytes(v) => Value::String(BASE64.encode(v)),
        }
    }

    /// Convert a JSON archive value back to a bindable value.
    #[must_use]
    pub fn from_json(value: &Value) -> DbValue {
        match value {
            Value::Null => DbValue::Null,
            Value::Bool(v) => DbValue::Bool(*v),
            Value::Number(n) => n
                .as_i64()
                .map(DbValue::Int)
                .unwrap_or_else(|| DbValue::Float(n.as_f64().unwrap_or(0.0))),
            Value::String(s) => DbValue::Text(s.clone()),
            // Arrays/objects never appear in exported rows; keep them as raw
            // JSON text rather than losing them.
            other => DbValue::Text(other.to_string()),
        }
    }

    /// Encode a raw byte buffer the way `to_json` would.
    #[must_use]
    pub fn encode_base64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    /// Decode base64 text into raw bytes.
    pub fn decode_base64(text: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        // Older archives carry base64 with a trailing newline.
        BASE64.decode(text.trim_end())
    }
}

impl From<&DbValue> for Value {
    fn from(v: &DbValue) -> Value {
        v.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_scalars() {
        for v in [
            DbValue::Null,
            DbValue::Bool(true),
            DbValue::Int(-42),
            DbValue::Float(1.5),
            DbValue::Text("hello".into()),
        ] {
            assert_eq!(DbValue::from_json(&v.to_json()), v);
        }
    }

    #[test]
    fn test_bytes_become_base64_text() {
        let raw = vec![0u8, 159, 146, 150];
        let json = DbValue::Bytes(raw.clone()).to_json();
        let Value::String(encoded) = &json else {
            panic!("expected string, got {:?}", json);
        };
        assert_eq!(DbValue::decode_base64(encoded).unwrap(), raw);
    }

    #[test]
    fn test_decode_tolerates_trailing_newline() {
        let encoded = format!("{}\n", DbValue::encode_base64(b"cert-data"));
        assert_eq!(DbValue::decode_base64(&encoded).unwrap(), b"cert-data");
    }
}
