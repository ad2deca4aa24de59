//! Conversion between wire values and the SQLite engine's native values.
//!
//! Both directions are total: every wire [`Value`] has exactly one native
//! counterpart and vice versa, so `decode(encode(v)) == v` for every native
//! value. Validation of untrusted input happens earlier, when a
//! [`WireValue`](sqlbridge_protocol::WireValue) becomes a [`Value`].

use sqlbridge_protocol::Value;

/// Value type bound into and read out of SQLite statements.
pub type NativeValue = rusqlite::types::Value;

/// Converts an engine value into its wire form.
#[must_use]
pub fn encode(native: NativeValue) -> Value {
    match native {
        NativeValue::Null => Value::Null,
        NativeValue::Integer(integer) => Value::Integer(integer),
        NativeValue::Real(real) => Value::Real(real),
        NativeValue::Text(text) => Value::Text(text),
        NativeValue::Blob(bytes) => Value::Blob(bytes),
    }
}

/// Converts a wire value into an engine value.
#[must_use]
pub fn decode(value: Value) -> NativeValue {
    match value {
        Value::Null => NativeValue::Null,
        Value::Integer(integer) => NativeValue::Integer(integer),
        Value::Real(real) => NativeValue::Real(real),
        Value::Text(text) => NativeValue::Text(text),
        Value::Blob(bytes) => NativeValue::Blob(bytes),
    }
}

/// Encodes one result row, keeping column order.
#[must_use]
pub fn encode_row(row: Vec<NativeValue>) -> Vec<Value> {
    row.into_iter().map(encode).collect()
}

/// Decodes positional parameters, keeping their order.
#[must_use]
pub fn decode_params(params: Vec<Value>) -> Vec<NativeValue> {
    params.into_iter().map(decode).collect()
}
