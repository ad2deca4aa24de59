//! Tagged SQL values as they travel between hosts and the daemon.
//!
//! A [`Value`] is always written as an object with a `type` tag and, for every
//! tag except `Null`, a `value` payload:
//!
//! ```json
//! {"type":"Null"}
//! {"type":"Integer","value":42}
//! {"type":"Real","value":2.5}
//! {"type":"Text","value":"hello"}
//! {"type":"Blob","value":[0,255,16]}
//! ```
//!
//! JSON numbers cannot carry infinities or NaN, so non-finite reals are written
//! as the strings `"Infinity"`, `"-Infinity"` and `"NaN"`.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};
use thiserror::Error;

const POSITIVE_INFINITY: &str = "Infinity";
const NEGATIVE_INFINITY: &str = "-Infinity";
const NOT_A_NUMBER: &str = "NaN";

/// A dynamically typed SQL value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "WireValue", into = "WireValue")]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Signed 64-bit integer.
    Integer(i64),
    /// IEEE-754 double.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Tag naming this value's variant on the wire.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Integer(_) => "Integer",
            Self::Real(_) => "Real",
            Self::Text(_) => "Text",
            Self::Blob(_) => "Blob",
        }
    }

    /// Decodes an optional parameter list, keeping its order.
    ///
    /// An absent list decodes to no parameters.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValueError`] raised by an element.
    pub fn decode_list(params: Option<Vec<WireValue>>) -> Result<Vec<Self>, ValueError> {
        params
            .unwrap_or_default()
            .into_iter()
            .map(Self::try_from)
            .collect()
    }
}

// Reals compare by bit pattern so that `-0.0` and `0.0` stay distinct; every
// NaN compares equal because the wire carries a single NaN spelling.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(left), Self::Integer(right)) => left == right,
            (Self::Real(left), Self::Real(right)) => {
                left.to_bits() == right.to_bits() || (left.is_nan() && right.is_nan())
            }
            (Self::Text(left), Self::Text(right)) => left == right,
            (Self::Blob(left), Self::Blob(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

/// Untyped `{type, value}` object as read from the wire.
///
/// Option structs keep parameters in this form so that the daemon can resolve
/// the target connection before it validates any parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireValue {
    /// Variant tag.
    #[serde(rename = "type")]
    pub tag: String,
    /// Payload; absent for `Null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl WireValue {
    /// Builds a wire value from a tag and optional payload.
    #[must_use]
    pub fn new(tag: impl Into<String>, value: Option<JsonValue>) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

/// Reasons a [`WireValue`] cannot become a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The tag is not one of the five known variants.
    #[error("unknown value type '{tag}'")]
    UnknownTag {
        /// Tag as received.
        tag: String,
    },
    /// A tag that needs a payload arrived without one.
    #[error("value of type {tag} requires a payload")]
    MissingPayload {
        /// Tag as received.
        tag: String,
    },
    /// The payload does not fit the tag.
    #[error("value of type {tag} cannot hold {payload}")]
    MismatchedPayload {
        /// Tag as received.
        tag: String,
        /// Offending payload rendered as JSON.
        payload: String,
    },
}

impl ValueError {
    fn mismatched(tag: &str, payload: &JsonValue) -> Self {
        Self::MismatchedPayload {
            tag: tag.to_owned(),
            payload: payload.to_string(),
        }
    }
}

impl TryFrom<WireValue> for Value {
    type Error = ValueError;

    fn try_from(wire: WireValue) -> Result<Self, Self::Error> {
        let WireValue { tag, value } = wire;
        match (tag.as_str(), value) {
            ("Null", None) => Ok(Self::Null),
            ("Null", Some(payload)) => Err(ValueError::mismatched(&tag, &payload)),
            (name @ ("Integer" | "Real" | "Text" | "Blob"), None) => {
                Err(ValueError::MissingPayload {
                    tag: name.to_owned(),
                })
            }
            ("Integer", Some(payload)) => payload
                .as_i64()
                .map(Self::Integer)
                .ok_or_else(|| ValueError::mismatched(&tag, &payload)),
            ("Real", Some(payload)) => {
                decode_real(&payload).ok_or_else(|| ValueError::mismatched(&tag, &payload))
            }
            ("Text", Some(JsonValue::String(text))) => Ok(Self::Text(text)),
            ("Blob", Some(JsonValue::Array(items))) => decode_blob(&items)
                .map(Self::Blob)
                .ok_or_else(|| ValueError::mismatched(&tag, &JsonValue::Array(items))),
            ("Text" | "Blob", Some(payload)) => Err(ValueError::mismatched(&tag, &payload)),
            (name, _) => Err(ValueError::UnknownTag {
                tag: name.to_owned(),
            }),
        }
    }
}

fn decode_real(payload: &JsonValue) -> Option<Value> {
    let real = match payload {
        JsonValue::Number(number) => number.as_f64()?,
        JsonValue::String(text) => match text.as_str() {
            POSITIVE_INFINITY => f64::INFINITY,
            NEGATIVE_INFINITY => f64::NEG_INFINITY,
            NOT_A_NUMBER => f64::NAN,
            _ => return None,
        },
        _ => return None,
    };
    Some(Value::Real(real))
}

fn decode_blob(items: &[JsonValue]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
        .collect()
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        let tag = value.type_name();
        let payload = match value {
            Value::Null => None,
            Value::Integer(integer) => Some(JsonValue::from(integer)),
            Value::Real(real) => Some(encode_real(real)),
            Value::Text(text) => Some(JsonValue::String(text)),
            Value::Blob(bytes) => Some(JsonValue::Array(
                bytes.into_iter().map(JsonValue::from).collect(),
            )),
        };
        Self::new(tag, payload)
    }
}

fn encode_real(real: f64) -> JsonValue {
    if let Some(number) = Number::from_f64(real) {
        return JsonValue::Number(number);
    }
    let spelling = if real.is_nan() {
        NOT_A_NUMBER
    } else if real.is_sign_positive() {
        POSITIVE_INFINITY
    } else {
        NEGATIVE_INFINITY
    };
    JsonValue::String(spelling.to_owned())
}
