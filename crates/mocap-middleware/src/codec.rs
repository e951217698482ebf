//! Datagram payload decoding.
//!
//! A telemetry datagram is a flat UTF-8 JSON object.  Each top-level key is
//! a channel name; its value is either a three-element numeric array
//! `[a, b, c]` or something to ignore:
//!
//! ```json
//! {"head": [10.0, 20.0, 30.0], "marker1": [1.5, -2.0, 0.0], "battery": 87}
//! ```
//!
//! Decoding is tolerant per key: a wrong-shaped value only drops that key.
//! Only a payload that is not a JSON object at all fails as a whole.

use mocap_types::ChannelSample;
use serde_json::Value;
use thiserror::Error;

/// Whole-datagram decode failures.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Channels extracted from one datagram.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodedDatagram {
    /// Well-formed channels, ordered by key.
    pub samples: Vec<(String, ChannelSample)>,
    /// Keys whose value was not a three-element numeric array.
    pub skipped: Vec<String>,
}

/// Decode a raw datagram payload.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the payload is not UTF-8, not JSON, or not
/// a JSON object.  Malformed individual values are reported in
/// [`DecodedDatagram::skipped`] instead.
pub fn decode_datagram(payload: &[u8]) -> Result<DecodedDatagram, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let fields = match serde_json::from_str::<Value>(text)? {
        Value::Object(fields) => fields,
        other => return Err(DecodeError::NotAnObject(json_kind(&other))),
    };

    let mut decoded = DecodedDatagram::default();
    for (key, value) in fields {
        match sample_from_value(&value) {
            Some(sample) => decoded.samples.push((key, sample)),
            None => decoded.skipped.push(key),
        }
    }
    Ok(decoded)
}

/// Interpret `value` as `[x, y, z]`.  Returns `None` for any other shape.
pub fn sample_from_value(value: &Value) -> Option<ChannelSample> {
    let [x, y, z] = value.as_array()?.as_slice() else {
        return None;
    };
    Some(ChannelSample::new(x.as_f64()?, y.as_f64()?, z.as_f64()?))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
