//! Response envelope classification.
//!
//! # Design
//! Every API response is wrapped in `{"error": <int>, "data": <payload>}`.
//! `classify` turns the raw body into either the payload text (success) or a
//! `ClientError` (malformed body, server-side error code, missing payload).
//! The payload text is then handed to a `PayloadDecoder`, which decides the
//! final result shape.
//!
//! `data` may be a JSON string holding encoded JSON, or inline JSON. Both
//! reduce to the same payload text: a string's contents, or the serialized
//! value otherwise.

use serde_json::Value;
use tracing::debug;

use crate::decoder::PayloadDecoder;
use crate::error::{codes, ClientError, ErrorDomain, ErrorKind};

pub const ERROR_KEY: &str = "error";
pub const DATA_KEY: &str = "data";

pub(crate) const NOT_MATCH_FORMAT: &str = "Not match parse format";

/// Text form of a JSON field: a string's contents, or serialized JSON.
pub(crate) fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn parse_json(text: &str) -> Result<Value, ClientError> {
    serde_json::from_str(text).map_err(|e| ClientError::data(format!("JSONException: {e}")))
}

/// Reduce a raw response body to the success payload text.
pub fn classify(body: &str) -> Result<String, ClientError> {
    let value = parse_json(body)?;

    let object = match value.as_object() {
        Some(object) if object.contains_key(ERROR_KEY) => object,
        _ => {
            return Err(ClientError::new(
                ErrorDomain::Server,
                ErrorKind::Data,
                codes::DATA_EXCEPTION,
                "null data",
            ))
        }
    };

    let code = error_code(&object[ERROR_KEY])?;
    if code != 0 {
        let message = object.get(DATA_KEY).map(field_text).unwrap_or_default();
        debug!(code, "server returned error envelope");
        return Err(ClientError::server(code, message));
    }

    match object.get(DATA_KEY) {
        Some(data) => Ok(field_text(data)),
        None => Err(ClientError::data("Missing format specifier 'data'")),
    }
}

/// Run the full pipeline synchronously: classify, then decode. A payload the
/// decoder finds nothing deliverable in becomes a data error.
pub fn parse<D: PayloadDecoder>(decoder: &D, body: &str) -> Result<D::Output, ClientError> {
    let payload = classify(body)?;
    decoder
        .decode(&payload)?
        .ok_or_else(|| ClientError::data(NOT_MATCH_FORMAT))
}

fn error_code(value: &Value) -> Result<i32, ClientError> {
    let code = match value {
        Value::Null => Some(0),
        Value::Number(n) => n.as_i64().or_else(|| whole_number(n.as_f64()?)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    code.and_then(|c| i32::try_from(c).ok())
        .ok_or_else(|| ClientError::data(format!("NumberFormatException: {value}")))
}

/// `0.0` and `1e3` are codes; `1.5` is not.
fn whole_number(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}
