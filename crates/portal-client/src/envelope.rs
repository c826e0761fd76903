//! Response envelopes.
//!
//! The endpoint answers either with the payload itself or with an object like
//! `{status, message, data}`. Errors may ride inside a 200 response, so every
//! body goes through [`check`] before the payload is read.

use portal_types::ports::order_gateway::GatewayError;
use serde_json::Value;

const GENERIC_REJECTION: &str = "request rejected";

/// Message the endpoint attached to a failed response body, if any.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    message_of(&value)
}

fn message_of(value: &Value) -> Option<String> {
    let record = value.as_object()?;
    ["message", "error"]
        .iter()
        .filter_map(|k| record.get(*k))
        .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

/// Turns an in-band failure into [`GatewayError::Rejected`].
pub fn check(value: Value) -> Result<Value, GatewayError> {
    let rejected = match value.as_object() {
        Some(record) => {
            let status_error = record
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("error"));
            let unsuccessful = record.get("success").and_then(Value::as_bool) == Some(false);
            status_error || unsuccessful
        }
        None => false,
    };
    if rejected {
        let message = message_of(&value).unwrap_or_else(|| GENERIC_REJECTION.to_string());
        return Err(GatewayError::Rejected(message));
    }
    Ok(value)
}

/// Strips `data`, then the action key, when present.
pub fn payload(value: Value, key: &str) -> Value {
    let value = take_field(value, "data");
    take_field(value, key)
}

fn take_field(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut record) if record.contains_key(key) => {
            record.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}
