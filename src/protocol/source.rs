//! Backend (source) event payloads.
//!
//! The backend wraps everything it wants shown to the user in a `response`
//! object discriminated by `response.type`. Only two types carry text the
//! relay understands; every other shape is kept as a JSON value and shown to
//! the user in its serialized form.

use std::borrow::Cow;

use serde_json::{Map, Number, Value};

pub const TEXT_RESPONSE_TYPE: &str = "text_response";
pub const MAP_FOCUS_TYPE: &str = "map_focus";

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Parsed `data:` payload of a backend event.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    /// The payload carries a `response` envelope.
    Response(SourceResponse),
    /// Valid JSON with no usable `response` field.
    Unenveloped,
}

/// The `response` object of a backend event, classified by `type`.
#[derive(Debug, Clone)]
pub enum SourceResponse {
    TextResponse {
        content: String,
    },
    MapFocus {
        text_response: Option<String>,
        location_name: Option<String>,
    },
    /// Unknown `type`, a `text_response` without string content, or a
    /// non-object `response`.
    Other(Value),
}

/// Why a `data:` payload could not be turned into a [`SourcePayload`].
#[derive(Debug, thiserror::Error)]
pub enum SourceParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed {kind} response: {reason}")]
    Malformed {
        kind: &'static str,
        reason: &'static str,
    },
}

/// Parse the text following a `data: ` marker.
///
/// Duplicate keys resolve to the last value and keys keep their first
/// position, as a browser `JSON.parse` would.
///
/// # Errors
///
/// Returns [`SourceParseError::Json`] when `data` is not JSON, and
/// [`SourceParseError::Malformed`] for a `map_focus` response with nothing to
/// show.
pub fn parse_source_payload(data: &str) -> Result<SourcePayload, SourceParseError> {
    let Value::Object(mut payload) = serde_json::from_str::<Value>(data)? else {
        return Ok(SourcePayload::Unenveloped);
    };
    let Some(response) = payload.remove("response") else {
        return Ok(SourcePayload::Unenveloped);
    };
    if is_falsy(&response) {
        return Ok(SourcePayload::Unenveloped);
    }
    Ok(SourcePayload::Response(SourceResponse::classify(response)?))
}

/// `null`, `false`, zero and `""` do not count as an envelope.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

impl SourceResponse {
    /// Classify a `response` value by its `type` discriminator.
    ///
    /// # Errors
    ///
    /// Returns [`SourceParseError::Malformed`] for a `map_focus` response that
    /// has neither a non-empty `text_response` nor a `data` object.
    pub fn classify(response: Value) -> Result<Self, SourceParseError> {
        let Value::Object(object) = &response else {
            return Ok(SourceResponse::other(response));
        };

        match object.get("type").and_then(Value::as_str) {
            Some(TEXT_RESPONSE_TYPE) => {
                if let Some(content) = object.get("content").and_then(Value::as_str) {
                    return Ok(SourceResponse::TextResponse {
                        content: content.to_string(),
                    });
                }
            }
            Some(MAP_FOCUS_TYPE) => {
                let text_response = non_empty_str(object, "text_response").map(str::to_string);
                let data = object.get("data").and_then(Value::as_object);
                if text_response.is_none() && data.is_none() {
                    return Err(SourceParseError::Malformed {
                        kind: MAP_FOCUS_TYPE,
                        reason: "neither text_response nor data",
                    });
                }
                let location_name = data
                    .and_then(|d| d.get("location_name"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if text_response.is_some() || location_name.is_some() {
                    return Ok(SourceResponse::MapFocus {
                        text_response,
                        location_name,
                    });
                }
            }
            _ => {}
        }

        Ok(SourceResponse::other(response))
    }

    fn other(mut response: Value) -> Self {
        normalize_numbers(&mut response);
        SourceResponse::Other(response)
    }

    /// Text shown to the user for this response.
    #[must_use]
    pub fn content(&self) -> Cow<'_, str> {
        match self {
            SourceResponse::TextResponse { content } => Cow::Borrowed(content),
            SourceResponse::MapFocus {
                text_response: Some(text),
                ..
            } => Cow::Borrowed(text),
            SourceResponse::MapFocus {
                location_name: Some(name),
                ..
            } => Cow::Owned(format!("Showing {name} on the map.")),
            SourceResponse::MapFocus { .. } => Cow::Borrowed(""),
            SourceResponse::Other(value) => Cow::Owned(value.to_string()),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SourceResponse::TextResponse { .. } => TEXT_RESPONSE_TYPE,
            SourceResponse::MapFocus { .. } => MAP_FOCUS_TYPE,
            SourceResponse::Other(_) => "other",
        }
    }
}

/// Rewrite integral floats (`35.0`, `1e2`) as integers so they serialize the
/// way a JavaScript client would print them.
fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if !n.is_f64() {
                return;
            }
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
                    #[allow(clippy::cast_possible_truncation)]
                    let int = f as i64;
                    *n = Number::from(int);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(object) => object.values_mut().for_each(normalize_numbers),
        Value::Null | Value::Bool(_) | Value::String(_) => {}
    }
}
