//! Binary ⇄ wire-format conversion.
//!
//! Binary media travels as `data:<category>/<format>;base64,<payload>`. This
//! module is pure and stateless: it encodes bytes into that form, decodes it
//! back, and walks raw JSON results converting data-URIs according to the
//! client's [`OutputBinaryFormat`].

use base64::prelude::*;
use serde_json::Value;

use crate::config::OutputBinaryFormat;
use crate::errors::TranscodeError;
use crate::values::{BinaryValue, MediaCategory, Payload, ResultMap, ResultValue};

const DATA_URI_PREFIX: &str = "data:";

/// Encodes `bytes` as a data-URI.
///
/// `format` is lowercased. When `category` is `None` it is inferred from the
/// format (`png` → `image`, `wav` → `audio`, anything else → `octet-stream`).
pub fn encode(bytes: &[u8], format: &str, category: Option<MediaCategory>) -> String {
    let format = format.to_ascii_lowercase();
    let category = category.unwrap_or_else(|| MediaCategory::from_format(&format));
    format!(
        "{DATA_URI_PREFIX}{category}/{format};base64,{}",
        BASE64_STANDARD.encode(bytes)
    )
}

/// Decodes a data-URI, or a bare base64 string (assumed `octet-stream`).
pub fn decode_str(value: &str) -> Result<BinaryValue, TranscodeError> {
    let Some(rest) = value.strip_prefix(DATA_URI_PREFIX) else {
        let bytes = BASE64_STANDARD.decode(value)?;
        return Ok(BinaryValue::octet_stream(bytes));
    };

    let (header, body) = rest
        .split_once(',')
        .ok_or(TranscodeError::MissingDelimiter)?;
    let (mime, encoding) = header
        .split_once(';')
        .ok_or_else(|| TranscodeError::MalformedHeader(header.to_string()))?;
    if encoding != "base64" {
        return Err(TranscodeError::MalformedHeader(header.to_string()));
    }
    let (category, format) = mime
        .split_once('/')
        .filter(|(category, format)| !category.is_empty() && !format.is_empty())
        .ok_or_else(|| TranscodeError::MalformedHeader(header.to_string()))?;

    let bytes = BASE64_STANDARD.decode(body)?;
    Ok(BinaryValue {
        category: MediaCategory::from_wire(category),
        format: format.to_ascii_lowercase(),
        bytes,
    })
}

/// Decodes any result value that can carry binary data.
///
/// Text is decoded as a data-URI or bare base64; an already-decoded binary
/// value passes through unchanged. Every other value, and text that is not
/// valid base64, yields `None`.
pub fn decode(value: &ResultValue) -> Option<BinaryValue> {
    match value {
        ResultValue::Text(s) => decode_str(s).ok(),
        ResultValue::Binary(b) => Some(b.clone()),
        _ => None,
    }
}

/// Structural check deciding whether a string can be converted back to bytes.
///
/// The string must contain a `,`; the segment after it must decode as base64
/// and re-encode to exactly the same text. An empty segment only counts when
/// the string is a data-URI (an encoded empty buffer).
pub fn is_valid_base64(value: &str) -> bool {
    let Some(body) = value.split(',').nth(1) else {
        return false;
    };
    if body.is_empty() {
        return value.starts_with(DATA_URI_PREFIX);
    }
    match BASE64_STANDARD.decode(body) {
        Ok(bytes) => BASE64_STANDARD.encode(bytes) == body,
        Err(_) => false,
    }
}

/// Converts a raw JSON result into a [`Payload`].
///
/// Objects become [`Payload::Structured`] with every field converted by
/// [`convert_value`]; `null` becomes [`Payload::Empty`]; a top-level string
/// is converted like a field. Other scalars and top-level arrays are kept as
/// their JSON text.
pub fn convert_result(value: Value, mode: OutputBinaryFormat) -> Payload {
    match value {
        Value::Null => Payload::Empty,
        Value::Object(map) => Payload::Structured(convert_map(map, mode)),
        Value::String(s) => match convert_text(s, mode) {
            ResultValue::Binary(b) => Payload::Binary(b),
            ResultValue::Text(s) => Payload::Text(s),
            other => Payload::Text(other.to_json().to_string()),
        },
        other => Payload::Text(other.to_string()),
    }
}

/// Converts one JSON value.
///
/// Strings are decoded in place when the mode is [`OutputBinaryFormat::RawBytes`]
/// and [`is_valid_base64`] accepts them; lists are converted element-wise and
/// maps recursively. Non-string scalars pass through.
pub fn convert_value(value: Value, mode: OutputBinaryFormat) -> ResultValue {
    match value {
        Value::Null => ResultValue::Null,
        Value::Bool(b) => ResultValue::Bool(b),
        Value::Number(n) => ResultValue::Number(n),
        Value::String(s) => convert_text(s, mode),
        Value::Array(items) => ResultValue::List(
            items
                .into_iter()
                .map(|item| convert_value(item, mode))
                .collect(),
        ),
        Value::Object(map) => ResultValue::Map(convert_map(map, mode)),
    }
}

fn convert_map(map: serde_json::Map<String, Value>, mode: OutputBinaryFormat) -> ResultMap {
    map.into_iter()
        .map(|(k, v)| (k, convert_value(v, mode)))
        .collect()
}

fn convert_text(text: String, mode: OutputBinaryFormat) -> ResultValue {
    if mode == OutputBinaryFormat::RawBytes && is_valid_base64(&text) {
        if let Some(binary) = binary_from_text(&text) {
            return ResultValue::Binary(binary);
        }
    }
    ResultValue::Text(text)
}

// Only called after `is_valid_base64`: a non-data-URI string is decoded from
// the segment after its first comma.
fn binary_from_text(text: &str) -> Option<BinaryValue> {
    if text.starts_with(DATA_URI_PREFIX) {
        return decode_str(text).ok();
    }
    let body = text.split(',').nth(1)?;
    BASE64_STANDARD
        .decode(body)
        .ok()
        .map(BinaryValue::octet_stream)
}
