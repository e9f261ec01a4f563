//! Value model for request parameters and job results.
//!
//! The service speaks JSON, but a result field may be plain text, a nested map,
//! or binary media carried as a data-URI string. Results are resolved once, at
//! the [`crate::transcoder`] boundary, into [`ResultValue`] / [`Payload`] so
//! downstream code never re-inspects raw JSON types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transcoder;

// ---------------------------------------------------------------------------
// Binary media
// ---------------------------------------------------------------------------

/// Media category of a binary value, the `<category>` part of
/// `data:<category>/<format>;base64,<payload>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaCategory {
    /// `png`, `jpeg`, `webp`, `tiff`, `gif`, `bmp`.
    Image,
    /// `wav`, `mp3`, `ogg`, `flac`.
    Audio,
    /// Anything else.
    OctetStream,
}

const IMAGE_FORMATS: &[&str] = &["png", "jpeg", "webp", "tiff", "gif", "bmp"];
const AUDIO_FORMATS: &[&str] = &["wav", "mp3", "ogg", "flac"];

impl MediaCategory {
    /// Infers the category from a codec name (case-insensitive).
    pub fn from_format(format: &str) -> Self {
        let format = format.to_ascii_lowercase();
        if IMAGE_FORMATS.contains(&format.as_str()) {
            Self::Image
        } else if AUDIO_FORMATS.contains(&format.as_str()) {
            Self::Audio
        } else {
            Self::OctetStream
        }
    }

    /// Parses the category segment of a data-URI header. Unknown categories
    /// collapse to [`MediaCategory::OctetStream`].
    pub fn from_wire(category: &str) -> Self {
        match category.to_ascii_lowercase().as_str() {
            "image" => Self::Image,
            "audio" => Self::Audio,
            _ => Self::OctetStream,
        }
    }

    /// Returns the wire spelling of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::OctetStream => "octet-stream",
        }
    }
}

impl std::fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format name used when the media format of some bytes is unknown.
pub const OCTET_STREAM: &str = "octet-stream";

/// Raw bytes paired with their media category and format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryValue {
    /// Media category (`image`, `audio`, `octet-stream`).
    pub category: MediaCategory,
    /// Lowercase codec name (e.g. `png`, `wav`).
    pub format: String,
    /// The decoded bytes.
    pub bytes: Vec<u8>,
}

impl BinaryValue {
    /// Creates a value whose category is inferred from `format`.
    pub fn new(format: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let format = format.into().to_ascii_lowercase();
        Self {
            category: MediaCategory::from_format(&format),
            format,
            bytes: bytes.into(),
        }
    }

    /// Creates a value of unknown media type.
    pub fn octet_stream(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            category: MediaCategory::OctetStream,
            format: OCTET_STREAM.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Overrides the inferred category.
    #[must_use]
    pub fn with_category(mut self, category: MediaCategory) -> Self {
        self.category = category;
        self
    }

    /// Returns the data-URI wire form of this value.
    pub fn to_data_uri(&self) -> String {
        transcoder::encode(&self.bytes, &self.format, Some(self.category))
    }
}

// ---------------------------------------------------------------------------
// Result values
// ---------------------------------------------------------------------------

/// Ordered map of result fields.
pub type ResultMap = BTreeMap<String, ResultValue>;

/// One field of a job result or progress payload after transcoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    /// A data-URI string decoded because the client asked for raw bytes.
    Binary(BinaryValue),
    List(Vec<ResultValue>),
    Map(ResultMap),
}

impl ResultValue {
    /// Returns the string content of a [`ResultValue::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the decoded bytes of a [`ResultValue::Binary`].
    pub fn as_binary(&self) -> Option<&BinaryValue> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as `i64` when it is an integral number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Converts back to JSON. Binary values are re-encoded as data-URIs.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Binary(b) => Value::String(b.to_data_uri()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ResultValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The data carried by one snapshot or final result.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No data (absent or `null` on the wire).
    #[default]
    Empty,
    Text(String),
    /// A map of named result fields, the common case.
    Structured(ResultMap),
    Binary(BinaryValue),
}

impl Payload {
    /// Looks up a field of a structured payload.
    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        match self {
            Self::Structured(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns the field map of a structured payload.
    pub fn as_structured(&self) -> Option<&ResultMap> {
        match self {
            Self::Structured(map) => Some(map),
            _ => None,
        }
    }

    /// Returns `true` for [`Payload::Empty`] and for a structured payload with no fields.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Structured(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Inserts a field, promoting [`Payload::Empty`] to a structured payload.
    /// Text and binary payloads are left untouched.
    pub fn tag(&mut self, key: &str, value: ResultValue) {
        match self {
            Self::Empty => {
                let mut map = ResultMap::new();
                map.insert(key.to_string(), value);
                *self = Self::Structured(map);
            }
            Self::Structured(map) => {
                map.insert(key.to_string(), value);
            }
            Self::Text(_) | Self::Binary(_) => {}
        }
    }

    /// Converts back to JSON. Binary values are re-encoded as data-URIs.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Structured(map) => ResultValue::Map(map.clone()).to_json(),
            Self::Binary(b) => Value::String(b.to_data_uri()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// One request parameter as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Any JSON value. Objects and arrays are serialized to strings before
    /// transmission.
    Json(Value),
    /// Unencoded bytes. Always rejected by the dispatcher: binary data must be
    /// passed through [`transcoder::encode`] first.
    RawBytes(Vec<u8>),
}

macro_rules! json_param_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::Json(Value::from(value))
                }
            }
        )*
    };
}

json_param_from!(&str, String, bool, i32, i64, u32, u64, f64);

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::RawBytes(value)
    }
}

impl From<&[u8]> for ParamValue {
    fn from(value: &[u8]) -> Self {
        Self::RawBytes(value.to_vec())
    }
}

/// Named parameters of one submission, e.g. `prompt`, `image`, `top_k`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams(BTreeMap<String, ParamValue>);

impl RequestParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

impl IntoIterator for RequestParams {
    type Item = (String, ParamValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Map<String, Value>> for RequestParams {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}
