//! Error records, error classification and error types.
//!
//! Every failed exchange is first turned into an [`ErrorRecord`], the same
//! shape the service uses for its own failure bodies. Depending on the
//! client's [`ErrorPropagation`] the record is either returned as data or
//! wrapped in a classified [`AkiError`].
//!
//! Classification is the total function [`classify`]: every combination of
//! status code and [`RequestKind`] maps to exactly one [`ErrorKind`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ErrorPropagation;
use crate::transport::{RawResponse, TransportError};
use crate::types::JobState;

/// Status code recorded when no HTTP status is available.
pub const DEFAULT_ERROR_CODE: u16 = 400;

/// Message used when a failure body has no `error` field.
pub const UNKNOWN_NETWORK_ERROR: &str = "Unknown network error";

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// The exchange a failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    KeyValidation,
    /// Job submission (`call/{endpoint}`).
    Api,
    /// Progress query (`progress/{endpoint}`).
    Progress,
    EndpointList,
    EndpointDetails,
}

impl RequestKind {
    fn label(self) -> &'static str {
        match self {
            Self::KeyValidation => "Key validation",
            Self::Api => "Api",
            Self::Progress => "Progress",
            Self::EndpointList => "Endpoint list",
            Self::EndpointDetails => "Endpoint details",
        }
    }
}

/// Fatal failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input (status 400). Never retried.
    Validation,
    /// Service unreachable, 404 (endpoint disabled or no free queue slot) or
    /// 5xx outside the progress channel.
    Connection,
    /// The progress channel failed while a job was in flight.
    BrokenPipe,
    /// Any other 4xx, e.g. an invalid API key. Never retried.
    Permission,
    /// Everything else.
    Unknown,
}

/// Maps a failure to its [`ErrorKind`].
///
/// `status` is `None` when no response could be obtained at all.
pub fn classify(status: Option<u16>, request: RequestKind) -> ErrorKind {
    let unreachable = match request {
        RequestKind::Progress => ErrorKind::BrokenPipe,
        _ => ErrorKind::Connection,
    };
    match status {
        None | Some(404) | Some(500..=599) => unreachable,
        Some(400) => ErrorKind::Validation,
        Some(401..=499) => ErrorKind::Permission,
        Some(_) => ErrorKind::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Error record
// ---------------------------------------------------------------------------

/// A failure, shaped like the service's own failure bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Always `false`.
    pub success: bool,
    /// Human-readable message. Multiple messages from the origin are joined with `;`.
    pub error: String,
    /// HTTP-style status; [`DEFAULT_ERROR_CODE`] when none was available.
    pub error_code: u16,
    /// Last known job state when the failure happened mid-polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_state: Option<JobState>,
    /// Any further fields of the failure body, passed through untouched.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ErrorRecord {
    pub fn new(error: impl Into<String>, error_code: u16) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code,
            job_state: None,
            details: Map::new(),
        }
    }

    #[must_use]
    pub fn with_job_state(mut self, state: JobState) -> Self {
        self.job_state = Some(state);
        self
    }

    /// Builds a record from a JSON failure body.
    ///
    /// `error` may be a string or a list of strings; a missing `error` becomes
    /// [`UNKNOWN_NETWORK_ERROR`]. A numeric `error_code` in the body wins over
    /// `status`.
    pub fn from_body(mut body: Map<String, Value>, status: u16) -> Self {
        let error = match body.remove("error") {
            Some(Value::String(s)) => s,
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(";"),
            Some(Value::Null) | None => UNKNOWN_NETWORK_ERROR.to_string(),
            Some(other) => other.to_string(),
        };
        let error_code = body
            .remove("error_code")
            .and_then(|v| v.as_u64())
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(status);
        let job_state = body
            .remove("job_state")
            .and_then(|v| v.as_str().and_then(JobState::from_wire));
        body.remove("success");

        Self {
            success: false,
            error,
            error_code,
            job_state,
            details: body,
        }
    }

    /// Builds a record from any failure origin.
    ///
    /// For a failed response the HTTP status always becomes `error_code`.
    pub fn from_failure(origin: &FailureOrigin) -> Self {
        match origin {
            FailureOrigin::Response(response) => match response.json() {
                Some(Value::Object(body)) => Self {
                    error_code: response.status,
                    ..Self::from_body(body, response.status)
                },
                _ => {
                    let text = response.text.trim();
                    let error = if text.is_empty() {
                        format!("HTTP status {}", response.status)
                    } else {
                        text.to_string()
                    };
                    Self::new(error, response.status)
                }
            },
            FailureOrigin::NoResponse(err) => Self::new(err.to_string(), DEFAULT_ERROR_CODE),
            FailureOrigin::Rejected(message) => Self::new(message.clone(), DEFAULT_ERROR_CODE),
        }
    }

    /// Converts back to the JSON failure body.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Where a failure came from.
#[derive(Debug, Clone)]
pub enum FailureOrigin {
    /// The service answered with a non-success status.
    Response(RawResponse),
    /// No response could be obtained.
    NoResponse(TransportError),
    /// The request was rejected locally before anything was sent.
    Rejected(String),
}

impl FailureOrigin {
    /// Status used for classification; `None` when the service was unreachable.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response(response) => Some(response.status),
            Self::NoResponse(_) => None,
            Self::Rejected(_) => Some(DEFAULT_ERROR_CODE),
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Turns failure origins into records and, in raise mode, into errors.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    api_url: String,
    propagation: ErrorPropagation,
}

impl ErrorClassifier {
    pub fn new(api_url: impl Into<String>, propagation: ErrorPropagation) -> Self {
        Self {
            api_url: api_url.into(),
            propagation,
        }
    }

    /// Returns the record for `origin`, or the classified error in raise mode.
    pub fn handle(&self, origin: FailureOrigin, request: RequestKind) -> Result<ErrorRecord, AkiError> {
        let record = ErrorRecord::from_failure(&origin);
        match self.propagation {
            ErrorPropagation::ReturnRecord => Ok(record),
            ErrorPropagation::Raise => {
                let kind = classify(origin.status(), request);
                let description = self.describe(&record, request);
                Err(AkiError::from_kind(kind, description, record))
            }
        }
    }

    fn describe(&self, record: &ErrorRecord, request: RequestKind) -> String {
        format!(
            "{} request at {} failed!\nHttp status code: {}\nError message: {}",
            request.label(),
            self.api_url,
            record.error_code,
            record.error
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A classified failure, returned when the client is configured to raise.
///
/// Every protocol variant carries the [`ErrorRecord`] it was built from, so
/// callers can always recover the same data record mode would have returned.
#[derive(Debug, Clone, Error)]
pub enum AkiError {
    #[error("{description}")]
    Validation { description: String, record: ErrorRecord },

    #[error("{description}")]
    Connection { description: String, record: ErrorRecord },

    #[error("{description}")]
    BrokenPipe { description: String, record: ErrorRecord },

    #[error("{description}")]
    Permission { description: String, record: ErrorRecord },

    #[error("{description}")]
    Unknown { description: String, record: ErrorRecord },

    /// The client could not be built from its configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AkiError {
    pub fn from_kind(kind: ErrorKind, description: String, record: ErrorRecord) -> Self {
        match kind {
            ErrorKind::Validation => Self::Validation { description, record },
            ErrorKind::Connection => Self::Connection { description, record },
            ErrorKind::BrokenPipe => Self::BrokenPipe { description, record },
            ErrorKind::Permission => Self::Permission { description, record },
            ErrorKind::Unknown => Self::Unknown { description, record },
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// The protocol category, `None` for configuration errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Validation { .. } => Some(ErrorKind::Validation),
            Self::Connection { .. } => Some(ErrorKind::Connection),
            Self::BrokenPipe { .. } => Some(ErrorKind::BrokenPipe),
            Self::Permission { .. } => Some(ErrorKind::Permission),
            Self::Unknown { .. } => Some(ErrorKind::Unknown),
            Self::Configuration { .. } => None,
        }
    }

    /// The record behind a protocol error.
    pub fn record(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Validation { record, .. }
            | Self::Connection { record, .. }
            | Self::BrokenPipe { record, .. }
            | Self::Permission { record, .. }
            | Self::Unknown { record, .. } => Some(record),
            Self::Configuration { .. } => None,
        }
    }

    /// The record behind this error, or a synthesized one for configuration errors.
    pub fn to_record(&self) -> ErrorRecord {
        self.record()
            .cloned()
            .unwrap_or_else(|| ErrorRecord::new(self.to_string(), DEFAULT_ERROR_CODE))
    }

    /// Stamps the last known job state onto the carried record.
    #[must_use]
    pub fn with_job_state(mut self, state: JobState) -> Self {
        match &mut self {
            Self::Validation { record, .. }
            | Self::Connection { record, .. }
            | Self::BrokenPipe { record, .. }
            | Self::Permission { record, .. }
            | Self::Unknown { record, .. } => record.job_state = Some(state),
            Self::Configuration { .. } => {}
        }
        self
    }
}

/// Malformed binary wire values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscodeError {
    #[error("data URI is missing the ',' delimiter")]
    MissingDelimiter,

    #[error("malformed data URI header '{0}'")]
    MalformedHeader(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

impl From<base64::DecodeError> for TranscodeError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidBase64(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier(propagation: ErrorPropagation) -> ErrorClassifier {
        ErrorClassifier::new("https://aki.io/api/", propagation)
    }

    #[test]
    fn test_classify_is_total_over_status_codes() {
        for request in [RequestKind::Api, RequestKind::Progress, RequestKind::EndpointList] {
            for status in 0..=u16::MAX {
                // Must not panic; every code lands in exactly one bucket.
                let _ = classify(Some(status), request);
            }
        }
    }

    #[test]
    fn test_classify_buckets() {
        assert_eq!(classify(Some(404), RequestKind::Api), ErrorKind::Connection);
        assert_eq!(classify(Some(503), RequestKind::Api), ErrorKind::Connection);
        assert_eq!(classify(None, RequestKind::Api), ErrorKind::Connection);
        assert_eq!(classify(Some(404), RequestKind::Progress), ErrorKind::BrokenPipe);
        assert_eq!(classify(Some(500), RequestKind::Progress), ErrorKind::BrokenPipe);
        assert_eq!(classify(None, RequestKind::Progress), ErrorKind::BrokenPipe);
        assert_eq!(classify(Some(400), RequestKind::Progress), ErrorKind::Validation);
        assert_eq!(classify(Some(401), RequestKind::KeyValidation), ErrorKind::Permission);
        assert_eq!(classify(Some(403), RequestKind::Api), ErrorKind::Permission);
        assert_eq!(classify(Some(302), RequestKind::Api), ErrorKind::Unknown);
        assert_eq!(classify(Some(200), RequestKind::Api), ErrorKind::Unknown);
    }

    #[test]
    fn test_record_from_parseable_body_joins_error_list() {
        let response = RawResponse::new(422, r#"{"error": ["bad prompt", "bad seed"]}"#);
        let record = ErrorRecord::from_failure(&FailureOrigin::Response(response));
        assert_eq!(record.error, "bad prompt;bad seed");
        assert_eq!(record.error_code, 422);
        assert!(!record.success);
    }

    #[test]
    fn test_record_from_body_without_error_uses_default_message() {
        let response = RawResponse::new(500, r#"{"detail": "x"}"#);
        let record = ErrorRecord::from_failure(&FailureOrigin::Response(response));
        assert_eq!(record.error, UNKNOWN_NETWORK_ERROR);
        assert_eq!(record.details.get("detail"), Some(&json!("x")));
    }

    #[test]
    fn test_record_from_unparseable_body_wraps_text() {
        let response = RawResponse::new(502, "Bad Gateway");
        let record = ErrorRecord::from_failure(&FailureOrigin::Response(response));
        assert_eq!(record.error, "Bad Gateway");
        assert_eq!(record.error_code, 502);
    }

    #[test]
    fn test_record_without_response_defaults_to_400() {
        let origin = FailureOrigin::NoResponse(TransportError::new("connection refused"));
        let record = ErrorRecord::from_failure(&origin);
        assert_eq!(record.error, "connection refused");
        assert_eq!(record.error_code, DEFAULT_ERROR_CODE);
    }

    #[test]
    fn test_record_serializes_like_failure_body() {
        let record = ErrorRecord::new("boom", 404).with_job_state(JobState::Processing);
        assert_eq!(
            record.to_json(),
            json!({"success": false, "error": "boom", "error_code": 404, "job_state": "processing"})
        );
    }

    #[test]
    fn test_return_record_mode_never_raises() {
        let origin = FailureOrigin::Response(RawResponse::new(404, r#"{"error": "no queue"}"#));
        let record = classifier(ErrorPropagation::ReturnRecord)
            .handle(origin, RequestKind::Api)
            .unwrap();
        assert_eq!(record.error_code, 404);
        assert_eq!(record.error, "no queue");
    }

    #[test]
    fn test_raise_mode_classifies_and_describes() {
        let origin = FailureOrigin::Response(RawResponse::new(404, r#"{"error": "no queue"}"#));
        let err = classifier(ErrorPropagation::Raise)
            .handle(origin, RequestKind::Api)
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Connection));
        assert_eq!(err.record().unwrap().error_code, 404);
        assert_eq!(
            err.to_string(),
            "Api request at https://aki.io/api/ failed!\nHttp status code: 404\nError message: no queue"
        );
    }

    #[test]
    fn test_raise_mode_local_rejection_is_validation() {
        let origin = FailureOrigin::Rejected("param 'image' is in binary form".into());
        let err = classifier(ErrorPropagation::Raise)
            .handle(origin, RequestKind::Api)
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
    }

    #[test]
    fn test_with_job_state_stamps_record() {
        let err = AkiError::from_kind(
            ErrorKind::BrokenPipe,
            "lost".into(),
            ErrorRecord::new("lost", 503),
        )
        .with_job_state(JobState::Processing);
        assert_eq!(err.record().unwrap().job_state, Some(JobState::Processing));
    }
}
