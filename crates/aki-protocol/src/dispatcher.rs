//! Job submission.
//!
//! One [`RequestDispatcher::submit`] call is exactly one `call/{endpoint}`
//! exchange (or none, when the parameters fail validation).

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{AkiError, ErrorClassifier, ErrorRecord, FailureOrigin, RequestKind, DEFAULT_ERROR_CODE};
use crate::identifiers::JobId;
use crate::transport::Transport;
use crate::values::{ParamValue, RequestParams};

/// Request field carrying the credential.
pub const KEY_FIELD: &str = "key";
/// Request field carrying the internal session token.
pub const SESSION_TOKEN_FIELD: &str = "client_session_auth_key";
/// Request field asking the service to block until the job completes.
pub const WAIT_FOR_RESULT_FIELD: &str = "wait_for_result";

/// How the service answered a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The job was queued; progress must be polled.
    Accepted { job_id: JobId },
    /// The service answered with the final result (raw JSON body).
    Completed(Value),
    /// The submission failed and the client is in record mode, or the service
    /// itself reported `success: false`.
    Rejected(ErrorRecord),
}

/// Serializes, validates and submits request parameters.
pub struct RequestDispatcher<'a, T: ?Sized> {
    transport: &'a T,
    config: &'a ClientConfig,
}

impl<'a, T: Transport + ?Sized> RequestDispatcher<'a, T> {
    pub fn new(transport: &'a T, config: &'a ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Submits `params` to the configured endpoint.
    ///
    /// `wait_for_result` tells the service whether to block until the job is
    /// done. Failures come back as [`Submission::Rejected`] unless the client
    /// raises, in which case they are a classified [`AkiError`].
    pub async fn submit(&self, params: RequestParams, wait_for_result: bool) -> Result<Submission, AkiError> {
        let classifier = ErrorClassifier::new(self.config.api_url(), self.config.propagation);

        let mut body = match encode_params(params) {
            Ok(body) => body,
            Err(message) => {
                warn!(error = %message, "request rejected before submission");
                return classifier
                    .handle(FailureOrigin::Rejected(message), RequestKind::Api)
                    .map(Submission::Rejected);
            }
        };
        body.insert(
            KEY_FIELD.to_string(),
            self.config
                .api_key
                .as_ref()
                .map_or(Value::Null, |k| Value::String(k.as_str().to_string())),
        );
        body.insert(
            SESSION_TOKEN_FIELD.to_string(),
            self.config
                .session_token
                .clone()
                .map_or(Value::Null, Value::String),
        );
        body.insert(WAIT_FOR_RESULT_FIELD.to_string(), Value::Bool(wait_for_result));

        let path = format!("call/{}", self.config.endpoint);
        debug!(%path, wait_for_result, "submitting job");

        let response = match self.transport.post_json(&path, &body).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%path, error = %err, "submission failed without response");
                return classifier
                    .handle(FailureOrigin::NoResponse(err), RequestKind::Api)
                    .map(Submission::Rejected);
            }
        };

        if !response.is_success() {
            warn!(%path, status = response.status, "submission failed");
            return classifier
                .handle(FailureOrigin::Response(response), RequestKind::Api)
                .map(Submission::Rejected);
        }

        match response.json() {
            Some(Value::Object(reply)) => Ok(interpret_reply(reply, wait_for_result)),
            _ => classifier
                .handle(FailureOrigin::Response(response), RequestKind::Api)
                .map(Submission::Rejected),
        }
    }
}

/// Serializes structured values to strings and rejects unencoded bytes.
///
/// The wire format only accepts scalar or string values; the service parses
/// serialized maps and lists back.
fn encode_params(params: RequestParams) -> Result<Map<String, Value>, String> {
    let mut body = Map::new();
    for (key, value) in params {
        let value = match value {
            ParamValue::Json(value @ (Value::Object(_) | Value::Array(_))) => Value::String(value.to_string()),
            ParamValue::Json(value) => value,
            ParamValue::RawBytes(_) => {
                return Err(format!(
                    "param '{key}' is in binary form, please use encode_binary(...) to set binary data"
                ))
            }
        };
        body.insert(key, value);
    }
    Ok(body)
}

fn interpret_reply(reply: Map<String, Value>, wait_for_result: bool) -> Submission {
    let success = reply.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        return Submission::Rejected(ErrorRecord::from_body(reply, DEFAULT_ERROR_CODE));
    }
    let job_id = reply
        .get("job_id")
        .and_then(Value::as_str)
        .and_then(JobId::new);
    match job_id {
        Some(job_id) if !wait_for_result => Submission::Accepted { job_id },
        _ => Submission::Completed(Value::Object(reply)),
    }
}
