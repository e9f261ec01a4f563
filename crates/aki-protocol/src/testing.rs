//! Scripted [`Transport`] double for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::{ClientConfig, PollPolicy};
use crate::identifiers::{ApiKey, EndpointName};
use crate::transport::{RawResponse, Transport, TransportError};

/// One request seen by the scripted transport.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Recorded {
    pub path: String,
    pub body: Map<String, Value>,
}

/// Replays canned replies in order and records every request.
///
/// Running out of replies is reported as a transport failure, so a test that
/// polls more often than scripted fails loudly instead of hanging.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(RawResponse::json_body(status, &body)));
        self
    }

    pub fn reply_text(self, status: u16, text: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(RawResponse::new(status, text)));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(TransportError::new(message)));
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .collect()
    }

    fn next(&self, path: &str, body: Map<String, Value>) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            path: path.to_string(),
            body,
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new(format!("no scripted reply for {path}"))))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, path: &str, body: &Map<String, Value>) -> Result<RawResponse, TransportError> {
        self.next(path, body.clone())
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<RawResponse, TransportError> {
        let body = query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.next(path, body)
    }
}

/// A config for endpoint `E` with instant polling and retries.
pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::new(EndpointName::new("E").unwrap())
        .with_api_key(ApiKey::new("test-key").unwrap())
        .with_api_server("http://127.0.0.1:9")
        .with_poll_policy(PollPolicy {
            interval: Duration::ZERO,
            retry_attempts: 3,
            retry_pause: Duration::from_millis(1),
        })
}

pub(crate) fn accepted(job_id: &str) -> Value {
    json!({"success": true, "job_id": job_id})
}

pub(crate) fn processing(progress: u64, queue_position: i64, estimate: f64, data: Value) -> Value {
    json!({
        "success": true,
        "job_state": "processing",
        "progress": {
            "progress": progress,
            "queue_position": queue_position,
            "estimate": estimate,
            "progress_data": data,
        },
    })
}

pub(crate) fn done(result: Value) -> Value {
    json!({"success": true, "job_state": "done", "progress": {}, "job_result": result})
}
