//! The transport port.
//!
//! The protocol engine never touches HTTP directly. It consumes a generic
//! request/response primitive, [`Transport`], that infrastructure crates
//! implement (the `aki-client` crate provides one over `reqwest`). Paths are
//! relative to the API base URL, e.g. `call/llama3_chat`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Status code of a successful exchange.
pub const STATUS_OK: u16 = 200;

/// A response as received: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub text: String,
}

impl RawResponse {
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    /// Builds a response whose body is the serialized `body`.
    pub fn json_body(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Only status 200 counts as success.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Parses the body as JSON, `None` if it is not JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.text).ok()
    }
}

/// No response could be obtained (connection refused, TLS failure, timeout...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One request/response exchange with the service.
///
/// Implementations own the connection context (pooling, TLS) and must be safe
/// to share between concurrently running job sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `body` as JSON to `path`.
    async fn post_json(&self, path: &str, body: &Map<String, Value>) -> Result<RawResponse, TransportError>;

    /// GETs `path` with the given query pairs.
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post_json(&self, path: &str, body: &Map<String, Value>) -> Result<RawResponse, TransportError> {
        (**self).post_json(path, body).await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<RawResponse, TransportError> {
        (**self).get(path, query).await
    }
}
