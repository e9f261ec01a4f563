//! Per-client configuration.
//!
//! [`ClientConfig`] is immutable once a client is built: every job session
//! started from that client sees the same endpoint, credential, output format,
//! error propagation mode and polling policy.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identifiers::{ApiKey, EndpointName};

/// Default base address of the service.
pub const DEFAULT_API_SERVER: &str = "https://aki.io";

/// Default pause between two successful progress queries.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of retries after a failed progress query.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default pause before each progress query retry.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Output binary format
// ---------------------------------------------------------------------------

/// How binary fields of results are handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputBinaryFormat {
    /// Keep data-URI strings as text.
    #[default]
    #[serde(alias = "base64")]
    Encoded,
    /// Decode data-URI strings into bytes.
    #[serde(alias = "byte_string")]
    RawBytes,
}

impl FromStr for OutputBinaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encoded" | "base64" => Ok(Self::Encoded),
            "raw-bytes" | "raw_bytes" | "byte_string" => Ok(Self::RawBytes),
            other => Err(format!("unknown output binary format '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Error propagation
// ---------------------------------------------------------------------------

/// Whether failed exchanges come back as data or as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPropagation {
    /// Return an [`crate::ErrorRecord`] in place of the result.
    #[default]
    ReturnRecord,
    /// Return a classified [`crate::AkiError`].
    Raise,
}

// ---------------------------------------------------------------------------
// Poll policy
// ---------------------------------------------------------------------------

/// Timing and retry bounds of the progress loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Pause between two successful progress queries.
    pub interval: Duration,
    /// Retries after a failed progress query before the failure is surfaced.
    pub retry_attempts: u32,
    /// Pause before each retry. Independent of `interval`.
    pub retry_pause: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROGRESS_INTERVAL,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }
}

impl PollPolicy {
    /// Total number of attempts one progress query may take.
    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Immutable settings shared by every job session of one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Compute endpoint every request of this client goes to.
    pub endpoint: EndpointName,

    /// Credential sent as `key`. `None` sends an explicit `null`.
    #[serde(default)]
    pub api_key: Option<ApiKey>,

    /// Base address of the service, without the `/api/` suffix.
    #[serde(default = "default_api_server")]
    pub api_server: String,

    #[serde(default)]
    pub output_binary_format: OutputBinaryFormat,

    #[serde(default)]
    pub propagation: ErrorPropagation,

    /// Session token sent as `client_session_auth_key`.
    #[serde(default)]
    pub session_token: Option<String>,

    #[serde(default)]
    pub poll: PollPolicy,
}

fn default_api_server() -> String {
    DEFAULT_API_SERVER.to_string()
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: EndpointName) -> Self {
        Self {
            endpoint,
            api_key: None,
            api_server: default_api_server(),
            output_binary_format: OutputBinaryFormat::default(),
            propagation: ErrorPropagation::default(),
            session_token: None,
            poll: PollPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    #[must_use]
    pub fn with_api_server(mut self, api_server: impl Into<String>) -> Self {
        self.api_server = api_server.into();
        self
    }

    #[must_use]
    pub fn with_output_binary_format(mut self, format: OutputBinaryFormat) -> Self {
        self.output_binary_format = format;
        self
    }

    #[must_use]
    pub fn with_propagation(mut self, propagation: ErrorPropagation) -> Self {
        self.propagation = propagation;
        self
    }

    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Base URL every request path is appended to: `<api_server>/api/`.
    pub fn api_url(&self) -> String {
        format!("{}/api/", self.api_server.trim_end_matches('/'))
    }
}
