//! The client facade.
//!
//! [`Client`] ties configuration, a [`Transport`] and the per-client
//! registries together. Cloning a client is cheap and clones share the
//! transport and the registries, so a cancel issued through one clone reaches
//! a job polled by another.

use std::sync::Arc;

use futures::Stream;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::callbacks::Handlers;
use crate::config::ClientConfig;
use crate::errors::{AkiError, ErrorClassifier, ErrorRecord, FailureOrigin, RequestKind};
use crate::identifiers::{ApiKey, EndpointName, JobId};
use crate::registry::{CancelTarget, CancellationRegistry, ProgressParamsOverlay};
use crate::session::JobSession;
use crate::transport::Transport;
use crate::types::{Outcome, ProgressSnapshot};
use crate::values::RequestParams;

/// Name and version reported to the service by [`Client::validate_key`].
pub fn client_version() -> String {
    format!("Rust AKI.IO Client {}", env!("CARGO_PKG_VERSION"))
}

/// Answer of a unary discovery call.
///
/// `Failure` only occurs in record mode; in raise mode failures are returned
/// as [`AkiError`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<R> {
    Success(R),
    Failure(ErrorRecord),
}

impl<R> Reply<R> {
    pub fn success(self) -> Option<R> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Failure(record) => Some(record),
            Self::Success(_) => None,
        }
    }
}

/// A client bound to one endpoint.
#[derive(Clone)]
pub struct Client<T> {
    config: Arc<ClientConfig>,
    transport: T,
    cancellations: Arc<CancellationRegistry>,
    overlay: Arc<ProgressParamsOverlay>,
}

impl<T> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Client<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            cancellations: Arc::new(CancellationRegistry::new()),
            overlay: Arc::new(ProgressParamsOverlay::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// A fresh session for one request, for callers that need to adjust it
    /// (e.g. the poll interval) before running it.
    pub fn session(&self) -> JobSession<'_, T> {
        JobSession::new(&self.transport, &self.config, &self.cancellations, &self.overlay)
    }

    /// Submits `params` and drives the job to completion through `handlers`.
    pub async fn call(&self, params: RequestParams, handlers: Handlers) -> Result<Outcome, AkiError> {
        self.session().run(params, handlers).await
    }

    /// Submits `params` and returns the job's snapshots as a lazy stream.
    pub fn call_stream(
        &self,
        params: RequestParams,
    ) -> impl Stream<Item = Result<ProgressSnapshot, AkiError>> + '_ {
        self.session().stream(params)
    }

    /// Requests cancellation; it is sent with the next progress query of the
    /// job (or of whichever job polls next, for [`CancelTarget::All`]).
    pub fn cancel(&self, target: CancelTarget) {
        debug!(?target, "cancel requested");
        self.cancellations.request(target);
    }

    /// Queues extra parameters for the next progress query of `job_id`.
    pub fn append_progress_params(&self, job_id: &JobId, params: Map<String, Value>) {
        self.overlay.append(job_id, params);
    }

    /// Checks an API key with the service.
    ///
    /// The discovery calls use `api_key` when given and the configured key
    /// otherwise.
    pub async fn validate_key(&self, api_key: Option<&ApiKey>) -> Result<Reply<Value>, AkiError> {
        let query = vec![
            ("version".to_string(), client_version()),
            ("key".to_string(), self.key(api_key)),
        ];
        self.get_json("validate_key", &query, RequestKind::KeyValidation)
            .await
    }

    /// Lists the endpoints the key may use.
    pub async fn endpoint_list(&self, api_key: Option<&ApiKey>) -> Result<Reply<Vec<EndpointName>>, AkiError> {
        let query = vec![("key".to_string(), self.key(api_key))];
        let reply = self
            .get_json("endpoints", &query, RequestKind::EndpointList)
            .await?;
        Ok(match reply {
            Reply::Success(body) => Reply::Success(
                body.get("endpoints")
                    .and_then(Value::as_array)
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(Value::as_str)
                            .filter_map(EndpointName::new)
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            Reply::Failure(record) => Reply::Failure(record),
        })
    }

    /// Describes one endpoint: its workers, queue limits and parameters.
    pub async fn endpoint_details(
        &self,
        name: &EndpointName,
        api_key: Option<&ApiKey>,
    ) -> Result<Reply<Value>, AkiError> {
        let query = vec![("key".to_string(), self.key(api_key))];
        self.get_json(&format!("endpoints/{name}"), &query, RequestKind::EndpointDetails)
            .await
    }

    fn key(&self, api_key: Option<&ApiKey>) -> String {
        api_key
            .or(self.config.api_key.as_ref())
            .map(|k| k.as_str().to_string())
            .unwrap_or_default()
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
        request: RequestKind,
    ) -> Result<Reply<Value>, AkiError> {
        let classifier = ErrorClassifier::new(self.config.api_url(), self.config.propagation);
        let origin = match self.transport.get(path, query).await {
            Ok(response) if response.is_success() => match response.json() {
                Some(body) => return Ok(Reply::Success(body)),
                None => FailureOrigin::Response(response),
            },
            Ok(response) => FailureOrigin::Response(response),
            Err(err) => FailureOrigin::NoResponse(err),
        };
        warn!(%path, status = ?origin.status(), "discovery request failed");
        classifier.handle(origin, request).map(Reply::Failure)
    }
}
