//! Thread-blocking surface.
//!
//! [`BlockingClient`] runs the same job state machine as the cooperative
//! client on a private current-thread runtime, so every call blocks the
//! calling thread until it completes. It must not be used from inside an
//! async runtime.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tokio::runtime::{Builder, Runtime};

use aki_protocol::{
    AkiError, ApiKey, CancelTarget, ClientConfig, EndpointName, Handlers, JobId, Outcome, ProgressHandler,
    ProgressSnapshot, Reply, RequestParams,
};

use crate::{connect, AkiClient};

/// A client whose calls block the current thread.
pub struct BlockingClient {
    runtime: Runtime,
    client: AkiClient,
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> Result<Self, AkiError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AkiError::configuration(format!("cannot start runtime: {e}")))?;
        Ok(Self {
            runtime,
            client: connect(config)?,
        })
    }

    /// The underlying cooperative client. Clones share its registries, so a
    /// clone moved to another thread can cancel jobs run here.
    pub fn client(&self) -> &AkiClient {
        &self.client
    }

    /// Submits `params` and blocks until the job is terminal.
    ///
    /// With a progress handler the job is polled and every non-canceled
    /// snapshot is delivered to it; without one the service is asked to block
    /// until the result is ready.
    pub fn call(&self, params: RequestParams, progress: Option<ProgressHandler>) -> Result<Outcome, AkiError> {
        let handlers = Handlers {
            progress,
            result: None,
        };
        self.runtime.block_on(self.client.call(params, handlers))
    }

    /// Submits `params` and returns an iterator over the job's snapshots.
    ///
    /// Each `next()` blocks until the next snapshot is available. Dropping
    /// the iterator stops polling without canceling the job.
    pub fn snapshots(&self, params: RequestParams) -> Snapshots<'_> {
        Snapshots {
            runtime: &self.runtime,
            stream: Box::pin(self.client.call_stream(params)),
        }
    }

    pub fn cancel(&self, target: CancelTarget) {
        self.client.cancel(target);
    }

    pub fn append_progress_params(&self, job_id: &JobId, params: Map<String, Value>) {
        self.client.append_progress_params(job_id, params);
    }

    pub fn validate_key(&self, api_key: Option<&ApiKey>) -> Result<Reply<Value>, AkiError> {
        self.runtime.block_on(self.client.validate_key(api_key))
    }

    pub fn endpoint_list(&self, api_key: Option<&ApiKey>) -> Result<Reply<Vec<EndpointName>>, AkiError> {
        self.runtime.block_on(self.client.endpoint_list(api_key))
    }

    pub fn endpoint_details(
        &self,
        name: &EndpointName,
        api_key: Option<&ApiKey>,
    ) -> Result<Reply<Value>, AkiError> {
        self.runtime.block_on(self.client.endpoint_details(name, api_key))
    }
}

type SnapshotStream<'a> = Pin<Box<dyn Stream<Item = Result<ProgressSnapshot, AkiError>> + 'a>>;

/// Blocking iterator over the snapshots of one job.
pub struct Snapshots<'a> {
    runtime: &'a Runtime,
    stream: SnapshotStream<'a>,
}

impl Iterator for Snapshots<'_> {
    type Item = Result<ProgressSnapshot, AkiError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}
