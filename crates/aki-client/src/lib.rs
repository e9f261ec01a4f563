//! HTTP client for the AKI.IO compute service.
//!
//! Implements the [`aki_protocol::Transport`] port over reqwest and exposes
//! both execution surfaces of the job protocol:
//!
//! - cooperative: [`AkiClient`] (`call`, `call_stream`), many jobs multiplexed
//!   on one async runtime;
//! - blocking: [`BlockingClient`], for callers without a runtime.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport and environment handling lives here.
//! Job semantics live in [`aki_protocol`].
//!
//! ## Example
//!
//! ```no_run
//! use aki_client::{connect, load_config_from_env, Handler, Handlers, RequestParams};
//!
//! # async fn run() -> Result<(), aki_client::AkiError> {
//! let client = connect(load_config_from_env("llama3_chat")?)?;
//! let params = RequestParams::new().with("prompt_input", "Tell me a joke");
//! let handlers = Handlers::new()
//!     .on_progress(Handler::immediate(|s: aki_client::ProgressSnapshot| println!("{}%", s.progress)));
//! let outcome = client.call(params, handlers).await?;
//! println!("{:?}", outcome.payload());
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod config;
pub mod transport;

pub use aki_protocol::{
    AkiError, ApiKey, BinaryValue, CancelTarget, ClientConfig, EndpointName, ErrorKind,
    ErrorPropagation, ErrorRecord, Handler, Handlers, JobId, JobState, OutputBinaryFormat, Outcome,
    Payload, PollPolicy, ProgressHandler, ProgressSnapshot, Reply, RequestParams, ResultHandler,
    ResultValue, SnapshotData,
};
pub use blocking::{BlockingClient, Snapshots};
pub use config::{config_from_lookup, load_config_from_env};
pub use transport::HttpTransport;

/// The cooperative client over HTTP.
pub type AkiClient = aki_protocol::Client<HttpTransport>;

/// Builds a cooperative client for `config`.
pub fn connect(config: ClientConfig) -> Result<AkiClient, AkiError> {
    let transport = HttpTransport::new(&config)?;
    Ok(AkiClient::new(config, transport))
}

fn one_shot_config(endpoint: &str, api_key: &str) -> Result<ClientConfig, AkiError> {
    let api_key = ApiKey::new(api_key).ok_or_else(|| AkiError::configuration("API key must not be empty"))?;
    Ok(load_config_from_env(endpoint)?.with_api_key(api_key))
}

/// Runs a single request with `api_key`.
///
/// The server and binary format are read from the environment as in
/// [`load_config_from_env`]; unset, the default server is used.
pub async fn request(
    endpoint: &str,
    api_key: &str,
    params: RequestParams,
    handlers: Handlers,
) -> Result<Outcome, AkiError> {
    connect(one_shot_config(endpoint, api_key)?)?
        .call(params, handlers)
        .await
}

/// Blocking form of [`request`].
pub fn request_blocking(
    endpoint: &str,
    api_key: &str,
    params: RequestParams,
    progress: Option<ProgressHandler>,
) -> Result<Outcome, AkiError> {
    BlockingClient::new(one_shot_config(endpoint, api_key)?)?.call(params, progress)
}
