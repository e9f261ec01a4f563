//! Job-lifecycle protocol for the AKI.IO compute service.
//!
//! This crate contains the client-visible lifecycle of a submitted job:
//! submission, progress polling with bounded retries, job-state
//! normalization, binary payload transcoding, cooperative cancellation and
//! error classification. The network is reached only through the
//! [`Transport`] port; `aki-client` supplies the HTTP implementation.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no socket I/O.
//! It defines *what* is exchanged with the service; infrastructure crates
//! define *how* it is carried.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`JobId`, `EndpointName`, `ApiKey`, `SessionId`) |
//! | [`values`] | Request parameters, result values, binary values and payloads |
//! | [`types`] | Job state, progress snapshots, outcomes |
//! | [`config`] | `ClientConfig`, poll policy, output and propagation modes |
//! | [`errors`] | Error records, the status classifier, error types |
//! | [`transcoder`] | Binary value <-> data-URI conversion, result-set conversion |
//! | [`transport`] | The `Transport` port and its raw response type |
//! | [`registry`] | Per-client cancellation flags and progress-params overlay |
//! | [`callbacks`] | Immediate/suspending handlers |
//! | [`dispatcher`] | One submission exchange |
//! | [`poller`] | One progress query (with retries) and snapshot normalization |
//! | [`session`] | The job state machine behind both execution surfaces |
//! | [`client`] | The `Client` facade and unary discovery calls |

pub mod callbacks;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod identifiers;
pub mod poller;
pub mod registry;
pub mod session;
pub mod transcoder;
pub mod transport;
pub mod types;
pub mod values;

#[cfg(test)]
mod testing;

// Re-export the common surface at the crate root.
pub use callbacks::{Handler, Handlers, ProgressHandler, ResultHandler};
pub use client::{client_version, Client, Reply};
pub use config::{
    ClientConfig, ErrorPropagation, OutputBinaryFormat, PollPolicy, DEFAULT_API_SERVER,
    DEFAULT_PROGRESS_INTERVAL,
};
pub use errors::{
    classify, AkiError, ErrorClassifier, ErrorKind, ErrorRecord, FailureOrigin, RequestKind,
    TranscodeError,
};
pub use identifiers::{ApiKey, EndpointName, JobId, SessionId};
pub use registry::{CancelTarget, CancellationRegistry, ProgressParamsOverlay};
pub use session::JobSession;
pub use transport::{RawResponse, Transport, TransportError};
pub use types::{JobState, Outcome, ProgressSnapshot, SnapshotData, Timestamp};
pub use values::{BinaryValue, MediaCategory, ParamValue, Payload, RequestParams, ResultMap, ResultValue};
