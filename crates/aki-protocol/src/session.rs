//! The job lifecycle state machine.
//!
//! A [`JobSession`] drives one request from submission to its terminal
//! outcome: `Dispatching -> {Immediate | Polling} -> Terminal`. Two surfaces
//! share the machine:
//!
//! - [`JobSession::run`] delivers snapshots to [`Handlers`] and returns the
//!   terminal [`Outcome`].
//! - [`JobSession::stream`] yields snapshots lazily; dropping the stream stops
//!   polling but does not cancel the job.
//!
//! Canceled snapshots are never delivered to a progress handler. The stream
//! skips canceled snapshots as well, including the terminal one.

use std::time::Duration;

use futures::Stream;
use serde_json::Value;
use tracing::{debug, info, info_span, Instrument, Span};

use crate::callbacks::Handlers;
use crate::config::ClientConfig;
use crate::dispatcher::{RequestDispatcher, Submission};
use crate::errors::AkiError;
use crate::identifiers::{JobId, SessionId};
use crate::poller::{is_final, normalize, PollReply, ProgressPoller};
use crate::registry::{CancellationRegistry, ProgressParamsOverlay};
use crate::transcoder::convert_result;
use crate::transport::Transport;
use crate::types::{JobState, Outcome, ProgressSnapshot, SnapshotData};
use crate::values::RequestParams;

/// Keeps the progress of one job non-decreasing and remembers its last state.
#[derive(Debug)]
struct ProgressTracker {
    progress: u8,
    state: JobState,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            progress: 0,
            state: JobState::Started,
        }
    }
}

impl ProgressTracker {
    fn observe(&mut self, mut snapshot: ProgressSnapshot) -> ProgressSnapshot {
        let terminal = snapshot.is_terminal();
        match &mut snapshot.data {
            SnapshotData::Failure(record) => {
                if record.job_state.is_none() {
                    record.job_state = Some(self.state);
                }
                snapshot.progress = self.progress;
            }
            _ if terminal => snapshot.progress = 100,
            _ => snapshot.progress = snapshot.progress.max(self.progress),
        }
        self.progress = snapshot.progress;
        if snapshot.state != JobState::Failed {
            self.state = snapshot.state;
        }
        snapshot
    }
}

/// One submitted request and the polling that follows it.
pub struct JobSession<'a, T: ?Sized> {
    transport: &'a T,
    config: &'a ClientConfig,
    cancellations: &'a CancellationRegistry,
    overlay: &'a ProgressParamsOverlay,
    session_id: SessionId,
    interval: Duration,
}

impl<'a, T: Transport + ?Sized> JobSession<'a, T> {
    pub fn new(
        transport: &'a T,
        config: &'a ClientConfig,
        cancellations: &'a CancellationRegistry,
        overlay: &'a ProgressParamsOverlay,
    ) -> Self {
        Self {
            transport,
            config,
            cancellations,
            overlay,
            session_id: SessionId::new_random(),
            interval: config.poll.interval,
        }
    }

    /// Overrides the pause between successful progress queries.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Runs the request to completion, delivering to `handlers`.
    ///
    /// Without a progress handler the service is asked to block until the
    /// result is ready and no polling happens. The result handler always
    /// receives the terminal [`Outcome`]; in raise mode a failure is then
    /// also returned as the classified error.
    pub async fn run(&self, params: RequestParams, mut handlers: Handlers) -> Result<Outcome, AkiError> {
        let span = self.span();
        self.drive(params, &mut handlers).instrument(span).await
    }

    /// Yields every delivered snapshot, the terminal one last.
    ///
    /// The first item of a deferred job is the synthetic `started` snapshot.
    /// In raise mode a failure ends the stream with an `Err` item.
    ///
    /// Canceled snapshots are never yielded. A job that ends `canceled`
    /// therefore ends the stream without a terminal item: the last item is
    /// the last progress snapshot seen before the cancellation took effect.
    pub fn stream(self, params: RequestParams) -> impl Stream<Item = Result<ProgressSnapshot, AkiError>> + 'a
    where
        T: 'a,
    {
        let span = self.span();
        async_stream::stream! {
            let submitted = self
                .dispatcher()
                .submit(params, false)
                .instrument(span.clone())
                .await;
            match submitted {
                Err(err) => {
                    yield Err(err);
                }
                Ok(Submission::Rejected(record)) => {
                    yield Ok(ProgressSnapshot::failed(None, 0, record));
                }
                Ok(Submission::Completed(body)) => {
                    yield Ok(self.immediate_snapshot(body));
                }
                Ok(Submission::Accepted { job_id }) => {
                    span.record("job_id", job_id.as_str());
                    span.in_scope(|| info!("job accepted"));
                    yield Ok(ProgressSnapshot::started(job_id.clone()));

                    let poller = self.poller();
                    let mut tracker = ProgressTracker::default();
                    loop {
                        let step = self
                            .advance(&poller, &job_id, &mut tracker)
                            .instrument(span.clone())
                            .await;
                        match step {
                            Err(err) => {
                                yield Err(err);
                                break;
                            }
                            Ok((snapshot, last)) => {
                                if snapshot.state != JobState::Canceled {
                                    yield Ok(snapshot);
                                }
                                if last {
                                    break;
                                }
                            }
                        }
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }
    }

    async fn drive(&self, params: RequestParams, handlers: &mut Handlers) -> Result<Outcome, AkiError> {
        let wait_for_result = handlers.progress.is_none();
        let submission = match self.dispatcher().submit(params, wait_for_result).await {
            Ok(submission) => submission,
            Err(err) => return fail(handlers, err).await,
        };

        let job_id = match submission {
            Submission::Rejected(record) => return finish(handlers, Outcome::Failed(record)).await,
            Submission::Completed(body) => {
                let outcome = Outcome::from(self.immediate_snapshot(body));
                return finish(handlers, outcome).await;
            }
            Submission::Accepted { job_id } => job_id,
        };

        Span::current().record("job_id", job_id.as_str());
        info!("job accepted");
        handlers.progress(ProgressSnapshot::started(job_id.clone())).await;

        let poller = self.poller();
        let mut tracker = ProgressTracker::default();
        loop {
            let (snapshot, last) = match self.advance(&poller, &job_id, &mut tracker).await {
                Ok(step) => step,
                Err(err) => return fail(handlers, err).await,
            };
            if last {
                return finish(handlers, Outcome::from(snapshot)).await;
            }
            if snapshot.state != JobState::Canceled {
                handlers.progress(snapshot).await;
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Polls once and returns the normalized snapshot and whether it ends the job.
    async fn advance(
        &self,
        poller: &ProgressPoller<'_, T>,
        job_id: &JobId,
        tracker: &mut ProgressTracker,
    ) -> Result<(ProgressSnapshot, bool), AkiError> {
        let status = match poller.poll_once(job_id).await {
            Ok(PollReply::Status(status)) => status,
            Ok(PollReply::Exhausted(record)) => {
                let snapshot = ProgressSnapshot::failed(Some(job_id.clone()), 0, record);
                return Ok((tracker.observe(snapshot), true));
            }
            Err(err) => return Err(err.with_job_state(tracker.state)),
        };

        let last = is_final(&status);
        let snapshot = tracker.observe(normalize(job_id, &status, self.config.output_binary_format));
        if last {
            info!(state = %snapshot.state, "job finished");
        } else {
            debug!(
                state = %snapshot.state,
                progress = snapshot.progress,
                queue_position = snapshot.queue_position,
                "progress snapshot"
            );
        }
        Ok((snapshot, last))
    }

    fn immediate_snapshot(&self, body: Value) -> ProgressSnapshot {
        let job_id = body.get("job_id").and_then(Value::as_str).and_then(JobId::new);
        let payload = convert_result(body, self.config.output_binary_format);
        ProgressSnapshot::completed(job_id, payload)
    }

    fn dispatcher(&self) -> RequestDispatcher<'a, T> {
        RequestDispatcher::new(self.transport, self.config)
    }

    fn poller(&self) -> ProgressPoller<'a, T> {
        ProgressPoller::new(self.transport, self.config, self.cancellations, self.overlay)
    }

    fn span(&self) -> Span {
        info_span!(
            "job_session",
            endpoint = %self.config.endpoint,
            session_id = %self.session_id,
            job_id = tracing::field::Empty,
        )
    }
}

async fn finish(handlers: &mut Handlers, outcome: Outcome) -> Result<Outcome, AkiError> {
    handlers.result(outcome.clone()).await;
    Ok(outcome)
}

async fn fail(handlers: &mut Handlers, err: AkiError) -> Result<Outcome, AkiError> {
    handlers.result(Outcome::Failed(err.to_record())).await;
    Err(err)
}
