//! Progress queries and snapshot normalization.
//!
//! [`ProgressPoller::poll_once`] performs one logical progress query, which
//! may take several transport attempts. [`normalize`] and [`is_final`] are pure
//! and turn the raw status body into the stable [`ProgressSnapshot`] shape.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::{ClientConfig, OutputBinaryFormat};
use crate::dispatcher::KEY_FIELD;
use crate::errors::{AkiError, ErrorClassifier, ErrorRecord, FailureOrigin, RequestKind, DEFAULT_ERROR_CODE};
use crate::identifiers::JobId;
use crate::registry::{CancellationRegistry, ProgressParamsOverlay};
use crate::transcoder::convert_result;
use crate::transport::Transport;
use crate::types::{JobState, ProgressSnapshot, SnapshotData, Timestamp, UNKNOWN};
use crate::values::{Payload, ResultValue};

/// Request field carrying the pending cancel flag.
pub const CANCELED_FIELD: &str = "canceled";

// ---------------------------------------------------------------------------
// Raw status
// ---------------------------------------------------------------------------

/// An unprocessed `progress/{endpoint}` reply body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatus(Map<String, Value>);

impl RawStatus {
    pub fn new(body: Map<String, Value>) -> Self {
        Self(body)
    }

    pub fn success(&self) -> bool {
        self.0.get("success").and_then(Value::as_bool).unwrap_or(false)
    }

    /// The `job_state` string as sent by the service.
    pub fn job_state(&self) -> Option<&str> {
        self.0.get("job_state").and_then(Value::as_str)
    }

    /// The parsed state, or `None` when absent or not recognized.
    pub fn state(&self) -> Option<JobState> {
        self.job_state().and_then(JobState::from_wire)
    }

    /// The in-flight `progress` block, if it is an object.
    pub fn progress_block(&self) -> Option<&Map<String, Value>> {
        self.0.get("progress").and_then(Value::as_object)
    }

    /// `true` when the reply carries a non-empty `progress` block.
    pub fn has_progress_block(&self) -> bool {
        match self.0.get("progress") {
            None | Some(Value::Null) => false,
            Some(Value::Object(block)) => !block.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(_)) => true,
        }
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_body(self) -> Map<String, Value> {
        self.0
    }
}

/// The result of one logical progress query.
#[derive(Debug, Clone, PartialEq)]
pub enum PollReply {
    Status(RawStatus),
    /// Every attempt failed; carries the record of the last failure.
    Exhausted(ErrorRecord),
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Issues progress queries for the jobs of one client.
pub struct ProgressPoller<'a, T: ?Sized> {
    transport: &'a T,
    config: &'a ClientConfig,
    cancellations: &'a CancellationRegistry,
    overlay: &'a ProgressParamsOverlay,
}

impl<'a, T: Transport + ?Sized> ProgressPoller<'a, T> {
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
        }
    }

    /// Queries the status of `job_id`.
    ///
    /// A transport failure, a non-200 status or a non-JSON body counts as a
    /// failed attempt. Failed attempts are retried up to
    /// `poll.retry_attempts` times with `poll.retry_pause` between them.
    /// Each attempt consumes the pending cancel flag for the job. Queued
    /// progress params are consumed once and sent with every attempt.
    pub async fn poll_once(&self, job_id: &JobId) -> Result<PollReply, AkiError> {
        let path = format!("progress/{}", self.config.endpoint);
        let extra = self.overlay.take(job_id);
        let max_attempts = self.config.poll.max_attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let body = self.query_body(job_id, &extra);
            let failure = match self.transport.post_json(&path, &body).await {
                Ok(response) if response.is_success() => match response.json() {
                    Some(Value::Object(status)) => {
                        debug!(%job_id, attempt, "progress received");
                        return Ok(PollReply::Status(RawStatus::new(status)));
                    }
                    _ => FailureOrigin::Response(response),
                },
                Ok(response) => FailureOrigin::Response(response),
                Err(err) => FailureOrigin::NoResponse(err),
            };

            if attempt >= max_attempts {
                error!(%job_id, attempts = attempt, "progress query failed, giving up");
                let classifier = ErrorClassifier::new(self.config.api_url(), self.config.propagation);
                return classifier
                    .handle(failure, RequestKind::Progress)
                    .map(PollReply::Exhausted);
            }
            warn!(
                %job_id,
                attempt,
                max_attempts,
                status = ?failure.status(),
                "progress query failed, retrying"
            );
            tokio::time::sleep(self.config.poll.retry_pause).await;
        }
    }

    fn query_body(&self, job_id: &JobId, extra: &Map<String, Value>) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(
            KEY_FIELD.to_string(),
            self.config
                .api_key
                .as_ref()
                .map_or(Value::Null, |k| Value::String(k.as_str().to_string())),
        );
        body.insert("job_id".to_string(), Value::String(job_id.as_str().to_string()));
        body.extend(extra.clone());
        body.insert(
            CANCELED_FIELD.to_string(),
            Value::Bool(self.cancellations.take(job_id)),
        );
        body
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// `true` when `status` ends the poll loop: the service reported a failure,
/// or the job reached a terminal state and no progress block is left.
pub fn is_final(status: &RawStatus) -> bool {
    if !status.success() {
        return true;
    }
    status.state().is_some_and(JobState::is_terminal) && !status.has_progress_block()
}

/// Turns a raw status into a snapshot.
///
/// A failure body becomes [`SnapshotData::Failure`] with the body's fields
/// kept. A `done`/`canceled` status without a progress block carries the job
/// result tagged with `job_id` (and `job_state` when canceled) at 100%.
/// Anything else is a mid-flight update copied from the progress block.
/// Progress clamping across snapshots is the session's job.
pub fn normalize(job_id: &JobId, status: &RawStatus, mode: OutputBinaryFormat) -> ProgressSnapshot {
    if !status.success() {
        let record = ErrorRecord::from_body(status.body().clone(), DEFAULT_ERROR_CODE);
        return ProgressSnapshot::failed(Some(job_id.clone()), 0, record);
    }

    let state = match status.state() {
        Some(state) => state,
        None => {
            warn!(%job_id, job_state = ?status.job_state(), "unrecognized job state, treating as processing");
            JobState::Processing
        }
    };

    if matches!(state, JobState::Done | JobState::Canceled) && !status.has_progress_block() {
        let job_result = status.body().get("job_result").cloned().unwrap_or(Value::Null);
        let mut payload = convert_result(job_result, mode);
        if state == JobState::Canceled {
            payload.tag("job_state", ResultValue::from(state.as_str()));
        }
        payload.tag("job_id", ResultValue::from(job_id.as_str()));
        return ProgressSnapshot {
            job_id: Some(job_id.clone()),
            state,
            progress: 100,
            queue_position: UNKNOWN,
            estimate: UNKNOWN as f64,
            observed_at: Timestamp::now(),
            data: SnapshotData::Result(payload),
        };
    }

    let block = status.progress_block();
    let field = |name: &str| block.and_then(|b| b.get(name));
    let progress = field("progress")
        .and_then(Value::as_f64)
        .map_or(0, |p| p.clamp(0.0, 100.0) as u8);
    let queue_position = field("queue_position")
        .and_then(Value::as_i64)
        .unwrap_or(UNKNOWN);
    let estimate = field("estimate")
        .and_then(Value::as_f64)
        .unwrap_or(UNKNOWN as f64);
    let payload = field("progress_data")
        .cloned()
        .map_or(Payload::Empty, |data| convert_result(data, mode));

    let data = if is_final(status) {
        SnapshotData::Result(payload)
    } else {
        SnapshotData::Progress(payload)
    };
    ProgressSnapshot {
        job_id: Some(job_id.clone()),
        state,
        progress,
        queue_position,
        estimate,
        observed_at: Timestamp::now(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorPropagation;
    use crate::errors::ErrorKind;
    use crate::registry::CancelTarget;
    use crate::testing::{done, processing, test_config, ScriptedTransport};
    use crate::values::ResultValue;
    use serde_json::json;

    fn status(value: Value) -> RawStatus {
        RawStatus::new(value.as_object().cloned().unwrap())
    }

    fn job() -> JobId {
        JobId::new("J1").unwrap()
    }

    struct Registries {
        cancellations: CancellationRegistry,
        overlay: ProgressParamsOverlay,
    }

    impl Registries {
        fn new() -> Self {
            Self {
                cancellations: CancellationRegistry::new(),
                overlay: ProgressParamsOverlay::new(),
            }
        }

        fn poller<'a>(&'a self, transport: &'a ScriptedTransport, config: &'a ClientConfig) -> ProgressPoller<'a, ScriptedTransport> {
            ProgressPoller::new(transport, config, &self.cancellations, &self.overlay)
        }
    }

    #[tokio::test]
    async fn test_four_failures_make_exactly_four_attempts() {
        let transport = ScriptedTransport::new()
            .fail("reset")
            .fail("reset")
            .fail("reset")
            .fail("reset")
            .reply(200, done(json!({})));
        let config = test_config().with_propagation(ErrorPropagation::Raise);
        let registries = Registries::new();

        let err = registries
            .poller(&transport, &config)
            .poll_once(&job())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::BrokenPipe));
        assert_eq!(transport.requests_to("progress/E").len(), 4);
    }

    #[tokio::test]
    async fn test_three_failures_then_success_returns_status() {
        let transport = ScriptedTransport::new()
            .fail("reset")
            .reply(503, json!({"error": "busy"}))
            .reply_text(200, "not json")
            .reply(200, processing(40, 1, 12.0, json!({"text": "partial"})));
        let config = test_config();
        let registries = Registries::new();

        let reply = registries
            .poller(&transport, &config)
            .poll_once(&job())
            .await
            .unwrap();

        let PollReply::Status(raw) = reply else {
            panic!("expected status, got {reply:?}");
        };
        assert_eq!(raw.job_state(), Some("processing"));
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_exhausted_in_record_mode_returns_last_failure() {
        let transport = ScriptedTransport::new()
            .fail("reset")
            .fail("reset")
            .fail("reset")
            .reply(502, json!({"error": "gateway down"}));
        let config = test_config();
        let registries = Registries::new();

        let reply = registries
            .poller(&transport, &config)
            .poll_once(&job())
            .await
            .unwrap();
        let PollReply::Exhausted(record) = reply else {
            panic!("expected exhaustion");
        };
        assert_eq!(record.error_code, 502);
        assert_eq!(record.error, "gateway down");
    }

    #[tokio::test]
    async fn test_query_carries_key_job_and_cancel_flag() {
        let transport = ScriptedTransport::new()
            .fail("reset")
            .reply(200, processing(10, 0, 1.0, json!({})));
        let config = test_config();
        let registries = Registries::new();
        registries.cancellations.request(CancelTarget::Job(job()));
        registries
            .overlay
            .append(&job(), json!({"prompt_input": "more"}).as_object().cloned().unwrap());

        registries
            .poller(&transport, &config)
            .poll_once(&job())
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].body["key"], json!("test-key"));
        assert_eq!(sent[0].body["job_id"], json!("J1"));
        assert_eq!(sent[0].body[CANCELED_FIELD], json!(true));
        assert_eq!(sent[0].body["prompt_input"], json!("more"));
        // Cancel is consumed by the first attempt; the overlay is resent.
        assert_eq!(sent[1].body[CANCELED_FIELD], json!(false));
        assert_eq!(sent[1].body["prompt_input"], json!("more"));
        assert!(registries.overlay.take(&job()).is_empty());
    }

    #[test]
    fn test_normalize_processing() {
        let raw = status(processing(40, 1, 12.0, json!({"text": "partial"})));
        let snapshot = normalize(&job(), &raw, OutputBinaryFormat::Encoded);

        assert_eq!(snapshot.job_id, Some(job()));
        assert_eq!(snapshot.state, JobState::Processing);
        assert_eq!(snapshot.progress, 40);
        assert_eq!(snapshot.queue_position, 1);
        assert_eq!(snapshot.estimate, 12.0);
        let SnapshotData::Progress(payload) = &snapshot.data else {
            panic!("expected progress data");
        };
        assert_eq!(payload.get("text").and_then(ResultValue::as_str), Some("partial"));
        assert!(!is_final(&raw));
    }

    #[test]
    fn test_normalize_done_uses_job_result_at_full_progress() {
        let raw = status(done(json!({"text": "final", "num_generated_tokens": 10})));
        let snapshot = normalize(&job(), &raw, OutputBinaryFormat::Encoded);

        assert_eq!(snapshot.state, JobState::Done);
        assert_eq!(snapshot.progress, 100);
        let SnapshotData::Result(payload) = &snapshot.data else {
            panic!("expected result data");
        };
        assert_eq!(payload.get("text").and_then(ResultValue::as_str), Some("final"));
        assert_eq!(payload.get("num_generated_tokens").and_then(ResultValue::as_i64), Some(10));
        assert_eq!(payload.get("job_id").and_then(ResultValue::as_str), Some("J1"));
        assert!(payload.get("job_state").is_none());
        assert!(is_final(&raw));
    }

    #[test]
    fn test_normalize_canceled_tags_state() {
        let raw = status(json!({"success": true, "job_state": "canceled", "progress": {}}));
        let snapshot = normalize(&job(), &raw, OutputBinaryFormat::Encoded);

        assert_eq!(snapshot.state, JobState::Canceled);
        assert_eq!(snapshot.progress, 100);
        let payload = snapshot.payload().unwrap();
        assert_eq!(payload.get("job_state").and_then(ResultValue::as_str), Some("canceled"));
        assert!(is_final(&raw));
    }

    #[test]
    fn test_done_with_progress_block_is_not_final() {
        let raw = status(json!({
            "success": true,
            "job_state": "done",
            "progress": {"progress": 100, "progress_data": {"text": "last chunk"}},
        }));
        assert!(!is_final(&raw));
        let snapshot = normalize(&job(), &raw, OutputBinaryFormat::Encoded);
        assert!(matches!(snapshot.data, SnapshotData::Progress(_)));
    }

    #[test]
    fn test_lapsed_without_block_is_final_result() {
        let raw = status(json!({"success": true, "job_state": "lapsed"}));
        assert!(is_final(&raw));
        let snapshot = normalize(&job(), &raw, OutputBinaryFormat::Encoded);
        assert_eq!(snapshot.state, JobState::Lapsed);
        assert!(matches!(snapshot.data, SnapshotData::Result(Payload::Empty)));
    }

    #[test]
    fn test_failure_body_passes_through() {
        let raw = status(json!({"success": false, "error": "job vanished", "error_code": 410, "hint": "retry"}));
        assert!(is_final(&raw));
        let snapshot = normalize(&job(), &raw, OutputBinaryFormat::Encoded);
        let SnapshotData::Failure(record) = &snapshot.data else {
            panic!("expected failure");
        };
        assert_eq!(record.error, "job vanished");
        assert_eq!(record.error_code, 410);
        assert_eq!(record.details["hint"], json!("retry"));
    }

    #[test]
    fn test_unknown_state_is_processing() {
        let raw = status(json!({"success": true, "job_state": "warming_up", "progress": {"progress": 5}}));
        assert!(!is_final(&raw));
        assert_eq!(
            normalize(&job(), &raw, OutputBinaryFormat::Encoded).state,
            JobState::Processing
        );
    }

    #[test]
    fn test_raw_bytes_mode_decodes_progress_images() {
        let image = crate::transcoder::encode(b"\x89PNG", "png", None);
        let raw = status(processing(50, 0, 3.0, json!({"images": [image]})));
        let snapshot = normalize(&job(), &raw, OutputBinaryFormat::RawBytes);

        let Some(ResultValue::List(images)) = snapshot.payload().unwrap().get("images") else {
            panic!("expected image list");
        };
        let binary = images[0].as_binary().unwrap();
        assert_eq!(binary.format, "png");
        assert_eq!(binary.bytes, b"\x89PNG");
    }
}
