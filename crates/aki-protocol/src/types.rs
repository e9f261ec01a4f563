//! Job state, snapshots and outcomes.
//!
//! A [`ProgressSnapshot`] is one normalized observation of a job; an
//! [`Outcome`] is what a job session finally hands to its caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ErrorRecord;
use crate::identifiers::JobId;
use crate::values::Payload;

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle state of a job as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Submitted; the service has not yet acknowledged a job id.
    Submitted,
    /// Acknowledged with a job id; no progress observed yet.
    Started,
    Processing,
    Done,
    Canceled,
    /// Ended without success or cancellation (e.g. expired in the queue).
    Lapsed,
    /// Client-side failure: the service reported an error or the progress
    /// channel broke.
    Failed,
}

impl JobState {
    /// Parses the service's `job_state` string.
    pub fn from_wire(state: &str) -> Option<Self> {
        match state {
            "submitted" => Some(Self::Submitted),
            "started" => Some(Self::Started),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "canceled" | "cancelled" => Some(Self::Canceled),
            "lapsed" => Some(Self::Lapsed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Started => "started",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Canceled => "canceled",
            Self::Lapsed => "lapsed",
            Self::Failed => "failed",
        }
    }

    /// `true` for states that can end a job.
    ///
    /// The service may still report `done` or `canceled` alongside a progress
    /// block; such a status is mid-flight. Use [`ProgressSnapshot::is_terminal`]
    /// to tell whether a snapshot is the last one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled | Self::Lapsed | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Unknown queue position or time estimate.
pub const UNKNOWN: i64 = -1;

/// What a snapshot carries. Partial output and final result are mutually
/// exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotData {
    /// Partial output of a job still in flight.
    Progress(Payload),
    /// Final result of a finished job.
    Result(Payload),
    /// The service reported a failure, or the progress channel broke.
    Failure(ErrorRecord),
}

impl SnapshotData {
    /// The carried payload, `None` for failures.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Progress(p) | Self::Result(p) => Some(p),
            Self::Failure(_) => None,
        }
    }
}

/// One normalized status observation of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// `None` only when the submission failed before a job id was assigned.
    pub job_id: Option<JobId>,
    pub state: JobState,
    /// Percent complete, 0–100. Non-decreasing for one job.
    pub progress: u8,
    /// Position in the service queue, [`UNKNOWN`] if not reported.
    pub queue_position: i64,
    /// Estimated seconds remaining, `-1.0` if not reported.
    pub estimate: f64,
    pub observed_at: Timestamp,
    pub data: SnapshotData,
}

impl ProgressSnapshot {
    /// The synthetic first snapshot of every deferred job.
    pub fn started(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            state: JobState::Started,
            progress: 0,
            queue_position: UNKNOWN,
            estimate: UNKNOWN as f64,
            observed_at: Timestamp::now(),
            data: SnapshotData::Progress(Payload::Empty),
        }
    }

    /// A terminal snapshot for a job that completed within its submission.
    pub fn completed(job_id: Option<JobId>, payload: Payload) -> Self {
        Self {
            job_id,
            state: JobState::Done,
            progress: 100,
            queue_position: UNKNOWN,
            estimate: UNKNOWN as f64,
            observed_at: Timestamp::now(),
            data: SnapshotData::Result(payload),
        }
    }

    /// A terminal failure snapshot.
    pub fn failed(job_id: Option<JobId>, progress: u8, record: ErrorRecord) -> Self {
        Self {
            job_id,
            state: JobState::Failed,
            progress,
            queue_position: UNKNOWN,
            estimate: UNKNOWN as f64,
            observed_at: Timestamp::now(),
            data: SnapshotData::Failure(record),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.data.payload()
    }

    /// `true` for the last snapshot of a job: a final result or a failure.
    pub fn is_terminal(&self) -> bool {
        matches!(self.data, SnapshotData::Result(_) | SnapshotData::Failure(_))
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The terminal delivery of a job session.
///
/// Handed to the result handler and returned by blocking calls. Failures are
/// shaped as an [`ErrorRecord`] in both propagation modes.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished {
        job_id: Option<JobId>,
        state: JobState,
        payload: Payload,
    },
    Failed(ErrorRecord),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Finished { payload, .. } => Some(payload),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Failed(record) => Some(record),
            Self::Finished { .. } => None,
        }
    }
}

impl From<ProgressSnapshot> for Outcome {
    fn from(snapshot: ProgressSnapshot) -> Self {
        match snapshot.data {
            SnapshotData::Progress(payload) | SnapshotData::Result(payload) => Self::Finished {
                job_id: snapshot.job_id,
                state: snapshot.state,
                payload,
            },
            SnapshotData::Failure(record) => Self::Failed(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        for state in [JobState::Done, JobState::Canceled, JobState::Lapsed, JobState::Failed] {
            assert!(state.is_terminal(), "{state}");
        }
        for state in [JobState::Submitted, JobState::Started, JobState::Processing] {
            assert!(!state.is_terminal(), "{state}");
        }
    }

    #[test]
    fn test_job_state_wire_names() {
        assert_eq!(JobState::from_wire("processing"), Some(JobState::Processing));
        assert_eq!(JobState::from_wire("cancelled"), Some(JobState::Canceled));
        assert_eq!(JobState::from_wire("exploded"), None);
        assert_eq!(
            serde_json::to_string(&JobState::Lapsed).unwrap(),
            "\"lapsed\""
        );
    }

    #[test]
    fn test_started_snapshot_shape() {
        let snapshot = ProgressSnapshot::started(JobId::new("J1").unwrap());
        assert_eq!(snapshot.job_id.as_ref().map(JobId::as_str), Some("J1"));
        assert_eq!(snapshot.state, JobState::Started);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.queue_position, -1);
        assert_eq!(snapshot.estimate, -1.0);
    }

    #[test]
    fn test_done_state_with_partial_output_is_not_terminal() {
        let mid_flight = ProgressSnapshot {
            state: JobState::Done,
            data: SnapshotData::Progress(Payload::Empty),
            ..ProgressSnapshot::started(JobId::new("J1").unwrap())
        };
        assert!(!mid_flight.is_terminal());
        assert!(!ProgressSnapshot::started(JobId::new("J1").unwrap()).is_terminal());
        assert!(ProgressSnapshot::completed(None, Payload::Empty).is_terminal());
        assert!(ProgressSnapshot::failed(None, 0, ErrorRecord::new("x", 500)).is_terminal());
    }

    #[test]
    fn test_outcome_from_failure_snapshot() {
        let record = ErrorRecord::new("boom", 503);
        let outcome = Outcome::from(ProgressSnapshot::failed(None, 40, record.clone()));
        assert_eq!(outcome.error(), Some(&record));
        assert!(!outcome.is_success());
    }
}
