//! Per-client registries shared by concurrently running job sessions.
//!
//! Both registries are keyed by job id and hold write-once-consume-once
//! entries: a caller writes, and the next progress query for that job reads
//! and clears.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::identifiers::JobId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// What a cancel request applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CancelTarget {
    Job(JobId),
    /// The next progress query of whichever job polls first.
    All,
}

/// Pending cancel flags.
///
/// A flag takes effect on the next progress query for the job, which carries
/// `canceled: true` to the service. Nothing is terminated locally.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    pending: Mutex<HashSet<CancelTarget>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pending cancel. Repeating a request before it is consumed has
    /// no further effect.
    pub fn request(&self, target: CancelTarget) {
        lock(&self.pending).insert(target);
    }

    /// Consumes the pending flag for `job_id`, falling back to the `All` flag.
    /// At most one entry is consumed per call.
    pub fn take(&self, job_id: &JobId) -> bool {
        let mut pending = lock(&self.pending);
        pending.remove(&CancelTarget::Job(job_id.clone())) || pending.remove(&CancelTarget::All)
    }

    pub fn is_pending(&self, target: &CancelTarget) -> bool {
        lock(&self.pending).contains(target)
    }
}

// ---------------------------------------------------------------------------
// Progress parameter overlay
// ---------------------------------------------------------------------------

/// Extra parameters merged into the next progress query of a job.
#[derive(Debug, Default)]
pub struct ProgressParamsOverlay {
    pending: Mutex<HashMap<JobId, Vec<Map<String, Value>>>>,
}

impl ProgressParamsOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `params` for the next progress query of `job_id`.
    pub fn append(&self, job_id: &JobId, params: Map<String, Value>) {
        lock(&self.pending)
            .entry(job_id.clone())
            .or_default()
            .push(params);
    }

    /// Removes and merges everything queued for `job_id`, in append order;
    /// later keys override earlier ones.
    pub fn take(&self, job_id: &JobId) -> Map<String, Value> {
        let queued = lock(&self.pending).remove(job_id).unwrap_or_default();
        queued.into_iter().flatten().collect()
    }
}
