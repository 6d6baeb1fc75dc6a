//! Cooperative cancellation for page loads and prefetches
//!
//! A load task receives a [`CancellationToken`] and checks it between the
//! steps that touch persistence. Navigating away cancels the token; the task
//! then returns without publishing anything into the cache.

use crate::priority::JobId;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

/// Shared cancellation flag
///
/// Clones observe the same flag.
///
/// # Example
///
/// ```
/// use inkpage_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_side = token.clone();
/// token.cancel();
/// assert!(worker_side.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel()` was called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Convenience for early returns inside tasks
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Marker error returned by [`CancellationToken::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Maps job ids to their tokens so jobs can be cancelled by id
/// whether they are still queued or already running.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create and store a fresh token for `job_id`
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens().insert(job_id, token.clone());
        token
    }

    /// Cancel one job. Returns `false` when the id is unknown.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.tokens().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel several jobs, returning how many were found
    pub fn cancel_many(&self, job_ids: &[JobId]) -> usize {
        let tokens = self.tokens();
        job_ids
            .iter()
            .filter_map(|id| tokens.get(id))
            .inspect(|token| token.cancel())
            .count()
    }

    /// Cancel every registered job
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Forget a job once it completed or left the queue
    pub fn unregister(&self, job_id: JobId) -> bool {
        self.tokens().remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: JobId) -> Option<CancellationToken> {
        self.tokens().get(&job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}
