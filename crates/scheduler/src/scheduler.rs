//! Job scheduler
//!
//! Couples the priority queue with the cancellation registry and keeps
//! counters, which also let callers wait for quiescence.

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::priority::{Job, JobId, JobInfo, JobPriority, JobType, PriorityQueue};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,
    pub queue_size: usize,
    pub running: usize,
}

impl SchedulerStats {
    /// Jobs that were submitted but neither completed nor cancelled
    pub fn pending_jobs(&self) -> u64 {
        self.jobs_submitted - self.jobs_completed - self.jobs_cancelled
    }
}

#[derive(Default)]
struct SchedulerState {
    stats: SchedulerStats,
    running: usize,
}

/// Thread-safe job scheduler
///
/// # Example
///
/// ```
/// use inkpage_scheduler::{JobPriority, JobScheduler, JobType};
/// use uuid::Uuid;
///
/// let scheduler = JobScheduler::new();
/// let page_id = Uuid::new_v4();
/// let (job_id, _token) = scheduler.submit(
///     JobPriority::Load,
///     JobType::LoadPage { page_id },
///     |token| {
///         if token.is_cancelled() {
///             return;
///         }
///         // fetch the page ...
///     },
/// );
///
/// if let Some(job) = scheduler.next_job() {
///     assert_eq!(job.id, job_id);
///     let token = scheduler.get_cancellation_token(job.id).unwrap_or_default();
///     job.run(&token);
///     scheduler.complete_job(job_id);
/// }
/// ```
pub struct JobScheduler {
    queue: PriorityQueue,
    state: Mutex<SchedulerState>,
    idle: Condvar,
    cancellation: CancellationRegistry,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            state: Mutex::new(SchedulerState::default()),
            idle: Condvar::new(),
            cancellation: CancellationRegistry::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submit a task
    ///
    /// # Arguments
    ///
    /// * `priority` - Queue priority
    /// * `job_type` - What the job is for, used by the `cancel_*` helpers
    /// * `task` - Work to run on a worker thread
    ///
    /// Returns the job id and the token the task will observe.
    pub fn submit<F>(
        &self,
        priority: JobPriority,
        job_type: JobType,
        task: F,
    ) -> (JobId, CancellationToken)
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        // Counted and registered before the job becomes visible to workers
        self.state().stats.jobs_submitted += 1;
        let job_id = self.queue.reserve_id();
        let token = self.cancellation.register(job_id);
        self.queue.push_reserved(job_id, priority, job_type, Box::new(task));
        tracing::trace!(job_id, ?priority, ?job_type, "job submitted");
        (job_id, token)
    }

    /// Pop the next job, marking it running
    pub fn next_job(&self) -> Option<Job> {
        let job = self.queue.pop()?;
        self.state().running += 1;
        Some(job)
    }

    /// Pop the next job, waiting up to `timeout`
    pub fn next_job_timeout(&self, timeout: Duration) -> Option<Job> {
        let job = self.queue.pop_timeout(timeout)?;
        self.state().running += 1;
        Some(job)
    }

    /// Mark a popped job as finished
    pub fn complete_job(&self, job_id: JobId) {
        let mut state = self.state();
        state.stats.jobs_completed += 1;
        state.running = state.running.saturating_sub(1);
        drop(state);

        self.cancellation.unregister(job_id);
        self.idle.notify_all();
    }

    /// Cancel a job by id, whether queued or running
    ///
    /// Returns `true` if the job was found.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let token_found = self.cancellation.cancel(job_id);
        let removed = self.queue.remove_if(|info| info.id == job_id);
        if removed.is_empty() {
            return token_found;
        }
        self.record_cancelled(&removed);
        true
    }

    /// Cancel every queued job matching `predicate` and signal running ones
    ///
    /// Returns the number of queued jobs removed.
    pub fn cancel_jobs_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&JobInfo) -> bool,
    {
        let removed = self.queue.remove_if(&predicate);
        let count = removed.len();
        self.record_cancelled(&removed);
        count
    }

    /// Cancel queued load/prefetch jobs for a page
    pub fn cancel_page_loads(&self, page_id: Uuid) -> usize {
        let cancelled =
            self.cancel_jobs_if(|info| info.job_type.is_load() && info.job_type.page_id() == page_id);
        if cancelled > 0 {
            tracing::debug!(%page_id, cancelled, "cancelled queued page loads");
        }
        cancelled
    }

    fn record_cancelled(&self, removed: &[Job]) {
        if removed.is_empty() {
            return;
        }
        let ids: Vec<JobId> = removed.iter().map(|job| job.id).collect();
        self.cancellation.cancel_many(&ids);
        for id in &ids {
            self.cancellation.unregister(*id);
        }
        self.state().stats.jobs_cancelled += ids.len() as u64;
        self.idle.notify_all();
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending_jobs_list(&self) -> Vec<JobInfo> {
        self.queue.jobs()
    }

    pub fn peek_next_job(&self) -> Option<JobInfo> {
        self.queue.peek()
    }

    pub fn get_cancellation_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.cancellation.get(job_id)
    }

    /// Drop every queued job and cancel running ones
    pub fn clear(&self) {
        self.cancellation.cancel_all();
        let removed = self.queue.remove_if(|_| true);
        self.record_cancelled(&removed);
    }

    /// Wake idle workers so they notice shutdown promptly
    pub fn wake_workers(&self) {
        self.queue.wake_all();
    }

    /// Block until every submitted job has completed or been cancelled
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.state();
        let (state, _) = self
            .idle
            .wait_timeout_while(state, timeout, |s| s.stats.pending_jobs() > 0)
            .unwrap_or_else(|e| e.into_inner());
        state.stats.pending_jobs() == 0
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state();
        let mut stats = state.stats.clone();
        stats.queue_size = self.queue.len();
        stats.running = state.running;
        stats
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn load(page_id: Uuid) -> JobType {
        JobType::LoadPage { page_id }
    }

    #[test]
    fn test_scheduler_basic() {
        let scheduler = JobScheduler::new();
        assert!(!scheduler.has_pending_jobs());

        let (job_id, token) = scheduler.submit(JobPriority::Load, load(Uuid::new_v4()), |_| {});
        assert_eq!(scheduler.pending_jobs(), 1);
        assert!(!token.is_cancelled());

        let job = scheduler.next_job().unwrap();
        assert_eq!(job.id, job_id);
        assert_eq!(scheduler.stats().running, 1);
        scheduler.complete_job(job_id);

        let stats = scheduler.stats();
        assert_eq!(stats.jobs_submitted, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.pending_jobs(), 0);
    }

    #[test]
    fn test_cancel_queued_job() {
        let scheduler = JobScheduler::new();
        let (job_id, token) = scheduler.submit(JobPriority::Load, load(Uuid::new_v4()), |_| {});

        assert!(scheduler.cancel_job(job_id));
        assert!(token.is_cancelled());
        assert_eq!(scheduler.pending_jobs(), 0);
        assert_eq!(scheduler.stats().jobs_cancelled, 1);
        assert!(!scheduler.cancel_job(999));
    }

    #[test]
    fn test_cancel_running_job_signals_token() {
        let scheduler = JobScheduler::new();
        let (job_id, token) = scheduler.submit(JobPriority::Load, load(Uuid::new_v4()), |_| {});
        let _job = scheduler.next_job().unwrap();

        assert!(scheduler.cancel_job(job_id));
        assert!(token.is_cancelled());
        assert_eq!(scheduler.stats().jobs_cancelled, 0);
    }

    #[test]
    fn test_cancel_page_loads_keeps_other_work() {
        let scheduler = JobScheduler::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        scheduler.submit(JobPriority::Load, load(a), |_| {});
        scheduler.submit(JobPriority::Prefetch, JobType::PrefetchPage { page_id: a }, |_| {});
        scheduler.submit(JobPriority::Persist, JobType::Persist { page_id: a }, |_| {});
        scheduler.submit(JobPriority::Load, load(b), |_| {});

        assert_eq!(scheduler.cancel_page_loads(a), 2);
        let remaining = scheduler.pending_jobs_list();
        assert_eq!(remaining.len(), 2);
        assert!(remaining
            .iter()
            .all(|info| !(info.job_type.is_load() && info.job_type.page_id() == a)));
    }

    #[test]
    fn test_clear_cancels_everything() {
        let scheduler = JobScheduler::new();
        let (_, t1) = scheduler.submit(JobPriority::Load, load(Uuid::new_v4()), |_| {});
        let (_, t2) = scheduler.submit(JobPriority::Prefetch, load(Uuid::new_v4()), |_| {});

        scheduler.clear();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert_eq!(scheduler.pending_jobs(), 0);
        assert_eq!(scheduler.stats().jobs_cancelled, 2);
    }

    #[test]
    fn test_wait_idle_times_out_with_queued_work() {
        let scheduler = JobScheduler::new();
        scheduler.submit(JobPriority::Load, load(Uuid::new_v4()), |_| {});
        assert!(!scheduler.wait_idle(Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_idle_returns_after_completion() {
        let scheduler = Arc::new(JobScheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        scheduler.submit(JobPriority::Load, load(Uuid::new_v4()), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let worker = scheduler.clone();
        let handle = std::thread::spawn(move || {
            let job = worker.next_job().unwrap();
            let id = job.id;
            job.run(&CancellationToken::new());
            worker.complete_job(id);
        });

        assert!(scheduler.wait_idle(Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
