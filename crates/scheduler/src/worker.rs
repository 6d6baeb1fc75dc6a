//! Worker pool executing scheduler jobs
//!
//! Workers block on the scheduler's queue, run each job with its
//! cancellation token, and mark it complete. Jobs cancelled while still
//! queued never reach a worker; jobs cancelled while running observe the
//! token themselves.

use crate::JobScheduler;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads. Default: 2, the engine's work is mostly I/O.
    pub num_workers: usize,

    /// How long an idle worker blocks before re-checking shutdown. Default: 50ms.
    pub poll_interval: Duration,

    /// Thread name prefix
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            poll_interval: Duration::from_millis(50),
            thread_name: "inkpage-worker".to_string(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Pool of worker threads pulling from a shared [`JobScheduler`]
///
/// # Example
///
/// ```
/// use inkpage_scheduler::{JobPriority, JobScheduler, JobType, WorkerPool, WorkerPoolConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use uuid::Uuid;
///
/// let scheduler = Arc::new(JobScheduler::new());
/// let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(1));
///
/// scheduler.submit(JobPriority::Load, JobType::LoadPage { page_id: Uuid::new_v4() }, |_| {});
/// assert!(scheduler.wait_idle(Duration::from_secs(5)));
///
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    scheduler: Arc<JobScheduler>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `config.num_workers` threads
    ///
    /// Threads that fail to spawn are logged and skipped; the pool keeps
    /// whatever started.
    pub fn new(scheduler: Arc<JobScheduler>, config: WorkerPoolConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            let poll = config.poll_interval;
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, id))
                .spawn(move || run_worker(scheduler, shutdown, poll));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => tracing::error!(worker = id, error = %e, "failed to spawn worker"),
            }
        }

        tracing::debug!(workers = workers.len(), "worker pool started");
        Self {
            workers,
            scheduler,
            shutdown,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    /// Signal shutdown and join every worker
    ///
    /// Running jobs finish first; queued jobs stay in the scheduler.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.scheduler.wake_workers();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

fn run_worker(scheduler: Arc<JobScheduler>, shutdown: Arc<AtomicBool>, poll: Duration) {
    while !shutdown.load(Ordering::Acquire) {
        let Some(job) = scheduler.next_job_timeout(poll) else {
            continue;
        };
        let job_id = job.id;
        let token = scheduler.get_cancellation_token(job_id).unwrap_or_default();
        if token.is_cancelled() {
            tracing::trace!(job_id, "skipping cancelled job");
        } else {
            job.run(&token);
        }
        scheduler.complete_job(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobPriority, JobType};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn load() -> JobType {
        JobType::LoadPage {
            page_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerPoolConfig::new(0)
            .with_poll_interval(Duration::from_millis(5))
            .with_thread_name("test");
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.thread_name, "test");
    }

    #[test]
    fn test_pool_executes_jobs() {
        let scheduler = Arc::new(JobScheduler::new());
        let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(2));
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let executed = executed.clone();
            scheduler.submit(JobPriority::Load, load(), move |_| {
                executed.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(scheduler.wait_idle(Duration::from_secs(5)));
        assert_eq!(executed.load(Ordering::SeqCst), 5);
        pool.shutdown();
    }

    #[test]
    fn test_pool_runs_by_priority() {
        let scheduler = Arc::new(JobScheduler::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        // Queue everything before the single worker starts
        for (priority, tag) in [
            (JobPriority::Persist, 3),
            (JobPriority::Interactive, 1),
            (JobPriority::Prefetch, 2),
        ] {
            let order = order.clone();
            scheduler.submit(priority, load(), move |_| order.lock().unwrap().push(tag));
        }

        let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(1));
        assert!(scheduler.wait_idle(Duration::from_secs(5)));
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
        pool.shutdown();
    }

    #[test]
    fn test_cancelled_running_job_sees_token() {
        let scheduler = Arc::new(JobScheduler::new());
        let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(1));
        let observed = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));

        let (job_id, _) = {
            let observed = observed.clone();
            let started = started.clone();
            scheduler.submit(JobPriority::Load, load(), move |token| {
                started.store(true, Ordering::SeqCst);
                for _ in 0..500 {
                    if token.is_cancelled() {
                        observed.store(true, Ordering::SeqCst);
                        return;
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };

        while !started.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        scheduler.cancel_job(job_id);
        assert!(scheduler.wait_idle(Duration::from_secs(5)));
        assert!(observed.load(Ordering::SeqCst));
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_joins_idle_workers() {
        let scheduler = Arc::new(JobScheduler::new());
        let pool = WorkerPool::new(scheduler, WorkerPoolConfig::new(3));
        assert_eq!(pool.num_workers(), 3);
        assert!(!pool.is_shutting_down());
        pool.shutdown();
    }
}
