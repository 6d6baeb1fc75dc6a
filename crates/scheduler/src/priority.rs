//! Priority-ordered job queue
//!
//! Jobs run highest priority first and FIFO within a priority level, so a
//! burst of prefetches can never starve the load the user is waiting on.

use crate::cancel::CancellationToken;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Job priority levels. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Debounced persistence flushes
    Persist = 0,

    /// Warming neighbor pages
    Prefetch = 1,

    /// Loading the page the user switched to
    Load = 2,

    /// Stroke commits and erases from live input
    Interactive = 3,
}

/// Unique job identifier
pub type JobId = u64;

/// What a job is for, used to find jobs again when cancelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    LoadPage { page_id: Uuid },
    PrefetchPage { page_id: Uuid },
    ApplyInput { page_id: Uuid },
    Persist { page_id: Uuid },
}

impl JobType {
    pub fn page_id(&self) -> Uuid {
        match *self {
            JobType::LoadPage { page_id }
            | JobType::PrefetchPage { page_id }
            | JobType::ApplyInput { page_id }
            | JobType::Persist { page_id } => page_id,
        }
    }

    /// Load and prefetch jobs may be dropped when the user navigates away
    pub fn is_load(&self) -> bool {
        matches!(self, JobType::LoadPage { .. } | JobType::PrefetchPage { .. })
    }
}

/// The work a job performs on a worker thread
pub type JobTask = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

/// A queued unit of work
pub struct Job {
    pub id: JobId,
    pub priority: JobPriority,
    pub job_type: JobType,
    task: JobTask,
    insertion_order: u64,
}

impl Job {
    pub fn new(
        id: JobId,
        priority: JobPriority,
        job_type: JobType,
        task: JobTask,
        insertion_order: u64,
    ) -> Self {
        Self {
            id,
            priority,
            job_type,
            task,
            insertion_order,
        }
    }

    /// Consume the job, running its task with `token`
    pub fn run(self, token: &CancellationToken) {
        (self.task)(token)
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            priority: self.priority,
            job_type: self.job_type,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("job_type", &self.job_type)
            .finish_non_exhaustive()
    }
}

/// Description of a queued job, without its task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub priority: JobPriority,
    pub job_type: JobType,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap: earlier insertions must compare greater
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.insertion_order.cmp(&self.insertion_order))
    }
}

/// Thread-safe priority queue with blocking pop
pub struct PriorityQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

struct QueueState {
    heap: BinaryHeap<Job>,
    next_job_id: JobId,
    insertion_counter: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_job_id: 1,
                insertion_counter: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a task and return its id
    pub fn push(&self, priority: JobPriority, job_type: JobType, task: JobTask) -> JobId {
        let id = self.reserve_id();
        self.push_reserved(id, priority, job_type, task);
        id
    }

    /// Allocate an id ahead of [`push_reserved`](Self::push_reserved)
    pub fn reserve_id(&self) -> JobId {
        let mut state = self.state();
        let id = state.next_job_id;
        state.next_job_id += 1;
        id
    }

    /// Enqueue a task under an id obtained from [`reserve_id`](Self::reserve_id)
    pub fn push_reserved(&self, id: JobId, priority: JobPriority, job_type: JobType, task: JobTask) {
        let mut state = self.state();
        let order = state.insertion_counter;
        state.insertion_counter += 1;
        state.heap.push(Job::new(id, priority, job_type, task, order));
        drop(state);

        self.available.notify_one();
    }

    /// Pop the highest priority job without waiting
    pub fn pop(&self) -> Option<Job> {
        self.state().heap.pop()
    }

    /// Pop the highest priority job, waiting up to `timeout` for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Job> {
        let state = self.state();
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |s| s.heap.is_empty())
            .unwrap_or_else(|e| e.into_inner());
        state.heap.pop()
    }

    /// Wake every thread blocked in [`pop_timeout`](Self::pop_timeout)
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    pub fn peek(&self) -> Option<JobInfo> {
        self.state().heap.peek().map(Job::info)
    }

    pub fn len(&self) -> usize {
        self.state().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().heap.is_empty()
    }

    /// Remove and return every job matching `predicate`
    pub fn remove_if<F>(&self, predicate: F) -> Vec<Job>
    where
        F: Fn(&JobInfo) -> bool,
    {
        let mut state = self.state();
        let (removed, kept): (Vec<Job>, Vec<Job>) = std::mem::take(&mut state.heap)
            .into_vec()
            .into_iter()
            .partition(|job| predicate(&job.info()));
        state.heap = kept.into();
        removed
    }

    /// Snapshot of queued jobs in arbitrary order
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.state().heap.iter().map(Job::info).collect()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
