//! Inkpage Scheduler Library
//!
//! Background execution for the page engine: a priority job queue with
//! cooperative cancellation, a worker pool, the FIFO drawing lock that
//! serializes bitmap mutation, and a typed event bus.
//!
//! # Example
//!
//! ```
//! use inkpage_scheduler::{JobPriority, JobScheduler, JobType};
//! use uuid::Uuid;
//!
//! let scheduler = JobScheduler::new();
//! let page_id = Uuid::new_v4();
//!
//! scheduler.submit(JobPriority::Prefetch, JobType::PrefetchPage { page_id }, |_| {});
//! scheduler.submit(JobPriority::Load, JobType::LoadPage { page_id }, |_| {});
//!
//! // The user navigated away before either ran
//! assert_eq!(scheduler.cancel_page_loads(page_id), 2);
//! ```

mod bus;
mod cancel;
mod lock;
mod priority;
mod scheduler;
mod worker;

pub use bus::EventBus;
pub use cancel::{CancellationRegistry, CancellationToken, Cancelled};
pub use lock::{DrawingGuard, DrawingLock};
pub use priority::{Job, JobId, JobInfo, JobPriority, JobTask, JobType, PriorityQueue};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use worker::{WorkerPool, WorkerPoolConfig};
