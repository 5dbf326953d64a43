//! Core scheduling abstractions: tasks, the worker pool, the delay timer and the scheduler.

pub mod error;
pub mod scheduler;
pub mod stats;
pub mod task;
pub mod thread_pool;
pub(crate) mod timer;

pub use error::{SchedulerError, SchedulerResult, TaskError};
pub use scheduler::TaskScheduler;
pub use stats::SchedulerStats;
pub use task::{
    ScheduledWork, Task, TaskHandle, TaskOptions, TaskOutput, TaskResult, TaskStatus,
};
pub use thread_pool::{SharedWork, ThreadPool};
