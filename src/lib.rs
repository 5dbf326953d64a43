//! # Prometheus Task Scheduler
//!
//! A priority task scheduler backed by a fixed pool of worker threads.
//!
//! Callers register named units of work ("tasks") with a priority and an optional
//! future start time. Ready tasks wait in a single shared priority queue; a worker
//! always takes the most urgent one, and within a priority level the one that was
//! due earliest. Future-dated tasks are held by one timer thread until due.
//!
//! ## Key Features
//!
//! - **Priority ordering**: `Critical > High > Medium > Low`, earliest due first within a level
//! - **Delayed scheduling**: a single timer thread with a min-heap, no thread per task
//! - **Cancellation**: pending, cancellable tasks can be cancelled until a worker picks them up
//! - **Deferred errors**: a callable's error is captured and handed back unchanged on
//!   `wait_for_task` / `task_result`
//! - **Typed results over type erasure**: tasks of any result type share one registry;
//!   typed accessors check the type and report `TypeMismatch` instead of guessing
//! - **No polling**: waits block on condition variables
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prometheus_task_scheduler::core::{SchedulerError, TaskOptions, TaskScheduler};
//! use prometheus_task_scheduler::util::Priority;
//!
//! let scheduler = TaskScheduler::with_workers(4)?;
//!
//! scheduler.schedule_with("report", build_report, TaskOptions::new().with_priority(Priority::High))?;
//! scheduler.schedule("cleanup", || { purge_tmp()?; Ok(()) })?;
//!
//! match scheduler.wait_for_task::<Report>("report") {
//!     Ok(report) => publish(report),
//!     Err(SchedulerError::Failed(err)) => eprintln!("report failed: {err}"),
//!     Err(other) => return Err(other),
//! }
//!
//! scheduler.wait_for_all();
//! println!("{:?}", scheduler.statistics());
//! scheduler.cleanup();
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: tasks, worker pool, delay timer, scheduler.
pub mod core;
/// Configuration models for the scheduler and its worker pool.
pub mod config;
/// Shared utilities.
pub mod util;
