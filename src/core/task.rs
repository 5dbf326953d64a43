//! Task model: status, result container, the type-erased work trait, and typed handles.
//!
//! A [`Task<T>`] owns its callable until a worker runs it. Every observable state
//! change (run, cancel, abandon at shutdown) goes through the task's own mutex, and
//! each terminal transition wakes waiters blocked on the task's condition variable.

use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::stats::CompletionTracker;
use crate::core::{SchedulerError, SchedulerResult, TaskError};
use crate::util::serde::Priority;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Registered, not yet picked up by a worker.
    Pending,
    /// A worker is executing the callable.
    Running,
    /// The callable returned a value.
    Completed,
    /// The callable returned an error or panicked.
    Failed,
    /// Cancelled before it started.
    Cancelled,
}

impl TaskStatus {
    /// Completed, failed and cancelled tasks never change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker trait for values a task may produce.
///
/// Results are cloned out to every reader, so the value must be `Clone`; it is
/// produced on a worker thread, so it must be `Send`.
pub trait TaskOutput: Clone + Send + 'static {}

/// Blanket implementation: any type meeting the requirements is a `TaskOutput`.
impl<T> TaskOutput for T where T: Clone + Send + 'static {}

/// Outcome container of a task. Written once when the task settles.
#[derive(Debug, Clone)]
pub enum TaskResult<T> {
    /// Not settled yet (pending or running).
    Pending,
    /// Value returned by the callable.
    Completed(T),
    /// Error captured from the callable.
    Failed(TaskError),
    /// Cancelled before running.
    Cancelled,
}

impl<T> TaskResult<T> {
    /// Terminal status mirrored by this result, or `Pending` if unsettled.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        match self {
            Self::Pending => TaskStatus::Pending,
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed(_) => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }

    /// The produced value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// The captured error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&TaskError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Convert into the value, re-raising the captured error.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Failed`] with the original error if the callable failed
    /// - [`SchedulerError::Cancelled`] if the task was cancelled
    /// - [`SchedulerError::NotCompleted`] if the task has not settled
    pub fn into_value(self, name: &str) -> SchedulerResult<T> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(err) => Err(SchedulerError::Failed(err)),
            Self::Cancelled => Err(SchedulerError::Cancelled(name.to_owned())),
            Self::Pending => Err(SchedulerError::NotCompleted(name.to_owned())),
        }
    }
}

/// Per-task scheduling options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Queue priority.
    pub priority: Priority,
    /// Earliest instant the task may run; `None` means "when scheduled".
    pub scheduled_at: Option<Instant>,
    /// Whether the task may move from pending to cancelled.
    pub cancellable: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Medium,
            scheduled_at: None,
            cancellable: true,
        }
    }
}

impl TaskOptions {
    /// Medium priority, due immediately, cancellable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Run no earlier than `at`.
    #[must_use]
    pub const fn with_scheduled_at(mut self, at: Instant) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Run no earlier than `delay` from now.
    ///
    /// A delay past the platform's `Instant` range is clamped to roughly a century.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        let now = Instant::now();
        self.scheduled_at = Some(
            now.checked_add(delay)
                .or_else(|| now.checked_add(FAR_FUTURE))
                .unwrap_or(now),
        );
        self
    }

    /// Allow or forbid cancellation.
    #[must_use]
    pub const fn with_cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }
}

/// Non-generic view of a task, shared by the registry, the delay timer and the
/// worker queue.
pub trait ScheduledWork: Send + Sync + 'static {
    /// Unique task name.
    fn name(&self) -> &str;
    /// Queue priority.
    fn priority(&self) -> Priority;
    /// Earliest instant the task may run.
    fn scheduled_at(&self) -> Instant;
    /// Whether cancellation is permitted.
    fn is_cancellable(&self) -> bool;
    /// Current lifecycle state.
    fn status(&self) -> TaskStatus;
    /// Run the callable if the task is still pending. Called once by a worker.
    fn execute(&self);
    /// Move a pending, cancellable task to cancelled. Returns whether it did.
    fn cancel(&self) -> bool;
    /// Fail a pending task because the pool stopped. Returns whether it did.
    fn abandon(&self) -> bool;
    /// Block until terminal or `deadline`; `None` if the deadline passed first.
    fn wait_settled(&self, deadline: Option<Instant>) -> Option<TaskStatus>;
    /// Name of the declared result type.
    fn result_type_name(&self) -> &'static str;
    /// Clone of the produced value, boxed, if the task completed.
    fn erased_result(&self) -> Option<Box<dyn Any + Send>>;
    /// Upcast for checked downcasting to the concrete `Task<T>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Upper bound for delays that do not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

type Work<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

struct TaskState<T> {
    status: TaskStatus,
    work: Option<Work<T>>,
    result: TaskResult<T>,
}

/// A named unit of deferred work producing a `T`.
pub struct Task<T> {
    name: String,
    priority: Priority,
    scheduled_at: Instant,
    cancellable: bool,
    state: Mutex<TaskState<T>>,
    settled: Condvar,
    tracker: Option<Arc<CompletionTracker>>,
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("scheduled_at", &self.scheduled_at)
            .field("cancellable", &self.cancellable)
            .field("status", &self.state.lock().status)
            .finish_non_exhaustive()
    }
}

impl<T: TaskOutput> Task<T> {
    /// Create a pending task. A missing scheduled time resolves to now.
    pub fn new<F>(name: impl Into<String>, work: F, options: TaskOptions) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority: options.priority,
            scheduled_at: options.scheduled_at.unwrap_or_else(Instant::now),
            cancellable: options.cancellable,
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                work: Some(Box::new(work)),
                result: TaskResult::Pending,
            }),
            settled: Condvar::new(),
            tracker: None,
        }
    }

    /// Report settlements to the scheduler's counters and broadcast signal.
    pub(crate) fn with_tracker(mut self, tracker: Arc<CompletionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Unique task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Earliest instant the task may run.
    #[must_use]
    pub const fn scheduled_at(&self) -> Instant {
        self.scheduled_at
    }

    /// Whether cancellation is permitted.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Snapshot of the result container.
    #[must_use]
    pub fn result(&self) -> TaskResult<T> {
        self.state.lock().result.clone()
    }

    /// The value, the original error, or a not-completed/cancelled condition.
    ///
    /// # Errors
    ///
    /// See [`TaskResult::into_value`].
    pub fn outcome(&self) -> SchedulerResult<T> {
        self.result().into_value(&self.name)
    }

    /// Run the callable. No-op unless the task is pending.
    ///
    /// Errors and panics raised by the callable are captured into the result.
    pub fn run(&self) {
        let work = {
            let mut state = self.state.lock();
            if state.status != TaskStatus::Pending {
                return;
            }
            let Some(work) = state.work.take() else {
                return;
            };
            state.status = TaskStatus::Running;
            work
        };

        debug!(task = %self.name, priority = %self.priority, "Task running");
        let result = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => TaskResult::Completed(value),
            Ok(Err(err)) => TaskResult::Failed(TaskError::new(err)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(task = %self.name, panic = %message, "Task callable panicked");
                TaskResult::Failed(TaskError::new(anyhow::anyhow!("task panicked: {message}")))
            }
        };

        let mut state = self.state.lock();
        self.settle(&mut state, result);
        drop(state);
        self.broadcast();
    }

    /// Cancel if pending and cancellable. Returns whether the transition happened.
    pub fn cancel(&self) -> bool {
        let leftover = {
            let mut state = self.state.lock();
            if !self.cancellable || state.status != TaskStatus::Pending {
                return false;
            }
            self.settle(&mut state, TaskResult::Cancelled)
        };
        // Drop the callable's captures outside the lock.
        drop(leftover);
        self.broadcast();
        debug!(task = %self.name, "Task cancelled");
        true
    }

    /// Fail a pending task with [`SchedulerError::PoolStopped`].
    pub(crate) fn abandon(&self) -> bool {
        let leftover = {
            let mut state = self.state.lock();
            if state.status != TaskStatus::Pending {
                return false;
            }
            let err = TaskError::new(anyhow::Error::new(SchedulerError::PoolStopped));
            self.settle(&mut state, TaskResult::Failed(err))
        };
        drop(leftover);
        self.broadcast();
        true
    }

    /// Block until the task is terminal.
    pub fn wait(&self) -> TaskStatus {
        let mut state = self.state.lock();
        while !state.status.is_terminal() {
            self.settled.wait(&mut state);
        }
        state.status
    }

    /// Block until the task is terminal or `deadline` passes.
    pub fn wait_until(&self, deadline: Instant) -> Option<TaskStatus> {
        let mut state = self.state.lock();
        while !state.status.is_terminal() {
            if self.settled.wait_until(&mut state, deadline).timed_out() {
                return state.status.is_terminal().then_some(state.status);
            }
        }
        Some(state.status)
    }

    /// Block for at most `timeout`. A timeout too large for an `Instant` waits forever.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskStatus> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => Some(self.wait()),
        }
    }

    /// Write the terminal result under the task lock and wake this task's waiters.
    ///
    /// Counters are bumped before the lock is released so that anyone who observes
    /// the terminal status also observes the updated statistics.
    fn settle(&self, state: &mut TaskState<T>, result: TaskResult<T>) -> Option<Work<T>> {
        let status = result.status();
        state.status = status;
        state.result = result;
        if let Some(tracker) = &self.tracker {
            tracker.count(status);
        }
        self.settled.notify_all();
        state.work.take()
    }

    fn broadcast(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.notify_settled();
        }
    }
}

impl<T: TaskOutput> ScheduledWork for Task<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn scheduled_at(&self) -> Instant {
        self.scheduled_at
    }

    fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    fn status(&self) -> TaskStatus {
        Self::status(self)
    }

    fn execute(&self) {
        self.run();
    }

    fn cancel(&self) -> bool {
        Self::cancel(self)
    }

    fn abandon(&self) -> bool {
        Self::abandon(self)
    }

    fn wait_settled(&self, deadline: Option<Instant>) -> Option<TaskStatus> {
        match deadline {
            Some(deadline) => self.wait_until(deadline),
            None => Some(self.wait()),
        }
    }

    fn result_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn erased_result(&self) -> Option<Box<dyn Any + Send>> {
        match &self.state.lock().result {
            TaskResult::Completed(value) => Some(Box::new(value.clone())),
            _ => None,
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Typed handle to a scheduled task.
pub struct TaskHandle<T> {
    task: Arc<Task<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.task).finish()
    }
}

impl<T: TaskOutput> TaskHandle<T> {
    pub(crate) const fn new(task: Arc<Task<T>>) -> Self {
        Self { task }
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Queue priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.task.priority()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    /// Snapshot of the result container.
    #[must_use]
    pub fn result(&self) -> TaskResult<T> {
        self.task.result()
    }

    /// Cancel if pending and cancellable.
    #[must_use = "cancellation can be refused"]
    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }

    /// Block until settled and return the value.
    ///
    /// # Errors
    ///
    /// The original callable error, or [`SchedulerError::Cancelled`].
    pub fn wait(&self) -> SchedulerResult<T> {
        self.task.wait();
        self.task.outcome()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Timeout`] if the task has not settled in time.
    pub fn wait_timeout(&self, timeout: Duration) -> SchedulerResult<T> {
        self.task
            .wait_timeout(timeout)
            .ok_or(SchedulerError::Timeout)?;
        self.task.outcome()
    }
}
