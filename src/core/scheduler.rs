//! Task scheduler: a name→task registry in front of a worker pool and a delay timer.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use prometheus_task_scheduler::core::{TaskOptions, TaskScheduler};
//! use prometheus_task_scheduler::util::Priority;
//!
//! let scheduler = TaskScheduler::with_workers(4)?;
//!
//! scheduler.schedule_with(
//!     "factorial",
//!     || Ok((1..=10_u64).product::<u64>()),
//!     TaskOptions::new().with_priority(Priority::High),
//! )?;
//! scheduler.schedule_with(
//!     "later",
//!     || Ok(String::from("from the future")),
//!     TaskOptions::new().with_delay(Duration::from_secs(5)),
//! )?;
//!
//! let value: u64 = scheduler.wait_for_task("factorial")?;
//! assert_eq!(value, 3_628_800);
//! scheduler.cancel_task("later")?;
//! scheduler.wait_for_all();
//! # Ok::<(), prometheus_task_scheduler::core::SchedulerError>(())
//! ```

use std::any::{type_name, Any};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::core::stats::CompletionTracker;
use crate::core::thread_pool::SharedWork;
use crate::core::timer::DelayTimer;
use crate::core::{
    SchedulerError, SchedulerResult, SchedulerStats, Task, TaskHandle, TaskOptions, TaskOutput,
    TaskResult, TaskStatus, ThreadPool,
};

/// Priority task scheduler backed by a fixed worker pool.
///
/// Dropping the scheduler runs [`shutdown`](Self::shutdown).
pub struct TaskScheduler {
    registry: Mutex<HashMap<String, SharedWork>>,
    tracker: Arc<CompletionTracker>,
    timer: DelayTimer,
    pool: ThreadPool,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    /// Start a scheduler with its worker pool and delay timer.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::WorkerSpawn` if a thread cannot be started
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        let pool = ThreadPool::new(&config)?;
        let timer = DelayTimer::start(pool.handle(), format!("{}-timer", config.thread_name_prefix))?;
        info!(
            worker_count = config.worker_count,
            "TaskScheduler initialized"
        );
        Ok(Self {
            registry: Mutex::new(HashMap::new()),
            tracker: Arc::new(CompletionTracker::default()),
            timer,
            pool,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Scheduler with `worker_count` workers and default thread settings.
    ///
    /// # Errors
    ///
    /// See [`TaskScheduler::new`].
    pub fn with_workers(worker_count: usize) -> SchedulerResult<Self> {
        Self::new(SchedulerConfig::new().with_worker_count(worker_count))
    }

    /// Scheduler configured from the environment (see [`SchedulerConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` on unparsable or invalid settings, plus
    /// everything [`TaskScheduler::new`] returns.
    pub fn from_env() -> SchedulerResult<Self> {
        Self::new(SchedulerConfig::from_env().map_err(SchedulerError::InvalidConfig)?)
    }

    /// Schedule `work` now, at medium priority, cancellable.
    ///
    /// # Errors
    ///
    /// See [`schedule_with`](Self::schedule_with).
    pub fn schedule<T, F>(&self, name: impl Into<String>, work: F) -> SchedulerResult<TaskHandle<T>>
    where
        T: TaskOutput,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.schedule_with(name, work, TaskOptions::default())
    }

    /// Register a task under `name` and queue it, or defer it until its scheduled time.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::DuplicateTask` if `name` is already registered; the
    ///   existing task is not touched
    /// - `SchedulerError::PoolStopped` after shutdown; nothing is registered
    pub fn schedule_with<T, F>(
        &self,
        name: impl Into<String>,
        work: F,
        options: TaskOptions,
    ) -> SchedulerResult<TaskHandle<T>>
    where
        T: TaskOutput,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let name = name.into();
        let task = Arc::new(Task::new(name.clone(), work, options).with_tracker(Arc::clone(&self.tracker)));
        let shared: SharedWork = Arc::clone(&task) as SharedWork;

        let mut registry = self.registry.lock();
        let Entry::Vacant(slot) = registry.entry(name) else {
            return Err(SchedulerError::DuplicateTask(task.name().to_owned()));
        };
        slot.insert(Arc::clone(&shared));
        self.tracker.registered();

        // Dispatch under the registry lock so a failed dispatch can be rolled back
        // before anyone observes the entry. The pool never locks the registry.
        if let Err(err) = self.dispatch(&shared) {
            registry.remove(task.name());
            self.tracker.unregistered();
            return Err(err);
        }
        drop(registry);

        debug!(
            task = task.name(),
            priority = %task.priority(),
            result_type = type_name::<T>(),
            "Task scheduled"
        );
        Ok(TaskHandle::new(task))
    }

    fn dispatch(&self, work: &SharedWork) -> SchedulerResult<()> {
        if work.scheduled_at() <= Instant::now() {
            self.pool.enqueue(Arc::clone(work))
        } else {
            self.timer.schedule(Arc::clone(work))
        }
    }

    fn lookup(&self, name: &str) -> SchedulerResult<SharedWork> {
        self.registry
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound(name.to_owned()))
    }

    fn typed<T: TaskOutput>(&self, name: &str) -> SchedulerResult<Arc<Task<T>>> {
        let work = self.lookup(name)?;
        let actual = work.result_type_name();
        work.into_any()
            .downcast::<Task<T>>()
            .map_err(|_| SchedulerError::TypeMismatch {
                name: name.to_owned(),
                expected: type_name::<T>(),
                actual,
            })
    }

    /// Cancel a pending, cancellable task. Returns whether it was cancelled.
    ///
    /// # Errors
    ///
    /// `SchedulerError::TaskNotFound` if `name` is not registered.
    pub fn cancel_task(&self, name: &str) -> SchedulerResult<bool> {
        let cancelled = self.lookup(name)?.cancel();
        debug!(task = name, cancelled, "Cancel requested");
        Ok(cancelled)
    }

    /// Current status of a task.
    ///
    /// # Errors
    ///
    /// `SchedulerError::TaskNotFound` if `name` is not registered.
    pub fn task_status(&self, name: &str) -> SchedulerResult<TaskStatus> {
        Ok(self.lookup(name)?.status())
    }

    /// Snapshot of a task's result container, typed.
    ///
    /// Use [`TaskResult::into_value`] to get the value or the original error.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::TaskNotFound` if `name` is not registered
    /// - `SchedulerError::TypeMismatch` if the task does not produce a `T`
    pub fn task_result<T: TaskOutput>(&self, name: &str) -> SchedulerResult<TaskResult<T>> {
        Ok(self.typed::<T>(name)?.result())
    }

    /// The produced value behind `dyn Any`, or `None` unless the task completed.
    ///
    /// # Errors
    ///
    /// `SchedulerError::TaskNotFound` if `name` is not registered.
    pub fn task_result_erased(&self, name: &str) -> SchedulerResult<Option<Box<dyn Any + Send>>> {
        Ok(self.lookup(name)?.erased_result())
    }

    /// Block until the task settles and return its value.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::TaskNotFound` if `name` is not registered at call time
    /// - `SchedulerError::TypeMismatch` if the task does not produce a `T`
    /// - `SchedulerError::Failed` carrying the callable's original error
    /// - `SchedulerError::Cancelled` if the task was cancelled
    pub fn wait_for_task<T: TaskOutput>(&self, name: &str) -> SchedulerResult<T> {
        let task = self.typed::<T>(name)?;
        task.wait();
        task.outcome()
    }

    /// Like [`wait_for_task`](Self::wait_for_task) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Everything `wait_for_task` returns, plus `SchedulerError::Timeout`.
    pub fn wait_for_task_timeout<T: TaskOutput>(
        &self,
        name: &str,
        timeout: Duration,
    ) -> SchedulerResult<T> {
        let task = self.typed::<T>(name)?;
        task.wait_timeout(timeout).ok_or(SchedulerError::Timeout)?;
        task.outcome()
    }

    /// Block until every registered task is completed, failed or cancelled.
    ///
    /// Tasks registered while waiting are waited for too.
    pub fn wait_for_all(&self) {
        self.wait_all_until(None);
    }

    /// Like [`wait_for_all`](Self::wait_for_all) with a bound. Returns `false` on timeout.
    ///
    /// A timeout too large for an `Instant` waits without bound.
    #[must_use = "a timeout leaves tasks unsettled"]
    pub fn wait_for_all_timeout(&self, timeout: Duration) -> bool {
        self.wait_all_until(Instant::now().checked_add(timeout))
    }

    fn wait_all_until(&self, deadline: Option<Instant>) -> bool {
        loop {
            let seen = self.tracker.epoch();
            if self.all_settled() {
                return true;
            }
            if !self.tracker.wait_for_change(seen, deadline) {
                return self.all_settled();
            }
        }
    }

    fn all_settled(&self) -> bool {
        self.registry
            .lock()
            .values()
            .all(|work| work.status().is_terminal())
    }

    /// Counters plus live pending/running counts and pool occupancy.
    #[must_use]
    pub fn statistics(&self) -> SchedulerStats {
        let (pending, running) = {
            let registry = self.registry.lock();
            registry
                .values()
                .fold((0, 0), |(pending, running), work| match work.status() {
                    TaskStatus::Pending => (pending + 1, running),
                    TaskStatus::Running => (pending, running + 1),
                    _ => (pending, running),
                })
        };
        SchedulerStats {
            pending_tasks: pending,
            running_tasks: running,
            queued_tasks: self.pool.queue_len(),
            delayed_tasks: self.timer.len(),
            active_workers: self.pool.active_workers(),
            max_workers: self.pool.max_workers(),
            ..self.tracker.snapshot()
        }
    }

    /// Every registered task with its status, sorted by name.
    #[must_use]
    pub fn list_tasks(&self) -> Vec<(String, TaskStatus)> {
        let mut tasks: Vec<_> = self
            .registry
            .lock()
            .iter()
            .map(|(name, work)| (name.clone(), work.status()))
            .collect();
        tasks.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        tasks
    }

    /// Remove every completed, failed or cancelled task. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut registry = self.registry.lock();
        let before = registry.len();
        registry.retain(|_, work| !work.status().is_terminal());
        let removed = before - registry.len();
        debug!(removed, remaining = registry.len(), "Registry cleaned up");
        removed
    }

    /// Whether a task is registered under `name`.
    #[must_use]
    pub fn contains_task(&self, name: &str) -> bool {
        self.registry.lock().contains_key(name)
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Whether no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Stop the timer and the pool.
    ///
    /// Tasks still waiting for their time or for a worker are failed with
    /// `PoolStopped`, which wakes anyone waiting on them. Running tasks finish.
    /// Later `schedule*` calls return `PoolStopped`. Every caller, including
    /// concurrent ones, returns only after the timer and workers are joined.
    pub fn shutdown(&self) {
        let delayed = self.timer.shutdown();
        let queued = self.pool.shutdown();
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            info!(delayed, queued, "TaskScheduler shut down");
        }
    }
}

#[cfg(feature = "tokio-runtime")]
impl TaskScheduler {
    /// Async variant of [`wait_for_task`](Self::wait_for_task).
    ///
    /// The condition-variable wait runs on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Same as `wait_for_task`, plus `SchedulerError::Internal` if the blocking
    /// wait could not be joined.
    pub async fn wait_for_task_async<T: TaskOutput>(&self, name: &str) -> SchedulerResult<T> {
        let task = self.typed::<T>(name)?;
        tokio::task::spawn_blocking(move || {
            task.wait();
            task.outcome()
        })
        .await
        .map_err(|e| SchedulerError::Internal(e.to_string()))?
    }

    /// Async variant of [`wait_for_all`](Self::wait_for_all).
    ///
    /// Waits for the tasks registered when it is called.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Internal` if the blocking wait could not be joined.
    pub async fn wait_for_all_async(&self) -> SchedulerResult<()> {
        let unsettled: Vec<SharedWork> = self
            .registry
            .lock()
            .values()
            .filter(|work| !work.status().is_terminal())
            .cloned()
            .collect();
        tokio::task::spawn_blocking(move || {
            for work in unsettled {
                work.wait_settled(None);
            }
        })
        .await
        .map_err(|e| SchedulerError::Internal(e.to_string()))
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::serde::Priority;

    #[test]
    fn test_schedule_and_wait() {
        let scheduler = TaskScheduler::with_workers(2).unwrap();
        let handle = scheduler.schedule("sum", || Ok(2 + 3)).unwrap();
        assert_eq!(handle.name(), "sum");
        assert_eq!(scheduler.wait_for_task::<i32>("sum").unwrap(), 5);
        assert_eq!(handle.status(), TaskStatus::Completed);
    }

    #[test]
    fn test_duplicate_leaves_original() {
        let scheduler = TaskScheduler::with_workers(1).unwrap();
        scheduler.schedule("x", || Ok(1_u8)).unwrap();
        let err = scheduler.schedule("x", || Ok(2_u8)).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTask(name) if name == "x"));
        assert_eq!(scheduler.wait_for_task::<u8>("x").unwrap(), 1);
        assert_eq!(scheduler.statistics().total_tasks, 1);
    }

    #[test]
    fn test_unknown_name() {
        let scheduler = TaskScheduler::with_workers(1).unwrap();
        assert!(matches!(
            scheduler.task_status("ghost"),
            Err(SchedulerError::TaskNotFound(_))
        ));
        assert!(matches!(
            scheduler.cancel_task("ghost"),
            Err(SchedulerError::TaskNotFound(_))
        ));
        assert!(matches!(
            scheduler.wait_for_task::<()>("ghost"),
            Err(SchedulerError::TaskNotFound(_))
        ));
        assert!(scheduler.task_result_erased("ghost").is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let scheduler = TaskScheduler::with_workers(1).unwrap();
        scheduler.schedule("text", || Ok(String::from("abc"))).unwrap();
        let err = scheduler.task_result::<i64>("text").unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::TypeMismatch { expected, actual, .. }
                if expected == "i64" && actual == type_name::<String>()
        ));
        assert_eq!(scheduler.wait_for_task::<String>("text").unwrap(), "abc");
    }

    #[test]
    fn test_schedule_after_shutdown() {
        let scheduler = TaskScheduler::with_workers(1).unwrap();
        scheduler.shutdown();
        let err = scheduler
            .schedule_with(
                "late",
                || Ok(()),
                TaskOptions::new().with_priority(Priority::Critical),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PoolStopped));
        assert!(!scheduler.contains_task("late"));
        assert_eq!(scheduler.statistics().total_tasks, 0);
    }
}
