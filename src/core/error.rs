//! Error types for scheduler operations.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// An error captured from a task's callable.
///
/// The original `anyhow::Error` produced by the callable is kept as-is behind an
/// `Arc`, so every observer of a failed task sees the same error value and can
/// downcast it to the concrete type the callable raised.
#[derive(Clone)]
pub struct TaskError(Arc<anyhow::Error>);

impl TaskError {
    /// Wrap a captured callable error.
    #[must_use]
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// Borrow the original error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempt to view the original error as a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether two handles refer to the same captured error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No task is registered under the name.
    #[error("task '{0}' not found")]
    TaskNotFound(String),
    /// A task is already registered under the name.
    #[error("task with name '{0}' already exists")]
    DuplicateTask(String),
    /// Typed result accessor used with the wrong result type.
    #[error("task '{name}' result type mismatch: requested {expected}, task produces {actual}")]
    TypeMismatch {
        /// Task name.
        name: String,
        /// Type requested by the caller.
        expected: &'static str,
        /// Type declared by the task.
        actual: &'static str,
    },
    /// The task is still pending or running.
    #[error("task '{0}' has not completed")]
    NotCompleted(String),
    /// The task was cancelled before it ran.
    #[error("task '{0}' was cancelled")]
    Cancelled(String),
    /// The task's own callable failed; this is the original error.
    #[error(transparent)]
    Failed(TaskError),
    /// The worker pool has been shut down.
    #[error("thread pool has been stopped")]
    PoolStopped,
    /// A bounded wait elapsed before the task settled.
    #[error("operation timed out")]
    Timeout,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to start a worker or timer thread.
    #[error("failed to spawn thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    /// Unexpected internal failure (e.g. a join error from an async runtime).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// The callable's error if this is a [`SchedulerError::Failed`].
    #[must_use]
    pub const fn task_error(&self) -> Option<&TaskError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
