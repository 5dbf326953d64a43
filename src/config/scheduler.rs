//! Scheduler and worker pool configuration.

use std::env;

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`SchedulerConfig::worker_count`].
pub const ENV_WORKERS: &str = "TASK_SCHEDULER_WORKERS";
/// Environment variable overriding [`SchedulerConfig::thread_stack_size`].
pub const ENV_STACK_SIZE: &str = "TASK_SCHEDULER_STACK_SIZE";
/// Environment variable overriding [`SchedulerConfig::thread_name_prefix`].
pub const ENV_THREAD_PREFIX: &str = "TASK_SCHEDULER_THREAD_PREFIX";

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const MIN_STACK_SIZE: usize = 64 * 1024;

/// Construction-time configuration of a [`TaskScheduler`](crate::core::TaskScheduler).
///
/// Missing JSON fields fall back to [`Default`], so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads in the pool.
    pub worker_count: usize,
    /// Stack size for each worker thread, in bytes.
    pub thread_stack_size: usize,
    /// Prefix for worker thread names (`{prefix}-{index}`).
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            thread_stack_size: DEFAULT_STACK_SIZE,
            thread_name_prefix: "task-worker".into(),
        }
    }
}

impl SchedulerConfig {
    /// Configuration sized to the host's available parallelism.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the worker thread stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!(
                "thread_stack_size must be at least {MIN_STACK_SIZE} bytes"
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns a message on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overlaid with environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    ///
    /// Returns a message when a variable is set but unparsable, or the result is invalid.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(workers) = read_env_usize(ENV_WORKERS)? {
            cfg.worker_count = workers;
        }
        if let Some(stack) = read_env_usize(ENV_STACK_SIZE)? {
            cfg.thread_stack_size = stack;
        }
        if let Ok(prefix) = env::var(ENV_THREAD_PREFIX) {
            cfg.thread_name_prefix = prefix;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn read_env_usize(key: &str) -> Result<Option<usize>, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| format!("{key}: {e}")),
        Err(_) => Ok(None),
    }
}
