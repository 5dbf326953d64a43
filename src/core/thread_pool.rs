//! Fixed-size worker thread pool fed by a single shared priority queue.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` guards the heap and the stop flag; idle workers
//!   block on a `Condvar` and use no CPU
//! - Pop order: priority descending, then scheduled time ascending, then admission order
//! - Shutdown is one-time: queued tasks are failed with `PoolStopped`, running
//!   tasks finish, every worker is joined

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::{ScheduledWork, SchedulerError, SchedulerResult, TaskStatus};
use crate::util::serde::Priority;

/// Shared handle to a type-erased task.
pub type SharedWork = Arc<dyn ScheduledWork>;

/// Queue entry ordered for a max-heap.
struct QueuedTask {
    priority: Priority,
    scheduled_at: Instant,
    seq: u64,
    work: SharedWork,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Higher priority first; within a tier earlier scheduled time, then FIFO
        // (both reversed for the max-heap).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.scheduled_at.cmp(&self.scheduled_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    stopped: bool,
    next_seq: u64,
}

struct PoolShared {
    queue: Mutex<QueueState>,
    available: Condvar,
    active: AtomicUsize,
}

impl PoolShared {
    fn enqueue(&self, work: SharedWork) -> SchedulerResult<()> {
        {
            let mut queue = self.queue.lock();
            if queue.stopped {
                return Err(SchedulerError::PoolStopped);
            }
            let seq = queue.next_seq;
            queue.next_seq += 1;
            debug!(task = work.name(), priority = %work.priority(), "Task enqueued");
            queue.heap.push(QueuedTask {
                priority: work.priority(),
                scheduled_at: work.scheduled_at(),
                seq,
                work,
            });
        }
        self.available.notify_one();
        Ok(())
    }
}

/// Cloneable enqueue-only handle, used by the delay timer thread.
#[derive(Clone)]
pub(crate) struct PoolHandle {
    shared: Arc<PoolShared>,
}

impl PoolHandle {
    pub(crate) fn enqueue(&self, work: SharedWork) -> SchedulerResult<()> {
        self.shared.enqueue(work)
    }
}

/// Worker pool with dedicated OS threads.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Mutex<Vec<ThreadId>>,
    max_workers: usize,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("max_workers", &self.max_workers)
            .field("queue_len", &self.queue_len())
            .field("active_workers", &self.active_workers())
            .finish_non_exhaustive()
    }
}

impl ThreadPool {
    /// Spawn `config.worker_count` worker threads.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::WorkerSpawn` if a thread cannot be started; workers
    ///   already started are stopped and joined
    pub fn new(config: &SchedulerConfig) -> SchedulerResult<Self> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let pool = Self {
            shared: Arc::new(PoolShared {
                queue: Mutex::new(QueueState {
                    heap: BinaryHeap::new(),
                    stopped: false,
                    next_seq: 0,
                }),
                available: Condvar::new(),
                active: AtomicUsize::new(0),
            }),
            workers: Mutex::new(Vec::with_capacity(config.worker_count)),
            worker_ids: Mutex::new(Vec::with_capacity(config.worker_count)),
            max_workers: config.worker_count,
        };

        for worker_id in 0..config.worker_count {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{worker_id}", config.thread_name_prefix))
                .stack_size(config.thread_stack_size)
                .spawn(move || worker_loop(worker_id, &shared))?;
            pool.worker_ids.lock().push(handle.thread().id());
            pool.workers.lock().push(handle);
        }

        info!(worker_count = config.worker_count, "ThreadPool started");
        Ok(pool)
    }

    /// Pool with `worker_count` threads and default thread settings.
    ///
    /// # Errors
    ///
    /// See [`ThreadPool::new`].
    pub fn with_workers(worker_count: usize) -> SchedulerResult<Self> {
        Self::new(&SchedulerConfig::new().with_worker_count(worker_count))
    }

    /// Add a ready task and wake one idle worker.
    ///
    /// # Errors
    ///
    /// `SchedulerError::PoolStopped` once shutdown has begun.
    pub fn enqueue(&self, work: SharedWork) -> SchedulerResult<()> {
        self.shared.enqueue(work)
    }

    pub(crate) fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Tasks waiting in the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    /// Workers currently executing a task.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Configured number of workers.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.queue.lock().stopped
    }

    /// Stop accepting work, fail everything still queued, and join the workers.
    ///
    /// Returns how many queued tasks were abandoned. Tasks already running finish
    /// first. Concurrent callers all return only after the workers are joined;
    /// later calls are no-ops. When invoked from one of the pool's own workers
    /// nothing is joined and the owner's shutdown or drop joins them.
    pub fn shutdown(&self) -> usize {
        let (first, drained) = {
            let mut queue = self.shared.queue.lock();
            let first = !queue.stopped;
            queue.stopped = true;
            (first, std::mem::take(&mut queue.heap).into_vec())
        };
        self.shared.available.notify_all();

        let abandoned = drained
            .into_iter()
            .filter(|queued| queued.work.abandon())
            .inspect(|queued| warn!(task = queued.work.name(), "Queued task abandoned at shutdown"))
            .count();

        if self.worker_ids.lock().contains(&thread::current().id()) {
            debug!("Shutdown called from a worker; joins left to the owner");
            return abandoned;
        }

        // The guard is held through the joins so a concurrent caller blocks here
        // until every worker has exited.
        let mut workers = self.workers.lock();
        for (worker_id, worker) in workers.drain(..).enumerate() {
            if worker.join().is_err() {
                warn!(worker_id, "Worker panicked");
            }
        }
        drop(workers);

        if first {
            info!(abandoned, "ThreadPool shut down");
        }
        abandoned
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker_id: usize, shared: &PoolShared) {
    debug!(worker_id, "Worker thread started");
    loop {
        let work = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.stopped {
                    debug!(worker_id, "Worker thread exiting");
                    return;
                }
                if let Some(next) = queue.heap.pop() {
                    break next.work;
                }
                shared.available.wait(&mut queue);
            }
        };

        if work.status() == TaskStatus::Cancelled {
            debug!(worker_id, task = work.name(), "Skipping cancelled task");
            continue;
        }

        shared.active.fetch_add(1, Ordering::AcqRel);
        work.execute();
        shared.active.fetch_sub(1, Ordering::AcqRel);
        debug!(worker_id, task = work.name(), status = %work.status(), "Worker finished task");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Task, TaskOptions};
    use std::time::Duration;

    fn entry(priority: Priority, offset_ms: u64, seq: u64, base: Instant) -> QueuedTask {
        let work: SharedWork = Arc::new(Task::new(
            format!("t{seq}"),
            || Ok(()),
            TaskOptions::new()
                .with_priority(priority)
                .with_scheduled_at(base + Duration::from_millis(offset_ms)),
        ));
        QueuedTask {
            priority,
            scheduled_at: work.scheduled_at(),
            seq,
            work,
        }
    }

    fn drain_names(mut heap: BinaryHeap<QueuedTask>) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(next) = heap.pop() {
            names.push(next.work.name().to_owned());
        }
        names
    }

    #[test]
    fn test_priority_ordering() {
        let base = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(entry(Priority::Low, 0, 1, base));
        heap.push(entry(Priority::Critical, 0, 2, base));
        heap.push(entry(Priority::Medium, 0, 3, base));
        heap.push(entry(Priority::High, 0, 4, base));
        assert_eq!(drain_names(heap), ["t2", "t4", "t3", "t1"]);
    }

    #[test]
    fn test_earliest_scheduled_first_within_tier() {
        let base = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(entry(Priority::High, 30, 1, base));
        heap.push(entry(Priority::High, 10, 2, base));
        heap.push(entry(Priority::High, 20, 3, base));
        assert_eq!(drain_names(heap), ["t2", "t3", "t1"]);
    }

    #[test]
    fn test_fifo_on_full_tie() {
        let base = Instant::now();
        let mut heap = BinaryHeap::new();
        for seq in 0..5 {
            heap.push(entry(Priority::Medium, 0, seq, base));
        }
        assert_eq!(drain_names(heap), ["t0", "t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn test_enqueue_after_shutdown_fails() {
        let pool = ThreadPool::with_workers(1).unwrap();
        assert_eq!(pool.max_workers(), 1);
        pool.shutdown();
        assert!(pool.is_stopped());
        let work: SharedWork = Arc::new(Task::new("late", || Ok(()), TaskOptions::new()));
        assert!(matches!(pool.enqueue(work), Err(SchedulerError::PoolStopped)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ThreadPool::with_workers(0).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }
}
