//! Scheduler statistics and the settlement broadcast used by `wait_for_all`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::TaskStatus;

/// Point-in-time statistics of a scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Tasks ever registered.
    pub total_tasks: u64,
    /// Tasks whose callable returned a value.
    pub completed_tasks: u64,
    /// Tasks whose callable failed, or that were abandoned at shutdown.
    pub failed_tasks: u64,
    /// Tasks cancelled before running.
    pub cancelled_tasks: u64,
    /// Registered tasks currently pending.
    pub pending_tasks: usize,
    /// Registered tasks currently running.
    pub running_tasks: usize,
    /// Tasks waiting in the worker queue.
    pub queued_tasks: usize,
    /// Tasks waiting for their scheduled time.
    pub delayed_tasks: usize,
    /// Workers currently executing a task.
    pub active_workers: usize,
    /// Configured number of workers.
    pub max_workers: usize,
}

/// Settlement counters plus a broadcast signal, shared by every task of a scheduler.
#[derive(Debug, Default)]
pub(crate) struct CompletionTracker {
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    epoch: Mutex<u64>,
    changed: Condvar,
}

impl CompletionTracker {
    pub(crate) fn registered(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo [`registered`](Self::registered) for a task that never got dispatched.
    pub(crate) fn unregistered(&self) {
        self.total.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count a terminal transition. Called under the task's lock.
    pub(crate) fn count(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Completed => &self.completed,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Cancelled => &self.cancelled,
            TaskStatus::Pending | TaskStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Wake everyone blocked in [`wait_for_change`](Self::wait_for_change).
    pub(crate) fn notify_settled(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Current settlement epoch; read it before checking task states.
    pub(crate) fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Block until the epoch moves past `seen`. Returns `false` on timeout.
    pub(crate) fn wait_for_change(&self, seen: u64, deadline: Option<Instant>) -> bool {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut epoch, deadline).timed_out() {
                        return *epoch != seen;
                    }
                }
                None => self.changed.wait(&mut epoch),
            }
        }
        true
    }

    /// Snapshot of the counters; the live fields are left at zero.
    pub(crate) fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            total_tasks: self.total.load(Ordering::Relaxed),
            completed_tasks: self.completed.load(Ordering::Relaxed),
            failed_tasks: self.failed.load(Ordering::Relaxed),
            cancelled_tasks: self.cancelled.load(Ordering::Relaxed),
            ..SchedulerStats::default()
        }
    }
}
