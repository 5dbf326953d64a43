//! Delay timer: one thread holding future-dated tasks in a min-heap by due time.
//!
//! The thread sleeps on a `Condvar` until the earliest entry is due (or a new,
//! earlier entry arrives), then hands the task to the worker pool. Tasks cancelled
//! while waiting are dropped here and keep their cancelled status.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::core::thread_pool::{PoolHandle, SharedWork};
use crate::core::{SchedulerError, SchedulerResult, TaskStatus};

struct Delayed {
    due: Instant,
    seq: u64,
    work: SharedWork,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the earliest due entry sits on top of the max-heap.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerState {
    heap: BinaryHeap<Delayed>,
    stopped: bool,
    next_seq: u64,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

pub(crate) struct DelayTimer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DelayTimer {
    /// Start the timer thread, dispatching due tasks into `pool`.
    pub(crate) fn start(pool: PoolHandle, thread_name: String) -> SchedulerResult<Self> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                stopped: false,
                next_seq: 0,
            }),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || timer_loop(&thread_shared, &pool))?;
        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Hold `work` until its scheduled time.
    pub(crate) fn schedule(&self, work: SharedWork) -> SchedulerResult<()> {
        let mut state = self.shared.state.lock();
        if state.stopped {
            return Err(SchedulerError::PoolStopped);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = work.scheduled_at();
        let wake = state.heap.peek().is_none_or(|head| due < head.due);
        debug!(task = work.name(), "Task deferred until scheduled time");
        state.heap.push(Delayed { due, seq, work });
        drop(state);
        if wake {
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Entries still waiting for their due time.
    pub(crate) fn len(&self) -> usize {
        self.shared.state.lock().heap.len()
    }

    /// Stop the thread and fail every task still waiting. Returns how many were failed.
    pub(crate) fn shutdown(&self) -> usize {
        let drained = {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            std::mem::take(&mut state.heap).into_vec()
        };
        self.shared.wake.notify_all();

        let abandoned = drained
            .into_iter()
            .filter(|delayed| delayed.work.abandon())
            .inspect(|delayed| {
                warn!(task = delayed.work.name(), "Delayed task abandoned at shutdown");
            })
            .count();

        // Joined under the guard so concurrent callers return after the thread exits.
        let mut slot = self.thread.lock();
        if let Some(handle) = slot.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Timer thread panicked");
            }
        }
        drop(slot);
        abandoned
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer_loop(shared: &TimerShared, pool: &PoolHandle) {
    let mut state = shared.state.lock();
    loop {
        if state.stopped {
            debug!("Timer thread exiting");
            return;
        }
        let Some(due) = state.heap.peek().map(|head| head.due) else {
            shared.wake.wait(&mut state);
            continue;
        };
        if due > Instant::now() {
            let _ = shared.wake.wait_until(&mut state, due);
            continue;
        }
        if let Some(entry) = state.heap.pop() {
            MutexGuard::unlocked(&mut state, || dispatch(entry.work, pool));
        }
    }
}

fn dispatch(work: SharedWork, pool: &PoolHandle) {
    if work.status() != TaskStatus::Pending {
        debug!(task = work.name(), status = %work.status(), "Due task no longer pending; dropped");
        return;
    }
    if let Err(err) = pool.enqueue(Arc::clone(&work)) {
        if work.abandon() {
            warn!(task = work.name(), error = %err, "Due task abandoned");
        }
    }
}
