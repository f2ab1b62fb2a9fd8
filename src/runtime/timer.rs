//! Timer driver.
//!
//! One dedicated thread owns a deadline-ordered binary heap and sleeps on a
//! condvar until the nearest deadline. Three entry kinds exist: plain
//! wakeups for `sleep`, deadline cancellations for `cancel_after`, and
//! repeating ticks feeding a ticker channel. Entries fire outside the heap
//! lock.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::Waker;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::channel::Channel;
use crate::runtime::record::RuntimeShared;
use crate::time::Tick;
use crate::types::{CancelReason, TaskId, TaskStateCell};

enum TimerKind {
    /// Wake a parked future.
    Wake(Waker),
    /// Cancel a task whose deadline elapsed.
    Cancel { task: TaskId, reason: CancelReason },
    /// Deliver a tick and reschedule at a fixed cadence.
    Tick {
        channel: Channel<Tick>,
        owner: Arc<TaskStateCell>,
        interval: Duration,
    },
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    kind: TimerKind,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the max-heap surfaces the earliest deadline.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerInner {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    changed: Condvar,
    shutdown: AtomicBool,
    seq: AtomicU64,
}

/// Shared handle to the timer thread.
#[derive(Clone)]
pub(crate) struct TimerHandle {
    inner: Arc<TimerInner>,
}

impl TimerHandle {
    /// Starts the driver thread. `shared` is held weakly so the driver does
    /// not keep the runtime alive.
    pub(crate) fn start(shared: Weak<RuntimeShared>) -> (Self, JoinHandle<()>) {
        let inner = Arc::new(TimerInner {
            heap: Mutex::new(BinaryHeap::new()),
            changed: Condvar::new(),
            shutdown: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        });
        let handle = Self {
            inner: Arc::clone(&inner),
        };
        let thread = std::thread::Builder::new()
            .name("weft-timer".into())
            .spawn(move || driver_loop(&inner, &shared))
            .expect("failed to spawn timer thread");
        (handle, thread)
    }

    fn push(&self, deadline: Instant, kind: TimerKind) {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let mut heap = self.inner.heap.lock();
        heap.push(TimerEntry {
            deadline,
            seq,
            kind,
        });
        self.inner.changed.notify_one();
    }

    /// Registers a one-shot wakeup.
    pub(crate) fn insert_wake(&self, deadline: Instant, waker: Waker) {
        self.push(deadline, TimerKind::Wake(waker));
    }

    /// Registers a deadline cancellation for `task`.
    pub(crate) fn insert_cancel(&self, deadline: Instant, task: TaskId, reason: CancelReason) {
        self.push(deadline, TimerKind::Cancel { task, reason });
    }

    /// Registers a repeating tick bound to `owner`'s lifetime.
    pub(crate) fn insert_tick(
        &self,
        first: Instant,
        channel: Channel<Tick>,
        owner: Arc<TaskStateCell>,
        interval: Duration,
    ) {
        self.push(
            first,
            TimerKind::Tick {
                channel,
                owner,
                interval,
            },
        );
    }

    /// Stops the driver thread. Pending entries are dropped.
    pub(crate) fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _heap = self.inner.heap.lock();
        self.inner.changed.notify_all();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("entries", &self.inner.heap.lock().len())
            .finish()
    }
}

fn driver_loop(inner: &TimerInner, shared: &Weak<RuntimeShared>) {
    loop {
        let entry = {
            let mut heap = inner.heap.lock();
            loop {
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                match heap.peek() {
                    None => {
                        inner.changed.wait(&mut heap);
                    }
                    Some(next) if next.deadline <= Instant::now() => {
                        break heap.pop().expect("peeked entry vanished");
                    }
                    Some(next) => {
                        let deadline = next.deadline;
                        let _ = inner.changed.wait_until(&mut heap, deadline);
                    }
                }
            }
        };
        fire(inner, shared, entry);
    }
}

fn fire(inner: &TimerInner, shared: &Weak<RuntimeShared>, entry: TimerEntry) {
    match entry.kind {
        TimerKind::Wake(waker) => waker.wake(),
        TimerKind::Cancel { task, reason } => {
            if let Some(shared) = shared.upgrade() {
                tracing::debug!(%task, %reason, "deadline elapsed, cancelling task");
                shared.cancel_task(task, reason);
            }
        }
        TimerKind::Tick {
            channel,
            owner,
            interval,
        } => {
            if owner.is_cancel_requested() || owner.get().is_terminal() {
                return;
            }
            // A full slot means the consumer is behind; the tick coalesces
            // rather than queueing up.
            if let Err(crate::error::TrySendError::Closed(_)) = channel.try_send(Tick) {
                return;
            }
            let seq = inner.seq.fetch_add(1, Ordering::Relaxed);
            let mut heap = inner.heap.lock();
            heap.push(TimerEntry {
                deadline: entry.deadline + interval,
                seq,
                kind: TimerKind::Tick {
                    channel,
                    owner,
                    interval,
                },
            });
            inner.changed.notify_one();
        }
    }
}
