//! Join handles.
//!
//! A handle is the only way to get a task's typed result. The result is
//! delivered through a [`JoinSlot`] filled exactly once at finalization;
//! joining consumes the handle, so the value is never cloned.

use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::runtime::record::RuntimeShared;
use crate::types::{CancelReason, TaskId, TaskState, TaskStateCell};

enum SlotState<T> {
    Pending(Vec<Waker>),
    Ready(Option<Result<T>>),
}

/// One-shot result slot shared between a task's harness and its handle.
pub(crate) struct JoinSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> JoinSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending(Vec::new())),
        }
    }

    /// Stores the result and wakes every waiter. Later fills are ignored.
    pub(crate) fn fill(&self, result: Result<T>) {
        let wakers = {
            let mut state = self.state.lock();
            match &mut *state {
                SlotState::Pending(wakers) => {
                    let wakers = std::mem::take(wakers);
                    *state = SlotState::Ready(Some(result));
                    wakers
                }
                SlotState::Ready(_) => return,
            }
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Takes the result out, registering `waker` while pending.
    pub(crate) fn poll_take(&self, waker: &Waker) -> Poll<Result<T>> {
        let mut state = self.state.lock();
        match &mut *state {
            SlotState::Pending(wakers) => {
                if !wakers.iter().any(|w| w.will_wake(waker)) {
                    wakers.push(waker.clone());
                }
                Poll::Pending
            }
            SlotState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                // The value was already taken by an earlier join.
                None => Poll::Ready(Err(Error::closed())),
            },
        }
    }
}

impl<T: Clone> JoinSlot<T> {
    /// Clones the result out, leaving it for other waiters.
    pub(crate) fn poll_clone(&self, waker: &Waker) -> Poll<Result<T>> {
        let mut state = self.state.lock();
        match &mut *state {
            SlotState::Pending(wakers) => {
                if !wakers.iter().any(|w| w.will_wake(waker)) {
                    wakers.push(waker.clone());
                }
                Poll::Pending
            }
            SlotState::Ready(result) => match result {
                Some(result) => Poll::Ready(result.clone()),
                None => Poll::Ready(Err(Error::closed())),
            },
        }
    }
}

impl<T> std::fmt::Debug for JoinSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready = matches!(&*self.state.lock(), SlotState::Ready(_));
        f.debug_struct("JoinSlot").field("ready", &ready).finish()
    }
}

/// Owner's view of a spawned task.
///
/// Dropping the handle detaches the task; it keeps running under its scope.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    state: Arc<TaskStateCell>,
    slot: Arc<JoinSlot<T>>,
    shared: Arc<RuntimeShared>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        id: TaskId,
        state: Arc<TaskStateCell>,
        slot: Arc<JoinSlot<T>>,
        shared: Arc<RuntimeShared>,
    ) -> Self {
        Self {
            id,
            state,
            slot,
            shared,
        }
    }

    /// The task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Snapshot of the task's lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Returns true once the task reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.get().is_terminal()
    }

    /// Requests cancellation of the task and its subtree.
    pub fn cancel(&self, reason: CancelReason) {
        self.shared.cancel_task(self.id, reason);
    }

    /// Requests cancellation once `after` has elapsed, unless the task
    /// finished first.
    pub fn cancel_after(&self, after: Duration, reason: CancelReason) {
        self.shared
            .timer
            .insert_cancel(Instant::now() + after, self.id, reason);
    }

    /// Waits for the task and returns its result.
    ///
    /// This is a suspension point for the caller: if the caller's own task
    /// is cancelled while waiting, `join` returns the caller's cancellation
    /// error and the joined task keeps running.
    pub async fn join(self, cx: &Cx) -> Result<T> {
        let slot = self.slot;
        poll_fn(move |ctx| {
            cx.checkpoint()?;
            slot.poll_take(ctx.waker())
        })
        .await
    }

    /// Explicitly detaches the task. Equivalent to dropping the handle.
    pub fn detach(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::Wake;

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_waker() -> Waker {
        Waker::from(Arc::new(NoopWaker))
    }

    #[test]
    fn slot_delivers_once() {
        let slot: JoinSlot<u32> = JoinSlot::new();
        let waker = noop_waker();
        assert!(slot.poll_take(&waker).is_pending());
        slot.fill(Ok(5));
        assert!(matches!(slot.poll_take(&waker), Poll::Ready(Ok(5))));
        // A second take observes the slot as drained.
        assert!(matches!(slot.poll_take(&waker), Poll::Ready(Err(_))));
    }

    #[test]
    fn slot_clone_leaves_value() {
        let slot: JoinSlot<u32> = JoinSlot::new();
        slot.fill(Ok(7));
        let waker = noop_waker();
        assert!(matches!(slot.poll_clone(&waker), Poll::Ready(Ok(7))));
        assert!(matches!(slot.poll_clone(&waker), Poll::Ready(Ok(7))));
    }

    #[test]
    fn late_fill_is_ignored() {
        let slot: JoinSlot<u32> = JoinSlot::new();
        slot.fill(Ok(1));
        slot.fill(Ok(2));
        let waker = noop_waker();
        assert!(matches!(slot.poll_take(&waker), Poll::Ready(Ok(1))));
    }
}
