//! The schedulable unit: a spawned future plus its wake-to-queue glue.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};

use parking_lot::{Mutex, MutexGuard};

use crate::dispatch::{Dispatcher, Registry};
use crate::types::TaskId;

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A spawned task as the dispatch layer sees it.
///
/// The future slot is taken to `None` once the future completes, so late
/// wakeups become no-ops. The `queued` flag deduplicates wakeups: a task is
/// on at most one run queue at a time.
pub(crate) struct ScheduledTask {
    id: TaskId,
    dispatcher: Dispatcher,
    registry: Weak<Registry>,
    future: Mutex<Option<TaskFuture>>,
    queued: AtomicBool,
}

impl ScheduledTask {
    pub(crate) fn new(
        id: TaskId,
        dispatcher: Dispatcher,
        registry: Weak<Registry>,
        future: TaskFuture,
    ) -> Self {
        Self {
            id,
            dispatcher,
            registry,
            future: Mutex::new(Some(future)),
            queued: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn dispatcher(&self) -> Dispatcher {
        self.dispatcher
    }

    /// Marks the task queued. Returns `false` if it already was, in which
    /// case the caller must not enqueue it again.
    pub(crate) fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Ordering::AcqRel)
    }

    /// Polls the task once on the current thread.
    pub(crate) fn run(self: Arc<Self>) {
        let slot = self.future.lock();
        self.poll_slot(slot);
    }

    /// Polls the task inline if its future is free, otherwise falls back to
    /// the general pool. Used by the unconfined dispatcher, where a wakeup
    /// may arrive re-entrantly while the task is being polled.
    pub(crate) fn run_inline(self: Arc<Self>, registry: &Registry) {
        if let Some(slot) = self.future.try_lock() {
            self.poll_slot(slot);
            return;
        }
        registry.push_general(self);
    }

    /// The queued flag is cleared under the future lock before polling, so a
    /// wakeup arriving mid-poll re-enqueues the task rather than being lost.
    fn poll_slot(self: &Arc<Self>, mut slot: MutexGuard<'_, Option<TaskFuture>>) {
        self.queued.store(false, Ordering::Release);
        let Some(future) = slot.as_mut() else {
            return;
        };
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        if let Poll::Ready(()) = future.as_mut().poll(&mut cx) {
            *slot = None;
        }
    }
}

impl Wake for ScheduledTask {
    fn wake(self: Arc<Self>) {
        if let Some(registry) = self.registry.upgrade() {
            registry.schedule(self);
        }
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Arc::clone(self).wake();
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("dispatcher", &self.dispatcher)
            .field("queued", &self.queued.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
