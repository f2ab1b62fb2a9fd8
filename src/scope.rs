//! Scopes: the structured-concurrency surface.
//!
//! A scope anchors a subtree of tasks. Work enters through [`Scope::spawn`],
//! nesting happens through [`Scope::child_scope`], and the scope ends by
//! being joined (waits for every child) or cancelled (the whole subtree
//! observes it). No task outlives its scope.

use std::future::{poll_fn, Future};
use std::sync::Arc;

use crate::cx::Cx;
use crate::dispatch::{Dispatcher, ScheduledTask};
use crate::error::{Error, Result, SpawnError};
use crate::runtime::handle::JoinSlot;
use crate::runtime::harness::TaskHarness;
use crate::runtime::record::{RecordKind, RuntimeShared, Verdict};
use crate::runtime::TaskHandle;
use crate::types::{CancelReason, Supervision, TaskId, TaskState, TaskStateCell};

#[derive(Debug)]
struct ScopeInner {
    root: TaskId,
    root_state: Arc<TaskStateCell>,
    root_slot: Arc<JoinSlot<()>>,
    dispatcher: Dispatcher,
    supervision: Supervision,
    shared: Arc<RuntimeShared>,
}

/// A handle to a task subtree. Cloning shares the scope.
#[derive(Debug, Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Registers the scope's root record. `parent` carries the enclosing
    /// root and the enclosing scope's supervision (which governs how THIS
    /// scope's failure affects it).
    pub(crate) fn create(
        shared: Arc<RuntimeShared>,
        parent: Option<(TaskId, Supervision)>,
        dispatcher: Dispatcher,
        supervision: Supervision,
    ) -> std::result::Result<Self, SpawnError> {
        let root_state = Arc::new(TaskStateCell::new());
        let root_slot: Arc<JoinSlot<()>> = Arc::new(JoinSlot::new());
        let slot = Arc::clone(&root_slot);
        let finalizer = Box::new(move |verdict: Verdict| {
            slot.fill(match verdict {
                Verdict::Completed => Ok(()),
                Verdict::Failed(err) => Err(err),
                Verdict::Cancelled(reason) => Err(Error::cancelled(reason)),
            });
        });
        let (parent_id, record_supervision) = match parent {
            Some((id, enclosing)) => (Some(id), enclosing),
            None => (None, supervision),
        };
        let root = shared.register(
            RecordKind::Root,
            parent_id,
            record_supervision,
            dispatcher,
            Arc::clone(&root_state),
            Some(finalizer),
        )?;
        tracing::debug!(scope = %root, %dispatcher, %supervision, "scope opened");
        Ok(Self {
            inner: Arc::new(ScopeInner {
                root,
                root_state,
                root_slot,
                dispatcher,
                supervision,
                shared,
            }),
        })
    }

    /// The scope root's task id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.inner.root
    }

    /// The default dispatcher for tasks spawned here.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        self.inner.dispatcher
    }

    /// The supervision strategy applied to this scope's children.
    #[must_use]
    pub fn supervision(&self) -> Supervision {
        self.inner.supervision
    }

    /// Lifecycle state of the scope root.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.root_state.get()
    }

    /// Spawns a task on the scope's default dispatcher.
    ///
    /// The closure runs immediately on the calling thread to build the
    /// body; the body itself is scheduled onto the dispatcher.
    pub fn spawn<F, Fut, T>(&self, f: F) -> std::result::Result<TaskHandle<T>, SpawnError>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_on(self.inner.dispatcher, f)
    }

    /// Spawns a task on an explicit dispatcher.
    pub fn spawn_on<F, Fut, T>(
        &self,
        dispatcher: Dispatcher,
        f: F,
    ) -> std::result::Result<TaskHandle<T>, SpawnError>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let shared = &self.inner.shared;
        let state = Arc::new(TaskStateCell::new());
        let id = shared.register(
            RecordKind::Task,
            Some(self.inner.root),
            self.inner.supervision,
            dispatcher,
            Arc::clone(&state),
            None,
        )?;
        let slot = Arc::new(JoinSlot::new());
        let cx = Cx::new(id, Arc::clone(&state), Arc::clone(shared));
        let body = f(cx.clone());
        let harness = TaskHarness::new(cx, body, Arc::clone(&slot));
        let task = Arc::new(ScheduledTask::new(
            id,
            dispatcher,
            Arc::downgrade(&shared.registry),
            Box::pin(harness),
        ));
        shared.registry.schedule(task);
        Ok(TaskHandle::new(id, state, slot, Arc::clone(shared)))
    }

    /// Opens a nested scope whose root is a child of this scope's root.
    ///
    /// The child scope picks its own supervision for its tasks; whether the
    /// child scope's failure spreads into this scope is governed by this
    /// scope's strategy.
    pub fn child_scope(&self, supervision: Supervision) -> std::result::Result<Self, SpawnError> {
        Self::create(
            Arc::clone(&self.inner.shared),
            Some((self.inner.root, self.inner.supervision)),
            self.inner.dispatcher,
            supervision,
        )
    }

    /// Requests cancellation of every task in the scope.
    pub fn cancel(&self, reason: CancelReason) {
        self.inner.shared.cancel_task(self.inner.root, reason);
    }

    /// Closes the scope to new spawns and waits for every task in it.
    ///
    /// Returns the scope's verdict: `Ok` when all children completed, the
    /// first propagated failure, or the cancellation error. A suspension
    /// point for the caller.
    pub async fn join(&self, cx: &Cx) -> Result<()> {
        self.inner.shared.close_root(self.inner.root);
        let slot = Arc::clone(&self.inner.root_slot);
        poll_fn(move |ctx| {
            cx.checkpoint()?;
            slot.poll_clone(ctx.waker())
        })
        .await
    }
}
