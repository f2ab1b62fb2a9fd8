//! The task table: parent/child links, cancellation fan-out, failure
//! propagation, and finalization.
//!
//! Every live task or scope root has one [`TaskRecord`] in a generation-
//! checked arena behind a single mutex. All structural transitions (cancel
//! fan-out, failure propagation, finalization cascades) happen under that
//! one lock, so an observer never sees a half-cancelled subtree. Wakers and
//! finalizers collected during a transition are invoked only after the lock
//! is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Waker;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::dispatch::{Dispatcher, Registry};
use crate::error::{Error, SpawnError};
use crate::runtime::timer::TimerHandle;
use crate::types::{CancelKind, CancelReason, Supervision, TaskId, TaskState, TaskStateCell};
use crate::util::Arena;

/// What kind of record this is.
///
/// A `Root` is the anchor of a scope: its "body" is synthetic (set when the
/// scope is joined), so its verdict comes from its children. A `Task` owns a
/// real future, and its verdict comes from that future's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind {
    Root,
    Task,
}

/// Outcome of a task's own future.
#[derive(Debug, Clone)]
pub(crate) enum BodySummary {
    Ok,
    Err(Error),
}

/// Final judgement on a record, produced exactly once at finalization.
#[derive(Debug, Clone)]
pub(crate) enum Verdict {
    Completed,
    Failed(Error),
    Cancelled(CancelReason),
}

type Finalizer = Box<dyn FnOnce(Verdict) + Send>;

pub(crate) struct TaskRecord {
    id: TaskId,
    kind: RecordKind,
    parent: Option<TaskId>,
    children: SmallVec<[TaskId; 4]>,
    /// How this record's failure affects its parent.
    supervision: Supervision,
    dispatcher: Dispatcher,
    state: Arc<TaskStateCell>,
    cancel_reason: Option<CancelReason>,
    /// First propagated child failure, reported at finalization.
    inherited_failure: Option<Error>,
    /// `Some` once the body finished (or the root was closed).
    body: Option<BodySummary>,
    /// Wakes the task's scheduler slot; refreshed on every poll.
    schedule_waker: Option<Waker>,
    finalizer: Option<Finalizer>,
}

impl TaskRecord {
    fn ready_to_finalize(&self) -> bool {
        if !self.children.is_empty() {
            return false;
        }
        // A cancelled root needs no explicit close: once its children are
        // gone it settles on its own, so an unjoined cancelled scope still
        // reaches a terminal state.
        self.body.is_some()
            || (self.kind == RecordKind::Root && self.state.is_cancel_requested())
    }

    fn verdict(&self) -> Verdict {
        match self.kind {
            RecordKind::Task => match &self.body {
                Some(BodySummary::Err(err)) if err.is_cancelled() => Verdict::Cancelled(
                    err.cancel_reason()
                        .cloned()
                        .or_else(|| self.cancel_reason.clone())
                        .unwrap_or_default(),
                ),
                Some(BodySummary::Err(err)) => Verdict::Failed(err.clone()),
                // A body that returned a value keeps it even if cancellation
                // raced with completion.
                _ => Verdict::Completed,
            },
            RecordKind::Root => {
                if let Some(err) = &self.inherited_failure {
                    Verdict::Failed(err.clone())
                } else if self.state.is_cancel_requested() {
                    Verdict::Cancelled(self.cancel_reason.clone().unwrap_or_default())
                } else {
                    Verdict::Completed
                }
            }
        }
    }
}

/// State shared by the runtime, every `Cx`, and every handle.
pub(crate) struct RuntimeShared {
    pub(crate) registry: Arc<Registry>,
    pub(crate) timer: TimerHandle,
    tasks: Mutex<Arena<TaskRecord>>,
    accepting: AtomicBool,
}

impl RuntimeShared {
    pub(crate) fn new(registry: Arc<Registry>, timer: TimerHandle) -> Self {
        Self {
            registry,
            timer,
            tasks: Mutex::new(Arena::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Registers a new record under `parent` (or as a top-level root).
    ///
    /// Spawning under a closed parent fails. Spawning under a cancelling
    /// parent succeeds but the child starts life already cancelling, so its
    /// first checkpoint observes the cancellation.
    pub(crate) fn register(
        &self,
        kind: RecordKind,
        parent: Option<TaskId>,
        supervision: Supervision,
        dispatcher: Dispatcher,
        state: Arc<TaskStateCell>,
        finalizer: Option<Finalizer>,
    ) -> Result<TaskId, SpawnError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SpawnError::Shutdown);
        }
        let mut table = self.tasks.lock();
        let inherited = match parent {
            None => None,
            Some(parent_id) => {
                let Some(parent_record) = table.get(parent_id.arena_index()) else {
                    return Err(SpawnError::ScopeClosed);
                };
                if parent_record.body.is_some() || parent_record.state.get().is_terminal() {
                    return Err(SpawnError::ScopeClosed);
                }
                if parent_record.state.is_cancel_requested() {
                    Some(inherit_reason(parent_record.cancel_reason.as_ref()))
                } else {
                    None
                }
            }
        };
        let index = table.insert_with(|index| TaskRecord {
            id: TaskId::from_arena(index),
            kind,
            parent,
            children: SmallVec::new(),
            supervision,
            dispatcher,
            state: Arc::clone(&state),
            cancel_reason: inherited.clone(),
            inherited_failure: None,
            body: None,
            schedule_waker: None,
            finalizer,
        });
        let id = TaskId::from_arena(index);
        if let Some(parent_id) = parent {
            if let Some(parent_record) = table.get_mut(parent_id.arena_index()) {
                parent_record.children.push(id);
            }
        }
        if inherited.is_some() {
            state.request_cancel();
        }
        tracing::trace!(task = %id, ?kind, %dispatcher, "registered");
        Ok(id)
    }

    /// Stores the waker that re-queues the task, called on every poll.
    pub(crate) fn set_schedule_waker(&self, id: TaskId, waker: Waker) {
        let mut table = self.tasks.lock();
        if let Some(record) = table.get_mut(id.arena_index()) {
            record.schedule_waker = Some(waker);
        }
    }

    /// Returns the dispatcher a record was registered with.
    pub(crate) fn dispatcher_of(&self, id: TaskId) -> Option<Dispatcher> {
        self.tasks
            .lock()
            .get(id.arena_index())
            .map(|record| record.dispatcher)
    }

    /// Returns the recorded cancellation reason for a live record.
    pub(crate) fn cancel_reason(&self, id: TaskId) -> Option<CancelReason> {
        self.tasks
            .lock()
            .get(id.arena_index())
            .and_then(|record| record.cancel_reason.clone())
    }

    /// Requests cancellation of `id` and its whole subtree.
    ///
    /// The fan-out happens under one table lock, so after this returns every
    /// descendant is at least `Cancelling` (or already terminal). Wakers
    /// fire after the lock drops.
    pub(crate) fn cancel_task(&self, id: TaskId, reason: CancelReason) {
        let mut wakers = Vec::new();
        {
            let mut table = self.tasks.lock();
            cancel_locked(&mut table, id, reason, &mut wakers);
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Records the outcome of a task body (or closes a root) and finalizes
    /// everything that became ready.
    pub(crate) fn finish_body(&self, id: TaskId, summary: BodySummary) {
        let mut wakers = Vec::new();
        let mut finalizers: Vec<(Finalizer, Verdict)> = Vec::new();
        {
            let mut table = self.tasks.lock();
            match table.get_mut(id.arena_index()) {
                Some(record) => {
                    if record.body.is_none() {
                        record.body = Some(summary);
                    }
                }
                None => return,
            }
            let mut worklist = vec![id];
            while let Some(id) = worklist.pop() {
                let ready = table
                    .get(id.arena_index())
                    .is_some_and(TaskRecord::ready_to_finalize);
                if !ready {
                    continue;
                }
                let mut record = table
                    .remove(id.arena_index())
                    .expect("record checked above");
                let verdict = record.verdict();
                let terminal = match &verdict {
                    Verdict::Completed => TaskState::Completed,
                    Verdict::Failed(_) => TaskState::Failed,
                    Verdict::Cancelled(_) => TaskState::Cancelled,
                };
                record.state.finish(terminal);
                tracing::debug!(task = %record.id, state = %terminal, "finalized");
                if let Some(finalizer) = record.finalizer.take() {
                    finalizers.push((finalizer, verdict.clone()));
                }
                let Some(parent_id) = record.parent else {
                    continue;
                };
                let mut propagate: Option<Error> = None;
                if let Some(parent_record) = table.get_mut(parent_id.arena_index()) {
                    parent_record.children.retain(|child| *child != id);
                    if let Verdict::Failed(err) = &verdict {
                        if record.supervision.propagates() {
                            if parent_record.inherited_failure.is_none() {
                                parent_record.inherited_failure = Some(err.clone());
                            }
                            propagate = Some(err.clone());
                        }
                    }
                }
                if let Some(err) = propagate {
                    tracing::debug!(task = %id, parent = %parent_id, %err, "failure propagating");
                    // Direct siblings observe the sibling failure; their own
                    // subtrees see it as a parent cancellation.
                    let siblings = cancel_node(
                        &mut table,
                        parent_id,
                        &CancelReason::sibling_failed(),
                        &mut wakers,
                    );
                    for sibling in siblings {
                        cancel_locked(
                            &mut table,
                            sibling,
                            CancelReason::sibling_failed(),
                            &mut wakers,
                        );
                    }
                }
                // The child removal (and a propagated cancellation) may have
                // made the parent ready; the next iteration finalizes it.
                if table
                    .get(parent_id.arena_index())
                    .is_some_and(TaskRecord::ready_to_finalize)
                {
                    worklist.push(parent_id);
                }
            }
        }
        for waker in wakers {
            waker.wake();
        }
        for (finalizer, verdict) in finalizers {
            finalizer(verdict);
        }
    }

    /// Marks a scope root as closing. Idempotent.
    pub(crate) fn close_root(&self, id: TaskId) {
        self.finish_body(id, BodySummary::Ok);
    }

    /// Stops accepting spawns and cancels every top-level root.
    pub(crate) fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        let mut wakers = Vec::new();
        {
            let mut table = self.tasks.lock();
            let roots: Vec<TaskId> = table
                .iter()
                .filter(|(_, record)| record.parent.is_none())
                .map(|(index, _)| TaskId::from_arena(index))
                .collect();
            for root in roots {
                cancel_locked(&mut table, root, CancelReason::shutdown(), &mut wakers);
            }
        }
        for waker in wakers {
            waker.wake();
        }
    }
}

impl std::fmt::Debug for RuntimeShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeShared")
            .field("live_tasks", &self.tasks.lock().len())
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// The reason a child sees when its parent's cancellation reaches it.
/// Shutdown propagates as itself; everything else becomes structural.
fn inherit_reason(parent: Option<&CancelReason>) -> CancelReason {
    match parent {
        Some(reason) if reason.kind() == CancelKind::Shutdown => reason.clone(),
        _ => CancelReason::parent_cancelled(),
    }
}

/// Cancels one record in place and returns its children, empty when the
/// record is gone or already terminal. Callers pick the reason each child
/// observes.
fn cancel_node(
    table: &mut Arena<TaskRecord>,
    id: TaskId,
    reason: &CancelReason,
    wakers: &mut Vec<Waker>,
) -> SmallVec<[TaskId; 4]> {
    let Some(record) = table.get_mut(id.arena_index()) else {
        return SmallVec::new();
    };
    if record.state.get().is_terminal() {
        return SmallVec::new();
    }
    match &mut record.cancel_reason {
        Some(existing) => {
            existing.strengthen(reason);
        }
        None => record.cancel_reason = Some(reason.clone()),
    }
    record.state.request_cancel();
    if let Some(waker) = record.schedule_waker.take() {
        wakers.push(waker);
    }
    record.children.clone()
}

fn cancel_locked(
    table: &mut Arena<TaskRecord>,
    id: TaskId,
    reason: CancelReason,
    wakers: &mut Vec<Waker>,
) {
    let mut worklist = vec![(id, reason)];
    while let Some((id, reason)) = worklist.pop() {
        let child_reason = inherit_reason(Some(&reason));
        for child in cancel_node(table, id, &reason, wakers) {
            worklist.push((child, child_reason.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RegistryConfig;

    fn shared() -> (Arc<RuntimeShared>, Vec<std::thread::JoinHandle<()>>) {
        let (registry, handles) = Registry::start(&RegistryConfig {
            general_threads: 1,
            io_threads: 1,
            ui_thread: false,
            thread_name_prefix: "record-test".into(),
        });
        let shared = Arc::new_cyclic(|weak| {
            let (timer, _thread) = TimerHandle::start(weak.clone());
            RuntimeShared::new(registry, timer)
        });
        (shared, handles)
    }

    fn register_task(
        shared: &RuntimeShared,
        parent: Option<TaskId>,
        kind: RecordKind,
    ) -> (TaskId, Arc<TaskStateCell>) {
        let state = Arc::new(TaskStateCell::new());
        let id = shared
            .register(
                kind,
                parent,
                Supervision::Propagate,
                Dispatcher::General,
                Arc::clone(&state),
                None,
            )
            .unwrap();
        (id, state)
    }

    #[test]
    fn cancel_reaches_whole_subtree() {
        let (shared, _handles) = shared();
        let (root, root_state) = register_task(&shared, None, RecordKind::Root);
        let (child, child_state) = register_task(&shared, Some(root), RecordKind::Root);
        let (grandchild, grandchild_state) = register_task(&shared, Some(child), RecordKind::Task);

        shared.cancel_task(root, CancelReason::user("stop"));

        assert!(root_state.is_cancel_requested());
        assert!(child_state.is_cancel_requested());
        assert!(grandchild_state.is_cancel_requested());
        assert_eq!(
            shared.cancel_reason(root).unwrap().kind(),
            CancelKind::User
        );
        assert_eq!(
            shared.cancel_reason(grandchild).unwrap().kind(),
            CancelKind::ParentCancelled
        );
        let _ = child;
    }

    #[test]
    fn child_failure_propagates_to_siblings_and_parent() {
        let (shared, _handles) = shared();
        let (root, root_state) = register_task(&shared, None, RecordKind::Root);
        let (failing, _failing_state) = register_task(&shared, Some(root), RecordKind::Task);
        let (sibling, sibling_state) = register_task(&shared, Some(root), RecordKind::Task);

        shared.finish_body(failing, BodySummary::Err(Error::msg("boom")));

        assert!(root_state.is_cancel_requested());
        assert!(sibling_state.is_cancel_requested());
        assert_eq!(
            shared.cancel_reason(root).unwrap().kind(),
            CancelKind::SiblingFailed
        );

        // Sibling acknowledges and the root can then close as failed.
        shared.finish_body(
            sibling,
            BodySummary::Err(Error::cancelled(CancelReason::parent_cancelled())),
        );
        shared.close_root(root);
        assert_eq!(root_state.get(), TaskState::Failed);
    }

    #[test]
    fn isolated_failure_does_not_spread() {
        let (shared, _handles) = shared();
        let (root, root_state) = register_task(&shared, None, RecordKind::Root);
        let failing_state = Arc::new(TaskStateCell::new());
        let failing = shared
            .register(
                RecordKind::Task,
                Some(root),
                Supervision::Isolate,
                Dispatcher::General,
                Arc::clone(&failing_state),
                None,
            )
            .unwrap();
        let (_sibling, sibling_state) = register_task(&shared, Some(root), RecordKind::Task);

        shared.finish_body(failing, BodySummary::Err(Error::msg("boom")));

        assert_eq!(failing_state.get(), TaskState::Failed);
        assert!(!root_state.is_cancel_requested());
        assert!(!sibling_state.is_cancel_requested());
    }

    #[test]
    fn spawn_under_closed_parent_is_rejected() {
        let (shared, _handles) = shared();
        let (root, _root_state) = register_task(&shared, None, RecordKind::Root);
        shared.close_root(root);
        let err = shared
            .register(
                RecordKind::Task,
                Some(root),
                Supervision::Propagate,
                Dispatcher::General,
                Arc::new(TaskStateCell::new()),
                None,
            )
            .unwrap_err();
        assert_eq!(err, SpawnError::ScopeClosed);
    }

    #[test]
    fn spawn_under_cancelling_parent_starts_cancelling() {
        let (shared, _handles) = shared();
        let (root, _root_state) = register_task(&shared, None, RecordKind::Root);
        shared.cancel_task(root, CancelReason::user("stop"));
        let (child, child_state) = register_task(&shared, Some(root), RecordKind::Task);
        assert!(child_state.is_cancel_requested());
        assert_eq!(
            shared.cancel_reason(child).unwrap().kind(),
            CancelKind::ParentCancelled
        );
    }

    #[test]
    fn completed_body_wins_over_late_cancel() {
        let (shared, _handles) = shared();
        let (root, _root_state) = register_task(&shared, None, RecordKind::Root);
        let (task, task_state) = register_task(&shared, Some(root), RecordKind::Task);
        task_state.request_cancel();
        shared.finish_body(task, BodySummary::Ok);
        assert_eq!(task_state.get(), TaskState::Completed);
    }

    #[test]
    fn root_settles_when_its_last_child_fails() {
        let (shared, _handles) = shared();
        let (root, root_state) = register_task(&shared, None, RecordKind::Root);
        let (task, _task_state) = register_task(&shared, Some(root), RecordKind::Task);

        shared.finish_body(task, BodySummary::Err(Error::msg("boom")));

        // No join needed: losing its only child finalizes the root.
        assert_eq!(root_state.get(), TaskState::Failed);
    }

    #[test]
    fn sibling_failure_reason_stops_at_the_first_level() {
        let (shared, _handles) = shared();
        let (root, _root_state) = register_task(&shared, None, RecordKind::Root);
        let (failing, _failing_state) = register_task(&shared, Some(root), RecordKind::Task);
        let (sibling, _sibling_state) = register_task(&shared, Some(root), RecordKind::Root);
        let (nested, _nested_state) = register_task(&shared, Some(sibling), RecordKind::Task);

        shared.finish_body(failing, BodySummary::Err(Error::msg("boom")));

        assert_eq!(
            shared.cancel_reason(sibling).unwrap().kind(),
            CancelKind::SiblingFailed
        );
        assert_eq!(
            shared.cancel_reason(nested).unwrap().kind(),
            CancelKind::ParentCancelled
        );
    }

    #[test]
    fn shutdown_rejects_spawns_and_cancels_roots() {
        let (shared, _handles) = shared();
        let (_root, root_state) = register_task(&shared, None, RecordKind::Root);
        shared.shutdown();
        assert!(root_state.is_cancel_requested());
        let err = shared
            .register(
                RecordKind::Root,
                None,
                Supervision::Propagate,
                Dispatcher::General,
                Arc::new(TaskStateCell::new()),
                None,
            )
            .unwrap_err();
        assert_eq!(err, SpawnError::Shutdown);
    }
}
