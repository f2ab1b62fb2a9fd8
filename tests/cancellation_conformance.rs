#![allow(missing_docs)]
//! Cancellation semantics: subtree reach, cooperation, and terminal states.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use common::test_runtime;
use weft::{CancelKind, CancelReason, Supervision, TaskState};

#[test]
fn cancelling_a_scope_reaches_nested_scopes() {
    let runtime = test_runtime();
    let outer = runtime.scope(Supervision::Propagate).unwrap();
    let middle = outer.child_scope(Supervision::Propagate).unwrap();
    let inner = middle.child_scope(Supervision::Propagate).unwrap();

    let deep = inner
        .spawn(|cx| async move {
            cx.sleep(Duration::from_secs(30)).await?;
            Ok(())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(50));
    outer.cancel(CancelReason::user("shutting down the tree"));

    let err = runtime
        .block_on(|cx| async move { deep.join(&cx).await })
        .unwrap_err();
    let reason = err.cancel_reason().expect("deep task should be cancelled");
    assert_eq!(reason.kind(), CancelKind::ParentCancelled);

    let err = runtime
        .block_on(|cx| async move { outer.join(&cx).await })
        .unwrap_err();
    assert_eq!(err.cancel_reason().unwrap().kind(), CancelKind::User);
    assert_eq!(middle.state(), TaskState::Cancelled);
    assert_eq!(inner.state(), TaskState::Cancelled);
}

#[test]
fn cancellation_waits_for_a_checkpoint() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let reached_checkpoint = Arc::new(AtomicBool::new(false));
    let reached = Arc::clone(&reached_checkpoint);

    let handle = scope
        .spawn(move |cx| async move {
            // Busy section with no suspension points: cancellation cannot
            // interrupt it.
            gate_rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(weft::Error::app)?;
            reached.store(true, Ordering::SeqCst);
            cx.checkpoint()?;
            Ok(())
        })
        .unwrap();

    handle.cancel(CancelReason::user("stop"));
    // The task is already cancelling but keeps running until it checks.
    assert!(!handle.is_finished());
    gate_tx.send(()).unwrap();

    let err = runtime
        .block_on(|cx| async move { handle.join(&cx).await })
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(reached_checkpoint.load(Ordering::SeqCst));
}

#[test]
fn deadline_cancellation_uses_the_timeout_reason() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Isolate).unwrap();
    let handle = scope
        .spawn(|cx| async move {
            cx.sleep(Duration::from_secs(30)).await?;
            Ok(())
        })
        .unwrap();
    handle.cancel_after(Duration::from_millis(50), CancelReason::timeout());

    let err = runtime
        .block_on(|cx| async move { handle.join(&cx).await })
        .unwrap_err();
    assert_eq!(err.cancel_reason().unwrap().kind(), CancelKind::Timeout);
}

#[test]
fn finished_task_ignores_late_cancellation() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    let handle = scope.spawn(|_cx| async move { Ok(7) }).unwrap();

    while !handle.is_finished() {
        std::thread::sleep(Duration::from_millis(5));
    }
    handle.cancel(CancelReason::user("too late"));
    assert_eq!(handle.state(), TaskState::Completed);

    let value = runtime
        .block_on(|cx| async move { handle.join(&cx).await })
        .unwrap();
    assert_eq!(value, 7);
}

#[test]
fn body_that_returns_despite_cancel_still_completes() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();

    let handle = scope
        .spawn(move |_cx| async move {
            gate_rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(weft::Error::app)?;
            // Never checks its context again; the value wins.
            Ok("kept")
        })
        .unwrap();
    handle.cancel(CancelReason::user("stop"));
    gate_tx.send(()).unwrap();

    let value = runtime
        .block_on(|cx| async move { handle.join(&cx).await })
        .unwrap();
    assert_eq!(value, "kept");
}

#[test]
fn spawning_into_a_cancelled_scope_yields_a_cancelling_task() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    scope.cancel(CancelReason::user("done"));

    let handle = scope
        .spawn(|cx| async move {
            cx.checkpoint()?;
            Ok(())
        })
        .unwrap();
    let err = runtime
        .block_on(|cx| async move { handle.join(&cx).await })
        .unwrap_err();
    assert!(err.is_cancelled());
}
