#![allow(missing_docs)]
//! Scope lifecycle: join waits for everything, closed scopes reject work.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::test_runtime;
use weft::{CancelReason, SpawnError, Supervision, TaskState};

#[test]
fn join_waits_for_every_spawned_task() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    let finished = Arc::new(AtomicUsize::new(0));

    for n in 0..8_u64 {
        let counter = Arc::clone(&finished);
        scope
            .spawn(move |cx| async move {
                cx.sleep(Duration::from_millis(20 + n * 10)).await?;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap()
            .detach();
    }

    let joined = scope.clone();
    runtime
        .block_on(|cx| async move { joined.join(&cx).await })
        .unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 8);
    assert_eq!(scope.state(), TaskState::Completed);
}

#[test]
fn joined_scope_rejects_new_spawns() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    let joined = scope.clone();
    runtime
        .block_on(|cx| async move { joined.join(&cx).await })
        .unwrap();

    let err = scope.spawn(|_cx| async move { Ok(()) }).unwrap_err();
    assert_eq!(err, SpawnError::ScopeClosed);
}

#[test]
fn join_after_cancel_reports_the_cancellation() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    scope
        .spawn(|cx| async move {
            cx.sleep(Duration::from_secs(30)).await?;
            Ok(())
        })
        .unwrap()
        .detach();

    scope.cancel(CancelReason::user("test teardown"));
    let joined = scope.clone();
    let err = runtime
        .block_on(|cx| async move { joined.join(&cx).await })
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(scope.state(), TaskState::Cancelled);
}

#[test]
fn join_is_shareable_across_clones() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    scope
        .spawn(|cx| async move {
            cx.sleep(Duration::from_millis(30)).await?;
            Ok(())
        })
        .unwrap()
        .detach();

    let first = scope.clone();
    runtime
        .block_on(|cx| async move { first.join(&cx).await })
        .unwrap();
    // A second join observes the same settled verdict.
    let second = scope.clone();
    runtime
        .block_on(|cx| async move { second.join(&cx).await })
        .unwrap();
}

#[test]
fn tasks_keep_running_after_their_handle_is_dropped() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Propagate).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);

    let handle = scope
        .spawn(move |cx| async move {
            cx.sleep(Duration::from_millis(50)).await?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    drop(handle);

    let joined = scope.clone();
    runtime
        .block_on(|cx| async move { joined.join(&cx).await })
        .unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}
