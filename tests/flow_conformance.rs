#![allow(missing_docs)]
//! Flows driven through the runtime: laziness, restart, operators, and
//! cancellation of a collector.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::test_runtime;
use weft::{CancelReason, Emitter, Error, Flow, Supervision};

#[test]
fn pipeline_collects_the_same_values_every_time() {
    let runtime = test_runtime();
    let flow = Flow::from_iter(1..=5).map(|n| n * 2).filter(|n| n % 4 == 0);

    for _ in 0..2 {
        let flow = flow.clone();
        let values = runtime
            .block_on(|cx| async move { flow.collect_values(&cx).await })
            .unwrap();
        assert_eq!(values, vec![4, 8]);
    }
}

#[test]
fn transform_fans_one_item_out_in_order() {
    let runtime = test_runtime();
    let flow = Flow::from_iter(vec![1, 2]).transform(|n, emitter: &mut Emitter<'_, i32>| {
        emitter.emit(n * 2);
        emitter.emit(n * 3);
        Ok(())
    });
    let values = runtime
        .block_on(|cx| async move { flow.collect_values(&cx).await })
        .unwrap();
    assert_eq!(values, vec![2, 3, 4, 6]);
}

#[test]
fn failing_transform_stops_the_collection() {
    let runtime = test_runtime();
    let flow = Flow::from_iter(0..100).transform(|n, emitter: &mut Emitter<'_, i32>| {
        if n == 3 {
            return Err(Error::msg("bad item"));
        }
        emitter.emit(n);
        Ok(())
    });
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let err = runtime
        .block_on(|cx| async move {
            flow.collect(&cx, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
        })
        .unwrap_err();
    assert!(err.to_string().contains("bad item"));
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[test]
fn nothing_runs_until_collected() {
    let runtime = test_runtime();
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&produced);
    let flow = Flow::unfold(0_u32, move |n| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if n < 3 {
                Ok(Some((n, n + 1)))
            } else {
                Ok(None)
            }
        }
    })
    .map(|n| n + 100);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(produced.load(Ordering::SeqCst), 0);

    let values = runtime
        .block_on(|cx| async move { flow.collect_values(&cx).await })
        .unwrap();
    assert_eq!(values, vec![100, 101, 102]);
}

#[test]
fn cancelling_the_collector_stops_an_endless_flow() {
    let runtime = test_runtime();
    let scope = runtime.scope(Supervision::Isolate).unwrap();
    let flow = Flow::unfold(0_u64, |n| async move { Ok(Some((n, n + 1))) });

    let collector = scope
        .spawn(move |cx| async move {
            flow.collect(&cx, |_| {}).await?;
            Ok(())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(100));
    collector.cancel(CancelReason::user("enough"));
    let err = runtime
        .block_on(|cx| async move { collector.join(&cx).await })
        .unwrap_err();
    assert!(err.is_cancelled());
}
