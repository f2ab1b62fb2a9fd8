//! Poll harness wrapping every spawned body.
//!
//! The harness refreshes the task's schedule waker on every poll (so a
//! cancellation can always re-queue the task), traps panics, and converts
//! the body's outcome into a table transition plus a filled join slot.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::cx::Cx;
use crate::error::{Error, PanicPayload, Result};
use crate::runtime::handle::JoinSlot;
use crate::runtime::record::BodySummary;

pub(crate) struct TaskHarness<T, F> {
    cx: Cx,
    body: Pin<Box<F>>,
    slot: Arc<JoinSlot<T>>,
    done: bool,
}

impl<T, F> TaskHarness<T, F>
where
    F: Future<Output = Result<T>>,
{
    pub(crate) fn new(cx: Cx, body: F, slot: Arc<JoinSlot<T>>) -> Self {
        Self {
            cx,
            body: Box::pin(body),
            slot,
            done: false,
        }
    }
}

impl<T, F> Future for TaskHarness<T, F>
where
    F: Future<Output = Result<T>>,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(());
        }
        this.cx
            .shared()
            .set_schedule_waker(this.cx.id(), ctx.waker().clone());
        let poll = std::panic::catch_unwind(AssertUnwindSafe(|| this.body.as_mut().poll(ctx)));
        let result = match poll {
            Ok(Poll::Pending) => return Poll::Pending,
            Ok(Poll::Ready(result)) => result,
            Err(payload) => {
                let payload = PanicPayload::new(payload_message(payload.as_ref()));
                tracing::error!(task = %this.cx.id(), panic = %payload.message(), "task body panicked");
                Err(Error::panicked(payload))
            }
        };
        this.done = true;
        let summary = match &result {
            Ok(_) => BodySummary::Ok,
            Err(err) => BodySummary::Err(err.clone()),
        };
        // Table transition first, so the state is terminal before any joiner
        // observes the result.
        this.cx.shared().finish_body(this.cx.id(), summary);
        this.slot.fill(result);
        Poll::Ready(())
    }
}

fn payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
