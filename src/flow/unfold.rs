//! Seed-and-step stream, the general-purpose flow producer.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Result;
use crate::flow::stream::Stream;

/// Stream driven by repeatedly applying `step` to an evolving state.
///
/// `step` returns `Ok(Some((item, next_state)))` to yield, `Ok(None)` to
/// finish, or `Err` to fail the stream.
pub(crate) struct Unfold<S, Step, Fut> {
    step: Step,
    state: Option<S>,
    pending: Option<Pin<Box<Fut>>>,
}

impl<S, Step, Fut> Unfold<S, Step, Fut> {
    pub(crate) fn new(seed: S, step: Step) -> Self {
        Self {
            step,
            state: Some(seed),
            pending: None,
        }
    }
}

impl<T, S, Step, Fut> Stream for Unfold<S, Step, Fut>
where
    S: Unpin,
    Step: Fn(S) -> Fut + Unpin,
    Fut: Future<Output = Result<Option<(T, S)>>>,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.pending.is_none() {
            let Some(state) = this.state.take() else {
                return Poll::Ready(None);
            };
            this.pending = Some(Box::pin((this.step)(state)));
        }
        let fut = this.pending.as_mut().expect("pending step set above");
        let output = match fut.as_mut().poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(output) => output,
        };
        this.pending = None;
        match output {
            Ok(Some((item, next))) => {
                this.state = Some(next);
                Poll::Ready(Some(Ok(item)))
            }
            Ok(None) => Poll::Ready(None),
            Err(err) => Poll::Ready(Some(Err(err))),
        }
    }
}
