//! One-to-many transformation adapter.
//!
//! The transform function receives each upstream item together with an
//! [`Emitter`] and may emit zero or more downstream items per input.
//! Emission order is preserved: everything emitted for one input drains
//! before the next input is pulled.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Result;
use crate::flow::stream::Stream;

/// Sink handed to a transform function.
#[derive(Debug)]
pub struct Emitter<'a, U> {
    buf: &'a mut VecDeque<U>,
}

impl<U> Emitter<'_, U> {
    /// Emits one downstream item.
    pub fn emit(&mut self, value: U) {
        self.buf.push_back(value);
    }
}

pub(crate) struct Transform<S, F, U> {
    stream: S,
    f: F,
    pending: VecDeque<U>,
}

impl<S, F, U> Transform<S, F, U> {
    pub(crate) fn new(stream: S, f: F) -> Self {
        Self {
            stream,
            f,
            pending: VecDeque::new(),
        }
    }
}

impl<S, F, T, U> Stream for Transform<S, F, U>
where
    S: Stream<Item = Result<T>> + Unpin,
    F: FnMut(T, &mut Emitter<'_, U>) -> Result<()> + Unpin,
    U: Unpin,
{
    type Item = Result<U>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            match Pin::new(&mut this.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(item))) => {
                    let mut emitter = Emitter {
                        buf: &mut this.pending,
                    };
                    if let Err(err) = (this.f)(item, &mut emitter) {
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
