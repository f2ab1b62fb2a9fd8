//! Time: sleeping and periodic ticks.

mod ticker;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::cx::Cx;
use crate::error::Result;

pub use ticker::{ticker, Tick};

/// Future returned by [`Cx::sleep`].
///
/// Registers one wakeup with the timer driver on first poll. The entry is
/// not unregistered if the sleep is abandoned; a late wakeup on a finished
/// task is a no-op.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep<'a> {
    cx: &'a Cx,
    deadline: Instant,
    registered: bool,
}

impl<'a> Sleep<'a> {
    pub(crate) fn new(cx: &'a Cx, duration: Duration) -> Self {
        Self {
            cx,
            deadline: Instant::now() + duration,
            registered: false,
        }
    }
}

impl Future for Sleep<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.cx.checkpoint()?;
        if Instant::now() >= this.deadline {
            return Poll::Ready(Ok(()));
        }
        if !this.registered {
            this.cx
                .shared()
                .timer
                .insert_wake(this.deadline, ctx.waker().clone());
            this.registered = true;
        }
        Poll::Pending
    }
}
