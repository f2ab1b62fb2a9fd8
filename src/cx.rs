//! The task capability context.
//!
//! A `Cx` is handed to every task body and is the body's only line to the
//! runtime: cooperative cancellation checks, timers, and identity all go
//! through it. Cancellation is observed, never injected, so a body that
//! never touches its `Cx` (and never awaits a runtime primitive) runs to
//! completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::runtime::record::RuntimeShared;
use crate::time::Sleep;
use crate::types::{CancelReason, TaskId, TaskStateCell};

/// Capability context for one task.
#[derive(Debug, Clone)]
pub struct Cx {
    id: TaskId,
    state: Arc<TaskStateCell>,
    shared: Arc<RuntimeShared>,
}

impl Cx {
    pub(crate) fn new(id: TaskId, state: Arc<TaskStateCell>, shared: Arc<RuntimeShared>) -> Self {
        Self { id, state, shared }
    }

    pub(crate) fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    pub(crate) fn state_cell(&self) -> &Arc<TaskStateCell> {
        &self.state
    }

    /// This task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns true once cancellation has been requested for this task.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.state.is_cancel_requested()
    }

    /// The recorded cancellation reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.shared.cancel_reason(self.id)
    }

    /// Acknowledges a pending cancellation.
    ///
    /// The fast path is one atomic load. Every blocking primitive in the
    /// crate calls this at each poll, so a parked task unwinds promptly
    /// once cancelled.
    pub fn checkpoint(&self) -> Result<()> {
        if self.state.is_cancel_requested() {
            let reason = self.cancel_reason().unwrap_or_default();
            Err(Error::cancelled(reason))
        } else {
            Ok(())
        }
    }

    /// Suspends this task for `duration`. A suspension point.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> Sleep<'_> {
        Sleep::new(self, duration)
    }

    /// Yields to the scheduler once. A suspension point.
    #[must_use]
    pub fn yield_now(&self) -> YieldNow<'_> {
        YieldNow {
            cx: self,
            yielded: false,
        }
    }
}

/// Future returned by [`Cx::yield_now`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow<'a> {
    cx: &'a Cx,
    yielded: bool,
}

impl Future for YieldNow<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.cx.checkpoint()?;
        if this.yielded {
            Poll::Ready(Ok(()))
        } else {
            this.yielded = true;
            ctx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
