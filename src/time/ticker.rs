//! Periodic tick source.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::Channel;
use crate::cx::Cx;

/// Marker value delivered by a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

/// Starts a fixed-cadence ticker owned by the calling task.
///
/// The first tick fires after `initial_delay`, the rest every `interval`
/// measured from the previous deadline, so a slow consumer does not drift
/// the cadence. The channel holds a single tick: if the consumer has not
/// taken the previous one, ticks coalesce instead of piling up. The ticker
/// stops when the owning task is cancelled or finished, or when the channel
/// is closed.
#[must_use]
pub fn ticker(cx: &Cx, interval: Duration, initial_delay: Duration) -> Channel<Tick> {
    let channel = Channel::bounded(1);
    cx.shared().timer.insert_tick(
        Instant::now() + initial_delay,
        channel.clone(),
        Arc::clone(cx.state_cell()),
        interval,
    );
    channel
}
