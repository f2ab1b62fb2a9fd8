//! Channels: rendezvous, bounded, and unbounded.
//!
//! One implementation covers all three shapes; the capacity only changes
//! when a sender may deposit. Values are delivered in send order. Waiting
//! senders and receivers park in token-keyed FIFO queues; a future removes
//! its own token on drop, so an abandoned wait never leaks a queue entry.
//!
//! `send` and `recv` are suspension points: both check the calling task's
//! cancellation on every poll, and a cancelled send hands the undelivered
//! value back in the error.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::cx::Cx;
use crate::error::{RecvError, SendError, TryRecvError, TrySendError};

/// Buffering shape of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// No buffer: a send completes only against a waiting receiver.
    Rendezvous,
    /// At most this many buffered values.
    Bounded(usize),
    /// Never applies backpressure.
    Unbounded,
}

struct ChannelState<T> {
    buffer: VecDeque<T>,
    closed: bool,
    send_waiters: VecDeque<(u64, Waker)>,
    recv_waiters: VecDeque<(u64, Waker)>,
}

struct ChannelShared<T> {
    capacity: Capacity,
    state: Mutex<ChannelState<T>>,
    tokens: AtomicU64,
}

/// A multi-producer multi-consumer channel. Cloning shares the channel.
pub struct Channel<T> {
    shared: Arc<ChannelShared<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Channel<T> {
    /// Creates a channel with the given capacity. `Bounded(0)` is the same
    /// thing as `Rendezvous`.
    #[must_use]
    pub fn new(capacity: Capacity) -> Self {
        let capacity = match capacity {
            Capacity::Bounded(0) => Capacity::Rendezvous,
            other => other,
        };
        Self {
            shared: Arc::new(ChannelShared {
                capacity,
                state: Mutex::new(ChannelState {
                    buffer: VecDeque::new(),
                    closed: false,
                    send_waiters: VecDeque::new(),
                    recv_waiters: VecDeque::new(),
                }),
                tokens: AtomicU64::new(0),
            }),
        }
    }

    /// A rendezvous channel.
    #[must_use]
    pub fn rendezvous() -> Self {
        Self::new(Capacity::Rendezvous)
    }

    /// A channel buffering at most `capacity` values.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self::new(Capacity::Bounded(capacity))
    }

    /// A channel without backpressure.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(Capacity::Unbounded)
    }

    /// The channel's capacity shape.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.shared.capacity
    }

    /// Sends a value, suspending until it is accepted.
    #[must_use = "futures do nothing unless awaited"]
    pub fn send<'a>(&'a self, cx: &'a Cx, value: T) -> SendFuture<'a, T> {
        SendFuture {
            channel: self,
            cx,
            value: Some(value),
            token: None,
        }
    }

    /// Receives the next value, suspending until one is available.
    #[must_use = "futures do nothing unless awaited"]
    pub fn recv<'a>(&'a self, cx: &'a Cx) -> RecvFuture<'a, T> {
        RecvFuture {
            channel: self,
            cx,
            token: None,
        }
    }

    /// Attempts to send without suspending.
    ///
    /// On a rendezvous channel this succeeds only if a receiver is already
    /// waiting.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TrySendError::Closed(value));
        }
        let wake = match self.shared.capacity {
            Capacity::Rendezvous => match state.recv_waiters.pop_front() {
                Some((_, waker)) => {
                    state.buffer.push_back(value);
                    Some(waker)
                }
                None => return Err(TrySendError::Full(value)),
            },
            Capacity::Bounded(n) => {
                if state.buffer.len() < n {
                    state.buffer.push_back(value);
                    state.recv_waiters.pop_front().map(|(_, waker)| waker)
                } else {
                    return Err(TrySendError::Full(value));
                }
            }
            Capacity::Unbounded => {
                state.buffer.push_back(value);
                state.recv_waiters.pop_front().map(|(_, waker)| waker)
            }
        };
        drop(state);
        if let Some(waker) = wake {
            waker.wake();
        }
        Ok(())
    }

    /// Attempts to receive without suspending.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.shared.state.lock();
        if let Some(value) = state.buffer.pop_front() {
            let wake = state.send_waiters.front().map(|(_, waker)| waker.clone());
            drop(state);
            if let Some(waker) = wake {
                waker.wake();
            }
            return Ok(value);
        }
        if state.closed {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Closes the channel. Idempotent.
    ///
    /// Waiting senders fail; buffered values remain receivable, after which
    /// receivers observe `Closed`.
    pub fn close(&self) {
        let wakers = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let mut wakers: Vec<Waker> = Vec::new();
            wakers.extend(state.send_waiters.drain(..).map(|(_, w)| w));
            wakers.extend(state.recv_waiters.drain(..).map(|(_, w)| w));
            wakers
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Returns true once the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of buffered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Returns true if no value is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_token(&self) -> u64 {
        self.shared.tokens.fetch_add(1, Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Channel")
            .field("capacity", &self.shared.capacity)
            .field("buffered", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}

fn register(waiters: &mut VecDeque<(u64, Waker)>, token: u64, waker: &Waker) {
    for (existing, slot) in waiters.iter_mut() {
        if *existing == token {
            if !slot.will_wake(waker) {
                *slot = waker.clone();
            }
            return;
        }
    }
    waiters.push_back((token, waker.clone()));
}

fn unregister(waiters: &mut VecDeque<(u64, Waker)>, token: u64) {
    waiters.retain(|(existing, _)| *existing != token);
}

/// Future returned by [`Channel::send`].
#[must_use = "futures do nothing unless awaited"]
pub struct SendFuture<'a, T> {
    channel: &'a Channel<T>,
    cx: &'a Cx,
    value: Option<T>,
    token: Option<u64>,
}

impl<T> Unpin for SendFuture<'_, T> {}

impl<T> Future for SendFuture<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let shared = &this.channel.shared;
        if let Err(err) = this.cx.checkpoint() {
            let mut state = shared.state.lock();
            if let Some(token) = this.token.take() {
                unregister(&mut state.send_waiters, token);
            }
            drop(state);
            let value = this.value.take().expect("send future polled after completion");
            let reason = err.cancel_reason().cloned().unwrap_or_default();
            return Poll::Ready(Err(SendError::Cancelled { value, reason }));
        }
        let mut state = shared.state.lock();
        if state.closed {
            if let Some(token) = this.token.take() {
                unregister(&mut state.send_waiters, token);
            }
            drop(state);
            let value = this.value.take().expect("send future polled after completion");
            return Poll::Ready(Err(SendError::Closed(value)));
        }
        // `Some(wake)` means the value may be deposited now, waking `wake`
        // if a receiver was parked. `None` means no capacity yet.
        let accepted: Option<Option<Waker>> = match shared.capacity {
            Capacity::Rendezvous => state.recv_waiters.pop_front().map(|(_, waker)| Some(waker)),
            Capacity::Bounded(n) if state.buffer.len() < n => {
                Some(state.recv_waiters.pop_front().map(|(_, waker)| waker))
            }
            Capacity::Bounded(_) => None,
            Capacity::Unbounded => Some(state.recv_waiters.pop_front().map(|(_, waker)| waker)),
        };
        match accepted {
            Some(wake) => {
                let value = this.value.take().expect("send future polled after completion");
                state.buffer.push_back(value);
                if let Some(token) = this.token.take() {
                    unregister(&mut state.send_waiters, token);
                }
                drop(state);
                if let Some(waker) = wake {
                    waker.wake();
                }
                Poll::Ready(Ok(()))
            }
            None => {
                let token = match this.token {
                    Some(token) => token,
                    None => {
                        let token = this.channel.next_token();
                        this.token = Some(token);
                        token
                    }
                };
                register(&mut state.send_waiters, token, ctx.waker());
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SendFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            unregister(&mut self.channel.shared.state.lock().send_waiters, token);
        }
    }
}

/// Future returned by [`Channel::recv`].
#[must_use = "futures do nothing unless awaited"]
pub struct RecvFuture<'a, T> {
    channel: &'a Channel<T>,
    cx: &'a Cx,
    token: Option<u64>,
}

impl<T> Unpin for RecvFuture<'_, T> {}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let shared = &this.channel.shared;
        if let Err(err) = this.cx.checkpoint() {
            let mut state = shared.state.lock();
            if let Some(token) = this.token.take() {
                unregister(&mut state.recv_waiters, token);
            }
            drop(state);
            let reason = err.cancel_reason().cloned().unwrap_or_default();
            return Poll::Ready(Err(RecvError::Cancelled(reason)));
        }
        let mut state = shared.state.lock();
        if let Some(value) = state.buffer.pop_front() {
            if let Some(token) = this.token.take() {
                unregister(&mut state.recv_waiters, token);
            }
            // A parked sender may now have room (or, pathologically, another
            // receiver to meet); let the front one re-poll.
            let wake = state.send_waiters.front().map(|(_, waker)| waker.clone());
            drop(state);
            if let Some(waker) = wake {
                waker.wake();
            }
            return Poll::Ready(Ok(value));
        }
        if state.closed {
            if let Some(token) = this.token.take() {
                unregister(&mut state.recv_waiters, token);
            }
            return Poll::Ready(Err(RecvError::Closed));
        }
        let token = match this.token {
            Some(token) => token,
            None => {
                let token = this.channel.next_token();
                this.token = Some(token);
                token
            }
        };
        register(&mut state.recv_waiters, token, ctx.waker());
        // On a rendezvous channel the parked sender is waiting for exactly
        // this: a receiver present. Nudge the front one.
        let wake = state.send_waiters.front().map(|(_, waker)| waker.clone());
        drop(state);
        if let Some(waker) = wake {
            waker.wake();
        }
        Poll::Pending
    }
}

impl<T> Drop for RecvFuture<'_, T> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let mut state = self.channel.shared.state.lock();
        unregister(&mut state.recv_waiters, token);
        // A sender may have already deposited a value for this receiver.
        // Hand it to the next parked receiver instead of stranding it.
        let wake = if state.buffer.is_empty() {
            None
        } else {
            state.recv_waiters.front().map(|(_, waker)| waker.clone())
        };
        drop(state);
        if let Some(waker) = wake {
            waker.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_try_send_respects_capacity() {
        let channel = Channel::bounded(2);
        channel.try_send(1).unwrap();
        channel.try_send(2).unwrap();
        assert_eq!(channel.try_send(3), Err(TrySendError::Full(3)));
        assert_eq!(channel.try_recv().unwrap(), 1);
        channel.try_send(3).unwrap();
        assert_eq!(channel.try_recv().unwrap(), 2);
        assert_eq!(channel.try_recv().unwrap(), 3);
        assert_eq!(channel.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn rendezvous_try_send_needs_a_waiting_receiver() {
        let channel = Channel::rendezvous();
        assert_eq!(channel.try_send(9), Err(TrySendError::Full(9)));
    }

    #[test]
    fn bounded_zero_is_rendezvous() {
        let channel = Channel::<u8>::new(Capacity::Bounded(0));
        assert_eq!(channel.capacity(), Capacity::Rendezvous);
    }

    #[test]
    fn unbounded_never_refuses() {
        let channel = Channel::unbounded();
        for n in 0..1000 {
            channel.try_send(n).unwrap();
        }
        assert_eq!(channel.len(), 1000);
        assert_eq!(channel.try_recv().unwrap(), 0);
    }

    #[test]
    fn close_drains_buffer_then_reports_closed() {
        let channel = Channel::bounded(4);
        channel.try_send("a").unwrap();
        channel.try_send("b").unwrap();
        channel.close();
        assert!(channel.is_closed());
        assert_eq!(channel.try_send("c"), Err(TrySendError::Closed("c")));
        assert_eq!(channel.try_recv().unwrap(), "a");
        assert_eq!(channel.try_recv().unwrap(), "b");
        assert_eq!(channel.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn close_is_idempotent() {
        let channel = Channel::<u8>::unbounded();
        channel.close();
        channel.close();
        assert!(channel.is_closed());
    }
}
