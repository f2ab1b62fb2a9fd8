//! Error types and error handling strategy.
//!
//! Errors are explicit and typed. A failure is never silently swallowed: it
//! reaches whoever joins the task, the supervision boundary, or both. Panics
//! inside task bodies are caught and carried as [`ErrorKind::Panicked`]
//! rather than unwinding a worker thread.

use core::fmt;
use std::sync::Arc;

use crate::types::CancelReason;

/// Convenience alias for results carrying the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Payload from a caught panic, reduced to its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The kind of a runtime error.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// The task was cancelled. Not a failure for propagation purposes: a
    /// cancelled child never fail-fasts its siblings.
    Cancelled(CancelReason),
    /// A channel operation was attempted after the channel was closed.
    Closed,
    /// An execution-context name did not resolve in the registry.
    UnknownContext(Arc<str>),
    /// The task's body panicked.
    Panicked(PanicPayload),
    /// The task's work failed with an application error.
    App(Arc<dyn std::error::Error + Send + Sync>),
}

/// The crate-wide error type.
///
/// Cheap to clone: shared causes sit behind an `Arc`, which lets one child
/// failure be stored on the child, inherited by the parent, and reported to
/// a joiner without copying the cause.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// A cancellation error with the given reason.
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self {
            kind: ErrorKind::Cancelled(reason),
        }
    }

    /// A closed-channel error.
    #[must_use]
    pub fn closed() -> Self {
        Self {
            kind: ErrorKind::Closed,
        }
    }

    /// An unknown execution-context name.
    #[must_use]
    pub fn unknown_context(name: &str) -> Self {
        Self {
            kind: ErrorKind::UnknownContext(Arc::from(name)),
        }
    }

    /// A caught-panic error.
    #[must_use]
    pub fn panicked(payload: PanicPayload) -> Self {
        Self {
            kind: ErrorKind::Panicked(payload),
        }
    }

    /// An application failure wrapping an arbitrary error cause.
    #[must_use]
    pub fn app<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::App(Arc::new(cause)),
        }
    }

    /// An application failure from a plain message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::App(Arc::new(MessageError(message.into()))),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled(_))
    }

    /// Returns the cancellation reason, if this is a cancellation error.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        match &self.kind {
            ErrorKind::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }

    /// Returns true if this error is a closed-channel error.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::Closed)
    }

    /// Returns true for failures that propagate under a fail-fast scope,
    /// i.e. anything other than cancellation.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_cancelled()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Cancelled(reason) => write!(f, "cancelled: {reason}"),
            ErrorKind::Closed => write!(f, "channel closed"),
            ErrorKind::UnknownContext(name) => write!(f, "unknown execution context: {name}"),
            ErrorKind::Panicked(payload) => write!(f, "task panicked: {}", payload.message()),
            ErrorKind::App(cause) => write!(f, "task failed: {cause}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::App(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MessageError {}

/// Error from an awaited channel send, carrying the undelivered value back.
#[derive(Debug, PartialEq, Eq)]
pub enum SendError<T> {
    /// The channel was closed before the value could be enqueued.
    Closed(T),
    /// The sending task was cancelled while waiting for capacity.
    Cancelled {
        /// The value that was not delivered.
        value: T,
        /// Why the sender was cancelled.
        reason: CancelReason,
    },
}

impl<T> SendError<T> {
    /// Recovers the value that was not sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::Cancelled { value, .. } => value,
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => write!(f, "send on closed channel"),
            Self::Cancelled { reason, .. } => write!(f, "send cancelled: {reason}"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

impl<T> From<SendError<T>> for Error {
    fn from(err: SendError<T>) -> Self {
        match err {
            SendError::Closed(_) => Self::closed(),
            SendError::Cancelled { reason, .. } => Self::cancelled(reason),
        }
    }
}

/// Error from a non-blocking channel send.
#[derive(Debug, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// No capacity (or, on a rendezvous channel, no parked receiver).
    Full(T),
    /// The channel was closed.
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Recovers the value that was not sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "channel full"),
            Self::Closed(_) => write!(f, "send on closed channel"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

/// Error from an awaited channel receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvError {
    /// The channel is closed and its buffer is drained.
    Closed,
    /// The receiving task was cancelled while waiting.
    Cancelled(CancelReason),
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "receive on closed channel"),
            Self::Cancelled(reason) => write!(f, "receive cancelled: {reason}"),
        }
    }
}

impl std::error::Error for RecvError {}

impl From<RecvError> for Error {
    fn from(err: RecvError) -> Self {
        match err {
            RecvError::Closed => Self::closed(),
            RecvError::Cancelled(reason) => Self::cancelled(reason),
        }
    }
}

/// Error from a non-blocking channel receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No value is currently buffered.
    Empty,
    /// The channel is closed and its buffer is drained.
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "channel empty"),
            Self::Closed => write!(f, "receive on closed channel"),
        }
    }
}

impl std::error::Error for TryRecvError {}

/// Error returned when a spawn is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// The scope's root task has already reached a terminal state.
    #[error("scope is closed")]
    ScopeClosed,
    /// The runtime is shutting down and no longer accepts work.
    #[error("runtime is shut down")]
    Shutdown,
}
