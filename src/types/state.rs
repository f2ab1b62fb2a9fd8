//! Task state machine.
//!
//! States move one way only: `Active` may become `Cancelling`, and either may
//! reach exactly one terminal state. The first terminal write wins; later
//! attempts are ignored. The state lives in an atomic cell shared between the
//! runtime's task record, the task's handle, and its `Cx`, so it stays
//! queryable after the record itself is released.

use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// The lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The task is running or waiting at a suspension point.
    Active,
    /// Cancellation has been requested; the task has not yet observed it at a
    /// suspension point. Never reverts to `Active`.
    Cancelling,
    /// Terminal: the task finished with a value.
    Completed,
    /// Terminal: the task's work failed (error or panic).
    Failed,
    /// Terminal: the task observed cancellation and stopped.
    Cancelled,
}

impl TaskState {
    /// Returns true for `Completed`, `Failed`, or `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Cancelling => 1,
            Self::Completed => 2,
            Self::Failed => 3,
            Self::Cancelled => 4,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Cancelling,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Shared atomic holder for a task's [`TaskState`].
#[derive(Debug)]
pub struct TaskStateCell {
    raw: AtomicU8,
}

impl TaskStateCell {
    /// Creates a cell in the `Active` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: AtomicU8::new(TaskState::Active.as_u8()),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.raw.load(Ordering::Acquire))
    }

    /// Returns true once cancellation has been requested (including after a
    /// `Cancelled` terminal).
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        matches!(self.get(), TaskState::Cancelling | TaskState::Cancelled)
    }

    /// Marks the task `Cancelling` if it is still `Active`.
    ///
    /// Returns `true` if the transition happened. A task that is already
    /// `Cancelling` or terminal is left alone (monotonicity, terminal wins).
    pub fn request_cancel(&self) -> bool {
        self.raw
            .compare_exchange(
                TaskState::Active.as_u8(),
                TaskState::Cancelling.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Writes a terminal state unless one is already set.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn finish(&self, terminal: TaskState) -> bool {
        debug_assert!(terminal.is_terminal());
        loop {
            let current = self.raw.load(Ordering::Acquire);
            if TaskState::from_u8(current).is_terminal() {
                return false;
            }
            if self
                .raw
                .compare_exchange(
                    current,
                    terminal.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }
}

impl Default for TaskStateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_monotonic() {
        let cell = TaskStateCell::new();
        assert_eq!(cell.get(), TaskState::Active);
        assert!(cell.request_cancel());
        assert_eq!(cell.get(), TaskState::Cancelling);
        assert!(!cell.request_cancel());
        assert_eq!(cell.get(), TaskState::Cancelling);
    }

    #[test]
    fn first_terminal_wins() {
        let cell = TaskStateCell::new();
        assert!(cell.finish(TaskState::Completed));
        assert!(!cell.finish(TaskState::Failed));
        assert_eq!(cell.get(), TaskState::Completed);
    }

    #[test]
    fn cancel_after_terminal_is_ignored() {
        let cell = TaskStateCell::new();
        assert!(cell.finish(TaskState::Failed));
        assert!(!cell.request_cancel());
        assert_eq!(cell.get(), TaskState::Failed);
    }

    #[test]
    fn cancelling_can_still_complete() {
        let cell = TaskStateCell::new();
        assert!(cell.request_cancel());
        assert!(cell.finish(TaskState::Completed));
        assert_eq!(cell.get(), TaskState::Completed);
    }
}
