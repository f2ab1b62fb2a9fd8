//! Supervision strategy for child failures.
//!
//! The strategy is a plain variant selected at scope creation and inherited
//! by every task spawned under that scope.

use core::fmt;

/// How a child task's failure affects the rest of its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Supervision {
    /// Fail-fast: a child failing with anything other than cancellation
    /// cancels its siblings and the parent, and the failure surfaces from
    /// whoever joins the parent or the scope root.
    #[default]
    Propagate,
    /// A child's failure is contained: siblings and the parent continue, and
    /// the failure is observable only by joining that child.
    Isolate,
}

impl Supervision {
    /// Returns true for the fail-fast strategy.
    #[must_use]
    pub const fn propagates(self) -> bool {
        matches!(self, Self::Propagate)
    }
}

impl fmt::Display for Supervision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Propagate => write!(f, "propagate"),
            Self::Isolate => write!(f, "isolate"),
        }
    }
}
