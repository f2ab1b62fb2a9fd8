//! Core types: identifiers, cancellation vocabulary, task state, supervision.

pub mod cancel;
pub mod id;
pub mod state;
pub mod supervision;

pub use cancel::{CancelKind, CancelReason};
pub use id::TaskId;
pub use state::{TaskState, TaskStateCell};
pub use supervision::Supervision;
