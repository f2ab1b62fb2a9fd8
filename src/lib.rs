//! Weft: a small structured-concurrency runtime.
//!
//! # Overview
//!
//! Weft organizes async work into a tree of tasks anchored by scopes. A
//! scope owns everything spawned under it: joining a scope waits for every
//! child, cancelling it reaches the whole subtree, and a child's failure is
//! either propagated (fail-fast) or contained, depending on the scope's
//! supervision strategy. Nothing outlives its scope.
//!
//! # Core Guarantees
//!
//! - **No orphan tasks**: every task belongs to a scope; scope join waits for all children
//! - **Cooperative cancellation**: cancellation is a request observed at suspension points, never a kill
//! - **Monotonic states**: a task's lifecycle only moves forward, and the first terminal state wins
//! - **Typed failures**: errors and panics are values delivered to joiners and supervisors
//!
//! # Module Structure
//!
//! - [`types`]: Core vocabulary (task ids, lifecycle states, cancellation reasons, supervision)
//! - [`error`]: Error types
//! - [`runtime`]: Worker pools, the task table, timers, and [`Runtime`]
//! - [`cx`]: The per-task capability context
//! - [`scope`]: Scopes, spawning, and joining
//! - [`dispatch`]: Named execution contexts (`general`, `io`, `ui`, `unconfined`)
//! - [`channel`]: Rendezvous, bounded, and unbounded channels
//! - [`flow`]: Cold, restartable async sequences
//! - [`time`]: Sleep and periodic tickers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod channel;
pub mod cx;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod runtime;
pub mod scope;
pub mod time;
pub mod types;

pub(crate) mod util;

pub use channel::{Capacity, Channel, RecvFuture, SendFuture};
pub use cx::Cx;
pub use dispatch::Dispatcher;
pub use error::{
    Error, ErrorKind, PanicPayload, RecvError, Result, SendError, SpawnError, TryRecvError,
    TrySendError,
};
pub use flow::{Emitter, Flow, Stream};
pub use runtime::{Runtime, RuntimeBuilder, TaskHandle};
pub use scope::Scope;
pub use time::{ticker, Sleep, Tick};
pub use types::{CancelKind, CancelReason, Supervision, TaskId, TaskState};
