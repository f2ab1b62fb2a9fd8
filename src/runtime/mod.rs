//! The runtime: worker pools, the task table, the timer driver, and the
//! entry points for opening scopes and blocking on async work.

pub(crate) mod handle;
pub(crate) mod harness;
pub(crate) mod record;
pub(crate) mod timer;

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::cx::Cx;
use crate::dispatch::{Dispatcher, Registry, RegistryConfig};
use crate::error::{Error, Result, SpawnError};
use crate::scope::Scope;
use crate::types::{Supervision, TaskStateCell};

use record::{BodySummary, RecordKind, RuntimeShared};
use timer::TimerHandle;

pub use handle::TaskHandle;

/// Configures and starts a [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    general_threads: Option<usize>,
    io_threads: usize,
    ui_thread: bool,
    thread_name_prefix: String,
}

impl RuntimeBuilder {
    /// A builder with the defaults: a CPU-sized general pool, 64 io
    /// threads, and a ui thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            general_threads: None,
            io_threads: 64,
            ui_thread: true,
            thread_name_prefix: "weft".into(),
        }
    }

    /// Size of the general pool. Defaults to the available parallelism.
    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.general_threads = Some(threads);
        self
    }

    /// Size of the io pool.
    #[must_use]
    pub fn io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    /// Whether to start the dedicated ui thread. Without it, tasks spawned
    /// on the ui dispatcher run on the general pool.
    #[must_use]
    pub fn ui_thread(mut self, enabled: bool) -> Self {
        self.ui_thread = enabled;
        self
    }

    /// Prefix for worker thread names.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Starts the pools and the timer driver.
    #[must_use]
    pub fn build(self) -> Runtime {
        let general_threads = self.general_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
        });
        let (registry, mut threads) = Registry::start(&RegistryConfig {
            general_threads,
            io_threads: self.io_threads,
            ui_thread: self.ui_thread,
            thread_name_prefix: self.thread_name_prefix,
        });
        let mut timer_thread = None;
        let shared = Arc::new_cyclic(|weak| {
            let (timer, thread) = TimerHandle::start(weak.clone());
            timer_thread = Some(thread);
            RuntimeShared::new(registry, timer)
        });
        threads.extend(timer_thread);
        tracing::debug!(general_threads, "runtime started");
        Runtime { shared, threads }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The runtime. Dropping it cancels all outstanding work and joins every
/// worker thread.
#[derive(Debug)]
pub struct Runtime {
    shared: Arc<RuntimeShared>,
    threads: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// A runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Starts configuring a runtime.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Resolves an execution-context name to its dispatcher.
    pub fn dispatcher(&self, name: &str) -> Result<Dispatcher> {
        self.shared.registry.resolve(name)
    }

    /// Opens a top-level scope on the general dispatcher.
    pub fn scope(&self, supervision: Supervision) -> std::result::Result<Scope, SpawnError> {
        self.scope_on(Dispatcher::General, supervision)
    }

    /// Opens a top-level scope on an explicit dispatcher.
    pub fn scope_on(
        &self,
        dispatcher: Dispatcher,
        supervision: Supervision,
    ) -> std::result::Result<Scope, SpawnError> {
        Scope::create(Arc::clone(&self.shared), None, dispatcher, supervision)
    }

    /// Runs a future to completion on the calling thread.
    ///
    /// The future gets its own task identity, so it can be a join target
    /// for timers and cancellation like any spawned task.
    pub fn block_on<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let state = Arc::new(TaskStateCell::new());
        let id = self
            .shared
            .register(
                RecordKind::Task,
                None,
                Supervision::Propagate,
                Dispatcher::General,
                Arc::clone(&state),
                None,
            )
            .map_err(Error::app)?;
        let cx = Cx::new(id, state, Arc::clone(&self.shared));
        let mut future = Box::pin(f(cx));
        let parker = Arc::new(Parker::default());
        let waker = Waker::from(Arc::clone(&parker));
        let mut ctx = Context::from_waker(&waker);
        let result = loop {
            self.shared.set_schedule_waker(id, waker.clone());
            match future.as_mut().poll(&mut ctx) {
                Poll::Ready(result) => break result,
                Poll::Pending => parker.park(),
            }
        };
        let summary = match &result {
            Ok(_) => BodySummary::Ok,
            Err(err) => BodySummary::Err(err.clone()),
        };
        self.shared.finish_body(id, summary);
        result
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        tracing::debug!("runtime shutting down");
        // Cancel everything first so parked tasks get woken and can drain
        // through the still-running pools, then stop the pools.
        self.shared.shutdown();
        self.shared.registry.shutdown();
        self.shared.timer.shutdown();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Condvar-based thread parker backing `block_on`.
#[derive(Default)]
struct Parker {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl Parker {
    fn park(&self) {
        let mut ready = self.ready.lock();
        while !*ready {
            self.condvar.wait(&mut ready);
        }
        *ready = false;
    }
}

impl Wake for Parker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        *self.ready.lock() = true;
        self.condvar.notify_one();
    }
}
