//! Execution contexts and the thread pools behind them.
//!
//! Four named contexts exist: `general` (CPU-sized pool for ordinary work),
//! `io` (large pool for blocking calls), `ui` (single confined thread), and
//! `unconfined` (no pool; the task runs inline on whichever thread wakes
//! it). Context names resolve through the [`Registry`]; an unknown name is
//! an error, not a silent fallback.

pub(crate) mod pool;
pub(crate) mod task;

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{Error, Result};

pub(crate) use pool::WorkerPool;
pub(crate) use task::ScheduledTask;

/// A named execution context for spawned tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dispatcher {
    /// Shared pool sized to the CPU count. The default.
    #[default]
    General,
    /// Wide pool for blocking I/O.
    Io,
    /// The single UI thread. Degrades to `General` when the runtime was
    /// built without one.
    Ui,
    /// No pool: the task is polled inline on the thread that wakes it.
    Unconfined,
}

impl Dispatcher {
    /// The context's canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Io => "io",
            Self::Ui => "ui",
            Self::Unconfined => "unconfined",
        }
    }
}

impl std::fmt::Display for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pool sizing, filled in by the runtime builder.
#[derive(Debug, Clone)]
pub(crate) struct RegistryConfig {
    pub(crate) general_threads: usize,
    pub(crate) io_threads: usize,
    pub(crate) ui_thread: bool,
    pub(crate) thread_name_prefix: String,
}

/// Resolves context names and routes tasks to their pools.
#[derive(Debug)]
pub(crate) struct Registry {
    general: WorkerPool,
    io: WorkerPool,
    ui: Option<WorkerPool>,
}

impl Registry {
    /// Starts the pools and returns the registry plus all worker handles.
    pub(crate) fn start(config: &RegistryConfig) -> (Arc<Self>, Vec<JoinHandle<()>>) {
        let prefix = &config.thread_name_prefix;
        let mut handles = Vec::new();
        let (general, mut joined) =
            WorkerPool::start(&format!("{prefix}-general"), config.general_threads);
        handles.append(&mut joined);
        let (io, mut joined) = WorkerPool::start(&format!("{prefix}-io"), config.io_threads);
        handles.append(&mut joined);
        let ui = if config.ui_thread {
            let (pool, mut joined) = WorkerPool::start(&format!("{prefix}-ui"), 1);
            handles.append(&mut joined);
            Some(pool)
        } else {
            None
        };
        (Arc::new(Self { general, io, ui }), handles)
    }

    /// Resolves a context name. Exactly the four canonical names are
    /// accepted.
    pub(crate) fn resolve(&self, name: &str) -> Result<Dispatcher> {
        match name {
            "general" => Ok(Dispatcher::General),
            "io" => Ok(Dispatcher::Io),
            "ui" => Ok(Dispatcher::Ui),
            "unconfined" => Ok(Dispatcher::Unconfined),
            other => Err(Error::unknown_context(other)),
        }
    }

    /// Enqueues a task on its context's pool, deduplicating wakeups.
    pub(crate) fn schedule(self: &Arc<Self>, task: Arc<ScheduledTask>) {
        if !task.mark_queued() {
            return;
        }
        match task.dispatcher() {
            Dispatcher::General => self.general.push(task),
            Dispatcher::Io => self.io.push(task),
            Dispatcher::Ui => match &self.ui {
                Some(pool) => pool.push(task),
                None => self.general.push(task),
            },
            Dispatcher::Unconfined => task.run_inline(self),
        }
    }

    /// Fallback queue for an unconfined task whose future is mid-poll.
    pub(crate) fn push_general(&self, task: Arc<ScheduledTask>) {
        self.general.push(task);
    }

    /// Shuts every pool down. Queued backlog still runs.
    pub(crate) fn shutdown(&self) {
        self.general.shutdown();
        self.io.shutdown();
        if let Some(ui) = &self.ui {
            ui.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    fn test_registry(ui: bool) -> (Arc<Registry>, Vec<JoinHandle<()>>) {
        Registry::start(&RegistryConfig {
            general_threads: 2,
            io_threads: 2,
            ui_thread: ui,
            thread_name_prefix: "test".into(),
        })
    }

    #[test]
    fn resolve_accepts_canonical_names() {
        let (registry, handles) = test_registry(true);
        assert_eq!(registry.resolve("general").unwrap(), Dispatcher::General);
        assert_eq!(registry.resolve("io").unwrap(), Dispatcher::Io);
        assert_eq!(registry.resolve("ui").unwrap(), Dispatcher::Ui);
        assert_eq!(
            registry.resolve("unconfined").unwrap(),
            Dispatcher::Unconfined
        );
        registry.shutdown();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn resolve_rejects_unknown_names() {
        let (registry, handles) = test_registry(false);
        let err = registry.resolve("gpu").unwrap_err();
        assert!(err.to_string().contains("gpu"));
        registry.shutdown();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn pool_runs_scheduled_task() {
        let (registry, handles) = test_registry(false);
        let (tx, rx) = mpsc::channel();
        let task = Arc::new(ScheduledTask::new(
            TaskId::testing_default(),
            Dispatcher::General,
            Arc::downgrade(&registry),
            Box::pin(async move {
                tx.send(std::thread::current().name().map(str::to_owned))
                    .unwrap();
            }),
        ));
        registry.schedule(task);
        let name = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert!(name.starts_with("test-general"));
        registry.shutdown();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn unconfined_runs_inline_on_calling_thread() {
        let (registry, handles) = test_registry(false);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let task = Arc::new(ScheduledTask::new(
            TaskId::testing_default(),
            Dispatcher::Unconfined,
            Arc::downgrade(&registry),
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }),
        ));
        registry.schedule(task);
        // Inline execution means the flag is already set when schedule
        // returns, with no waiting.
        assert!(ran.load(Ordering::SeqCst));
        registry.shutdown();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
