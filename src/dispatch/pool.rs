//! Fixed-size worker pool.
//!
//! Each pool owns a FIFO run queue guarded by a mutex and a condvar. Worker
//! threads block on the condvar when the queue is empty and exit when the
//! shutdown flag is raised and the queue is drained.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::dispatch::task::ScheduledTask;

#[derive(Debug)]
struct PoolInner {
    name: String,
    queue: Mutex<VecDeque<Arc<ScheduledTask>>>,
    available: Condvar,
    shutdown: AtomicBool,
}

/// A pool of OS threads draining a shared run queue.
#[derive(Debug, Clone)]
pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Starts `threads` workers named `{name}-{n}` and returns the pool
    /// together with their join handles.
    pub(crate) fn start(name: &str, threads: usize) -> (Self, Vec<JoinHandle<()>>) {
        let inner = Arc::new(PoolInner {
            name: name.to_owned(),
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let handles = (0..threads.max(1))
            .map(|n| {
                let inner = Arc::clone(&inner);
                std::thread::Builder::new()
                    .name(format!("{name}-{n}"))
                    .spawn(move || worker_loop(&inner))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        (Self { inner }, handles)
    }

    /// Enqueues a task for execution. Dropped silently after shutdown.
    pub(crate) fn push(&self, task: Arc<ScheduledTask>) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            tracing::trace!(pool = %self.inner.name, task = %task.id(), "dropping task after shutdown");
            return;
        }
        let mut queue = self.inner.queue.lock();
        queue.push_back(task);
        self.inner.available.notify_one();
    }

    /// Raises the shutdown flag and wakes every worker.
    ///
    /// Workers finish the queued backlog before exiting.
    pub(crate) fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _queue = self.inner.queue.lock();
        self.inner.available.notify_all();
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                inner.available.wait(&mut queue);
            }
        };
        match task {
            Some(task) => task.run(),
            None => {
                tracing::trace!(pool = %inner.name, "worker exiting");
                return;
            }
        }
    }
}
