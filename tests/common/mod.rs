#![allow(dead_code)]
//! Shared integration test utilities.

use std::sync::Once;
use weft::{Runtime, RuntimeBuilder};

static INIT_LOGGING: Once = Once::new();

/// Initializes tracing output once per test binary. Filter with `RUST_LOG`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A small runtime sized for tests.
pub fn test_runtime() -> Runtime {
    init_test_logging();
    RuntimeBuilder::new()
        .worker_threads(4)
        .io_threads(8)
        .ui_thread(true)
        .thread_name_prefix("weft-test")
        .build()
}

/// A runtime without the dedicated ui thread.
pub fn headless_runtime() -> Runtime {
    init_test_logging();
    RuntimeBuilder::new()
        .worker_threads(4)
        .io_threads(4)
        .ui_thread(false)
        .thread_name_prefix("weft-headless")
        .build()
}
