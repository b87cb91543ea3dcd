//! Worker pool and cooperative cancellation.
//!
//! The pool is constructed explicitly by the caller (once, at startup) and
//! passed down by reference; nothing in this crate touches rayon's global pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use forc_core::{Error, Result};

/// Thread pool that runs the per-grid-point fits.
pub struct ComputePool {
    pool: rayon::ThreadPool,
}

impl ComputePool {
    /// Build a pool with `threads` workers.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::Configuration("thread count must be >= 1".to_string()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("forc-worker-{i}"))
            .build()
            .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Single-worker pool; results are identical to any other thread count.
    pub fn sequential() -> Result<Self> {
        Self::new(1)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` inside the pool so that rayon iterators in it use these workers.
    pub fn install<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(f)
    }
}

impl std::fmt::Debug for ComputePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePool").field("threads", &self.threads()).finish()
    }
}

/// Cancellation token: when set, a running differentiation stops before its next grid point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancel_requested: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh token, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; visible to every clone of the token.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
    }

    /// `true` once [`cancel`](Self::cancel) has been called on any clone.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Relaxed)
    }
}
