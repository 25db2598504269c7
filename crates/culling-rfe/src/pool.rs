//! Fixed-size worker pool shared by every resample of one run.

use tracing::debug;

use crate::error::RfeError;

/// Owned rayon thread pool. Work submitted through [`install`](Self::install),
/// including nested rayon calls such as forest tree building, stays on the
/// pool's threads. The threads are released when the pool is dropped.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `n_threads` workers; 0 picks rayon's default.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::WorkerPool`] if the threads cannot be spawned.
    pub fn new(n_threads: usize) -> Result<Self, RfeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("culling-worker-{i}"))
            .build()
            .map_err(|e| RfeError::WorkerPool {
                n_threads,
                source: e,
            })?;
        debug!(n_threads = pool.current_num_threads(), "worker pool started");
        Ok(Self { pool })
    }

    /// Return the number of worker threads.
    #[must_use]
    pub fn n_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the pool.
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    #[test]
    fn nested_work_stays_on_pool() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.n_threads(), 2);
        let threads = pool.install(|| {
            (0..16)
                .into_par_iter()
                .map(|_| rayon::current_num_threads())
                .collect::<Vec<_>>()
        });
        assert!(threads.iter().all(|&n| n == 2));
    }
}
