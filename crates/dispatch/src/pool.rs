//! Worker pools that run blocking label calls

use seclabel_errors::LabelError;
use tokio::runtime::Handle;

/// A blocking job handed to a worker
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs off the single-threaded context.
///
/// A pool may drop a job without running it (shutdown); the job's own
/// `Drop` takes care of reporting that.
pub trait WorkerPool: Send + Sync {
    fn submit(&self, job: Job);
}

/// Runs jobs on a tokio runtime's blocking thread pool
#[derive(Debug, Clone)]
pub struct TokioPool {
    handle: Handle,
}

impl TokioPool {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Pool of the runtime the caller is running on
    ///
    /// # Errors
    ///
    /// Returns `WorkerUnavailable` when called outside a tokio runtime.
    pub fn current() -> Result<Self, LabelError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| LabelError::WorkerUnavailable {
                message: e.to_string(),
            })
    }
}

impl WorkerPool for TokioPool {
    fn submit(&self, job: Job) {
        // Detached; results come back through the scheduler, not the handle.
        drop(self.handle.spawn_blocking(job));
    }
}

/// Runs each job on the submitting thread before `submit` returns
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
    fn submit(&self, job: Job) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn current_outside_runtime_is_unavailable() {
        assert!(matches!(
            TokioPool::current(),
            Err(LabelError::WorkerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn tokio_pool_runs_job_off_thread() {
        let pool = TokioPool::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let caller = std::thread::current().id();
        pool.submit(Box::new(move || {
            let _ = tx.send(std::thread::current().id());
        }));
        assert_ne!(rx.await.unwrap(), caller);
    }

    #[test]
    fn inline_pool_runs_immediately() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        InlinePool.submit(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }
}
