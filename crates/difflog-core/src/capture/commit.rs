//! Deferred-until-commit execution
//!
//! The host's unit of work decides when a pending diff write runs. With no
//! unit of work, [`Immediate`] runs the write on the spot.

use crate::errors::{lock_poisoned, ExError, Result};
use std::sync::Mutex;

/// A write waiting for its unit of work
pub type CommitJob = Box<dyn FnOnce() -> Result<()> + Send>;

/// "Run this after a successful commit" capability
pub trait CommitHook: Send + Sync {
    fn run_after_commit(&self, job: CommitJob) -> Result<()>;
}

/// Runs every job immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl CommitHook for Immediate {
    fn run_after_commit(&self, job: CommitJob) -> Result<()> {
        job()
    }
}

/// Queues jobs until the host commits or rolls back
#[derive(Default)]
pub struct DeferredCommit {
    pending: Mutex<Vec<CommitJob>>,
}

impl DeferredCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Run queued jobs in submission order.
    ///
    /// Every job runs even if an earlier one fails; the first failure is
    /// returned. Returns the number of jobs run.
    pub fn commit(&self) -> Result<usize> {
        let jobs = std::mem::take(
            &mut *self
                .pending
                .lock()
                .map_err(|_| lock_poisoned("commit"))?,
        );
        let count = jobs.len();
        let mut first_error: Option<ExError> = None;
        for job in jobs {
            if let Err(e) = job() {
                tracing::warn!(err.code = e.code(), "deferred diff write failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Discard queued jobs; returns how many were dropped
    pub fn rollback(&self) -> Result<usize> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| lock_poisoned("rollback"))?;
        let dropped = pending.len();
        pending.clear();
        Ok(dropped)
    }
}

impl CommitHook for DeferredCommit {
    fn run_after_commit(&self, job: CommitJob) -> Result<()> {
        self.pending
            .lock()
            .map_err(|_| lock_poisoned("run_after_commit"))?
            .push(job);
        Ok(())
    }
}

impl std::fmt::Debug for DeferredCommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredCommit")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_job(counter: &Arc<AtomicUsize>) -> CommitJob {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_immediate_runs_now() {
        let counter = Arc::new(AtomicUsize::new(0));
        Immediate.run_after_commit(counting_job(&counter)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_waits_for_commit() {
        let counter = Arc::new(AtomicUsize::new(0));
        let hook = DeferredCommit::new();
        hook.run_after_commit(counting_job(&counter)).unwrap();
        hook.run_after_commit(counting_job(&counter)).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(hook.commit().unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(hook.pending(), 0);
    }

    #[test]
    fn test_rollback_discards() {
        let counter = Arc::new(AtomicUsize::new(0));
        let hook = DeferredCommit::new();
        hook.run_after_commit(counting_job(&counter)).unwrap();

        assert_eq!(hook.rollback().unwrap(), 1);
        assert_eq!(hook.commit().unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_commit_runs_all_and_reports_first_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let hook = DeferredCommit::new();
        hook.run_after_commit(Box::new(|| {
            Err(ExError::new(ExErrorKind::StoreUnavailable))
        }))
        .unwrap();
        hook.run_after_commit(counting_job(&counter)).unwrap();

        let err = hook.commit().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::StoreUnavailable);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
