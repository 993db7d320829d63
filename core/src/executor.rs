//! Parallel Executor: a bounded rayon pool, order-preserving,
//! with per-task failure isolation and cooperative cancellation.

use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::MapperError;

/// Outcome of one item dispatched through the executor.
pub enum TaskOutcome<T> {
    Success(T),
    Failed(MapperError),
    /// Work was cancelled before (or while) it ran.
    Cancelled,
}

/// Cooperative cancellation signal shared across a batch's workers.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
}

impl ParallelExecutor {
    /// Build a pool sized to `min(cpu*2+4, configured_max)`.
    pub fn new(worker_count: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count.max(1))
            .thread_name(|i| format!("medterm-worker-{i}"))
            .build()
            .expect("failed to build worker pool");
        Self { pool }
    }

    /// Run `per_item` over every element of `items`, writing results back
    /// into a slice indexed by input position so output order always
    /// matches input order. A panic in one task is isolated and
    /// reported as `TaskOutcome::Failed` for that slot only. If `cancel` is
    /// already (or becomes) set, not-yet-started items resolve to
    /// `TaskOutcome::Cancelled` without running `per_item`.
    pub fn run<T, I, F>(&self, items: Vec<I>, cancel: &CancellationToken, per_item: F) -> Vec<TaskOutcome<T>>
    where
        T: Send,
        I: Send,
        F: Fn(I) -> Result<T, MapperError> + Sync,
    {
        self.pool.install(|| {
            items
                .into_par_iter()
                .map(|item| {
                    if cancel.is_cancelled() {
                        return TaskOutcome::Cancelled;
                    }
                    match catch_unwind(AssertUnwindSafe(|| per_item(item))) {
                        Ok(Ok(value)) => TaskOutcome::Success(value),
                        Ok(Err(err)) => TaskOutcome::Failed(err),
                        Err(_) => TaskOutcome::Failed(MapperError::internal(
                            "worker task panicked",
                        )),
                    }
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_input_order() {
        let executor = ParallelExecutor::new(4);
        let cancel = CancellationToken::new();
        let items: Vec<i32> = (0..50).collect();
        let results = executor.run(items, &cancel, |i| Ok::<i32, MapperError>(i * 2));
        for (idx, outcome) in results.into_iter().enumerate() {
            match outcome {
                TaskOutcome::Success(v) => assert_eq!(v, idx as i32 * 2),
                _ => panic!("expected success"),
            }
        }
    }

    #[test]
    fn isolates_single_task_failure() {
        let executor = ParallelExecutor::new(2);
        let cancel = CancellationToken::new();
        let items = vec![1, 2, 3];
        let results = executor.run(items, &cancel, |i| {
            if i == 2 {
                Err(MapperError::invalid_input("boom"))
            } else {
                Ok(i)
            }
        });
        assert!(matches!(results[0], TaskOutcome::Success(1)));
        assert!(matches!(results[1], TaskOutcome::Failed(_)));
        assert!(matches!(results[2], TaskOutcome::Success(3)));
    }

    #[test]
    fn cancelled_token_short_circuits_pending_work() {
        let executor = ParallelExecutor::new(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let items = vec![1, 2, 3];
        let results = executor.run(items, &cancel, |i| Ok::<i32, MapperError>(i));
        assert!(results
            .iter()
            .all(|r| matches!(r, TaskOutcome::Cancelled)));
    }
}
