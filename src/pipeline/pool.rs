//! Bounded worker pool with positional results.

use std::{collections::VecDeque, future::Future, sync::Arc};

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A fixed number of workers draining a shared queue.
///
/// Output `i` of [`WorkerPool::run`] always belongs to input `i`, whatever
/// order the work finishes in. Slots left unprocessed because the run was
/// cancelled come back as `None`.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        WorkerPool {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Runs `job` over `items`. Once `cancel` fires, workers stop taking
    /// items; work in flight finishes.
    pub async fn run<T, O, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        job: F,
    ) -> Vec<Option<O>>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        let len = items.len();
        let mut results: Vec<Option<O>> = (0..len).map(|_| None).collect();
        if len == 0 {
            return results;
        }

        let queue = Arc::new(Mutex::new(items.into_iter().enumerate().collect::<VecDeque<_>>()));
        let job = Arc::new(job);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for _ in 0..self.max_workers.min(len) {
            let queue = Arc::clone(&queue);
            let job = Arc::clone(&job);
            let tx = tx.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                while !cancel.is_cancelled() {
                    let Some((index, item)) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let output = job(item).await;
                    if tx.send((index, output)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        while let Some((index, output)) = rx.recv().await {
            results[index] = Some(output);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task failed");
            }
        }

        results
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn should_keep_input_order() {
        let pool = WorkerPool::new(4);
        let items: Vec<u64> = (0..10).collect();

        let results = pool
            .run(items, &CancellationToken::new(), |i| async move {
                tokio::time::sleep(Duration::from_millis((10 - i) * 3)).await;
                i * 100
            })
            .await;

        let expected: Vec<Option<u64>> = (0..10).map(|i| Some(i * 100)).collect();
        assert_eq!(results, expected);
    }

    #[tokio::test]
    async fn should_never_exceed_max_workers() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (r, p) = (running.clone(), peak.clone());
        pool.run((0..12).collect::<Vec<u32>>(), &CancellationToken::new(), move |_| {
            let (running, peak) = (r.clone(), p.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn should_skip_remaining_work_once_cancelled() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let results = pool
            .run(vec![1, 2, 3], &cancel, move |i| {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    i
                }
            })
            .await;

        assert_eq!(results, vec![Some(1), None, None]);
    }

    #[tokio::test]
    async fn should_run_again_after_a_cancelled_run() {
        let pool = WorkerPool::new(2);
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let first = pool.run(vec![1, 2, 3], &cancelled, |i| async move { i }).await;
        let second = pool
            .run(vec![1, 2, 3], &CancellationToken::new(), |i| async move { i })
            .await;

        assert_eq!(first, vec![None, None, None]);
        assert_eq!(second, vec![Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn should_handle_empty_input() {
        let pool = WorkerPool::new(4);
        let results: Vec<Option<u8>> = pool
            .run(Vec::<u8>::new(), &CancellationToken::new(), |i| async move { i }).await;
        assert!(results.is_empty());
    }
}
