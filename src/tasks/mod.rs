//! Bounded worker pool for background jobs
//!
//! Request handlers and the publish path hand long-running work off here
//! instead of detaching anonymous tasks: every job carries a name, a full
//! queue rejects instead of growing without bound, and completion/failure
//! is logged and counted per job. The submitting caller never observes the
//! job's outcome directly, only through logs and metrics.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::metrics;

struct Job {
    name: String,
    fut: BoxFuture<'static, Result<()>>,
}

/// Fixed-size worker pool over a bounded queue
pub struct TaskPool {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Start `workers` workers over a queue of `capacity` pending jobs
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        };
                        let Some(job) = job else {
                            break;
                        };

                        let started = Instant::now();
                        tracing::debug!(worker, job = %job.name, "job started");
                        let outcome = match job.fut.await {
                            Ok(()) => "ok",
                            Err(e) => {
                                tracing::error!(worker, job = %job.name, error = %e, "job failed");
                                "error"
                            }
                        };
                        let elapsed = started.elapsed();
                        metrics::record_job(&job.name, outcome, elapsed.as_secs_f64());
                        tracing::info!(
                            worker,
                            job = %job.name,
                            outcome,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "job finished"
                        );
                    }
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Submit a named job
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskQueueFull`] when the queue has no room; the
    /// caller decides whether that is worth surfacing.
    pub fn spawn<F>(&self, name: impl Into<String>, fut: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let job = Job {
            name: name.clone(),
            fut: fut.boxed(),
        };
        self.tx
            .try_send(job)
            .map_err(|_| Error::TaskQueueFull(name))
    }

    /// Close the queue and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_jobs_run_to_completion() {
        let pool = TaskPool::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.spawn("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_kill_worker() {
        let pool = TaskPool::new(1, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.spawn("fails", async { Err(Error::config("boom")) })
            .unwrap();

        let c = Arc::clone(&counter);
        pool.spawn("after", async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queue_full_rejection() {
        let pool = TaskPool::new(1, 1);
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

        // First job blocks the single worker
        pool.spawn("blocker", async move {
            let _ = gate_rx.await;
            Ok(())
        })
        .unwrap();

        // Fill the queue, then overflow it
        let mut rejected = false;
        for _ in 0..4 {
            if let Err(Error::TaskQueueFull(name)) = pool.spawn("filler", async { Ok(()) }) {
                assert_eq!(name, "filler");
                rejected = true;
                break;
            }
        }
        assert!(rejected, "queue should eventually reject");

        let _ = gate_tx.send(());
        pool.shutdown().await;
    }
}
