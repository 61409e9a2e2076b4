//! Periodic job scheduling
//!
//! The cadence table the platform runs on:
//! - word-count, chapter-count, and weight recomputes daily
//! - weighted chapter re-sync hourly / 12-hourly / daily by weight tier,
//!   approximating "active novels sync more often" without per-novel
//!   schedules
//! - category summary every 12 hours, category backfill daily
//! - hot-keyword reset daily
//!
//! Each job is an interval loop; a failing tick is logged and counted, and
//! the loop keeps going. Cluster-level exclusion lives inside the guarded
//! service calls, not here.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::metrics;
use crate::service::NovelSrv;

/// Novels at or above this weight re-sync hourly
pub const WEIGHT_TIER_HOURLY: i64 = 50;

/// Novels at or above this weight re-sync every 12 hours
pub const WEIGHT_TIER_HALF_DAILY: i64 = 10;

/// Novels at or above this weight re-sync daily
pub const WEIGHT_TIER_DAILY: i64 = 1;

const HOUR: Duration = Duration::from_secs(60 * 60);
const HALF_DAY: Duration = Duration::from_secs(12 * 60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Running set of periodic jobs
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the full cadence table over a shared service handle
    pub fn start(srv: Arc<NovelSrv>) -> Self {
        let mut handles = Vec::new();

        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("update-all-word-count", DAY, move || {
                let srv = Arc::clone(&srv);
                async move { srv.update_all_word_count().await }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("update-all-chapter-count", DAY, move || {
                let srv = Arc::clone(&srv);
                async move { srv.update_all_chapter_count().await }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("update-all-updated-weight", DAY, move || {
                let srv = Arc::clone(&srv);
                async move { srv.update_all_updated_weight() }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("sync-chapters-hot", HOUR, move || {
                let srv = Arc::clone(&srv);
                async move { srv.update_all_chapters_by_weight(WEIGHT_TIER_HOURLY).await }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("sync-chapters-warm", HALF_DAY, move || {
                let srv = Arc::clone(&srv);
                async move {
                    srv.update_all_chapters_by_weight(WEIGHT_TIER_HALF_DAILY)
                        .await
                }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("sync-chapters-cold", DAY, move || {
                let srv = Arc::clone(&srv);
                async move { srv.update_all_chapters_by_weight(WEIGHT_TIER_DAILY).await }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("update-category-summary", HALF_DAY, move || {
                let srv = Arc::clone(&srv);
                async move { srv.update_category_summary().await }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("update-all-category", DAY, move || {
                let srv = Arc::clone(&srv);
                async move { srv.update_all_category().await }
            }));
        }
        {
            let srv = Arc::clone(&srv);
            handles.push(spawn_job("reset-hot-keywords", DAY, move || {
                let srv = Arc::clone(&srv);
                async move { srv.clear_hot_keywords().await }
            }));
        }

        Self { handles }
    }

    /// Stop all jobs
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Run a named job on a fixed period until aborted
fn spawn_job<F, Fut>(name: &'static str, period: Duration, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so jobs start one
        // period after boot rather than stampeding at startup
        interval.tick().await;

        loop {
            interval.tick().await;
            let started = Instant::now();
            match job().await {
                Ok(()) => {
                    metrics::record_job(name, "ok", started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    tracing::error!(job = name, error = %e, "scheduled job failed");
                    metrics::record_job(name, "error", started.elapsed().as_secs_f64());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_weight_tiers_ordered() {
        assert!(WEIGHT_TIER_HOURLY > WEIGHT_TIER_HALF_DAILY);
        assert!(WEIGHT_TIER_HALF_DAILY > WEIGHT_TIER_DAILY);
        assert!(WEIGHT_TIER_DAILY > 0);
    }

    #[tokio::test]
    async fn test_spawn_job_ticks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = {
            let counter = Arc::clone(&counter);
            spawn_job("tick", Duration::from_millis(10), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_spawn_job_survives_errors() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = {
            let counter = Arc::clone(&counter);
            spawn_job("fails", Duration::from_millis(10), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(crate::error::Error::config("tick failed"))
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }
}
