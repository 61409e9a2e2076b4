//! Read-side analytics stores
//!
//! Two small derived datasets live outside the relational store:
//! - Hot search keywords: a sorted-set leaderboard bumped on every search
//!   that yields results, read back top-N for a "trending searches"
//!   surface, reset daily so it reflects recent activity.
//! - Category summary: name→count over novel categories, recomputed
//!   periodically and cached with a TTL. Purely a cache, never a source of
//!   truth.
//!
//! [`RedisTrendStore`] is the production implementation;
//! [`MemoryTrendStore`] backs tests and single-node runs.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::models::CategorySummary;

/// Store for the keyword leaderboard and the category summary cache
#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Bump a search keyword's score by one
    async fn incr_keyword(&self, keyword: &str) -> Result<()>;

    /// Top keywords by score, highest first
    async fn top_keywords(&self, limit: usize) -> Result<Vec<String>>;

    /// Drop the whole leaderboard
    async fn clear_keywords(&self) -> Result<()>;

    /// Cache the recomputed category summary
    async fn set_category_summary(
        &self,
        summaries: &[CategorySummary],
        ttl: Duration,
    ) -> Result<()>;

    /// Read the cached category summary, None when absent or expired
    async fn get_category_summary(&self) -> Result<Option<Vec<CategorySummary>>>;
}

// ============================================================================
// Redis Implementation
// ============================================================================

/// Redis-backed trend store
pub struct RedisTrendStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisTrendStore {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn keywords_key(&self) -> String {
        format!("{}:hot-keywords", self.key_prefix)
    }

    fn summary_key(&self) -> String {
        format!("{}:category-summary", self.key_prefix)
    }
}

#[async_trait]
impl TrendStore for RedisTrendStore {
    async fn incr_keyword(&self, keyword: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: f64 = conn.zincr(self.keywords_key(), keyword, 1).await?;
        Ok(())
    }

    async fn top_keywords(&self, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let keywords: Vec<String> = conn
            .zrevrange(self.keywords_key(), 0, limit.saturating_sub(1) as isize)
            .await?;
        Ok(keywords)
    }

    async fn clear_keywords(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(self.keywords_key()).await?;
        Ok(())
    }

    async fn set_category_summary(
        &self,
        summaries: &[CategorySummary],
        ttl: Duration,
    ) -> Result<()> {
        let encoded = serde_json::to_vec(summaries)?;
        let mut conn = self.pool.get().await?;
        let _: () = conn
            .set_ex(self.summary_key(), encoded, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn get_category_summary(&self) -> Result<Option<Vec<CategorySummary>>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<Vec<u8>> = conn.get(self.summary_key()).await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// Single-process trend store with the same semantics
#[derive(Default)]
pub struct MemoryTrendStore {
    keywords: Mutex<HashMap<String, i64>>,
    summary: Mutex<Option<(Vec<CategorySummary>, Instant)>>,
}

impl MemoryTrendStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrendStore for MemoryTrendStore {
    async fn incr_keyword(&self, keyword: &str) -> Result<()> {
        let mut keywords = self.keywords.lock().unwrap();
        *keywords.entry(keyword.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn top_keywords(&self, limit: usize) -> Result<Vec<String>> {
        let keywords = self.keywords.lock().unwrap();
        let mut entries: Vec<_> = keywords.iter().collect();
        // Tie-break on the keyword for a stable order
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn clear_keywords(&self) -> Result<()> {
        self.keywords.lock().unwrap().clear();
        Ok(())
    }

    async fn set_category_summary(
        &self,
        summaries: &[CategorySummary],
        ttl: Duration,
    ) -> Result<()> {
        let mut summary = self.summary.lock().unwrap();
        *summary = Some((summaries.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn get_category_summary(&self) -> Result<Option<Vec<CategorySummary>>> {
        let summary = self.summary.lock().unwrap();
        match summary.as_ref() {
            Some((data, expires_at)) if *expires_at > Instant::now() => Ok(Some(data.clone())),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_leaderboard() {
        let store = MemoryTrendStore::new();
        for kw in ["斗破", "斗破", "凡人", "斗破", "凡人", "遮天"] {
            store.incr_keyword(kw).await.unwrap();
        }

        let top = store.top_keywords(2).await.unwrap();
        assert_eq!(top, vec!["斗破".to_string(), "凡人".to_string()]);

        store.clear_keywords().await.unwrap();
        assert!(store.top_keywords(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_category_summary_roundtrip() {
        let store = MemoryTrendStore::new();
        assert!(store.get_category_summary().await.unwrap().is_none());

        let summaries = vec![CategorySummary {
            name: "玄幻".into(),
            count: 12,
        }];
        store
            .set_category_summary(&summaries, Duration::from_secs(60))
            .await
            .unwrap();

        let cached = store.get_category_summary().await.unwrap().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "玄幻");
    }

    #[tokio::test]
    async fn test_category_summary_expiry() {
        let store = MemoryTrendStore::new();
        store
            .set_category_summary(&[], Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get_category_summary().await.unwrap().is_none());
    }

    // Integration tests require running Redis
    #[tokio::test]
    #[ignore = "Requires running Redis"]
    async fn test_redis_keyword_roundtrip() {
        let cfg = deadpool_redis::Config::from_url("redis://localhost:6379");
        let pool = cfg
            .builder()
            .unwrap()
            .runtime(deadpool_redis::Runtime::Tokio1)
            .build()
            .unwrap();
        let store = RedisTrendStore::new(pool, "wenku-test");

        store.clear_keywords().await.unwrap();
        store.incr_keyword("测试").await.unwrap();
        let top = store.top_keywords(10).await.unwrap();
        assert_eq!(top, vec!["测试".to_string()]);
        store.clear_keywords().await.unwrap();
    }
}
