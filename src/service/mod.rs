//! Orchestration service for the novel catalog
//!
//! Ties the scraper clients, the repositories, the distributed lock, and
//! the trend store together:
//! - discovery walks source-native ids into the staging catalog
//! - publish reconciles a staged entry into a reader-visible novel
//! - chapter sync appends newly discovered chapter headers
//! - chapter content is fetched lazily on first read and cached forever
//! - counters and the recency weight are recomputed by background jobs
//!
//! Per-item failures in bulk jobs are logged and skipped; whole-job setup
//! failures abort. Best-effort side effects (status flips, category
//! backfill) never fail their triggering operation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::analytics::TrendStore;
use crate::config::{DiscoverErrorPolicy, SyncConfig};
use crate::error::{Error, Result};
use crate::lock::{acquire_guarded, SyncLock};
use crate::metrics;
use crate::models::{CategorySummary, Chapter, Novel, NovelSource, QueryParams, SourceSite};
use crate::sources::{BiQuGe, Fetcher, QiDian};
use crate::storage::{
    ChapterRepository, NewNovel, NewNovelSource, NovelRepository, SourceRepository,
};
use crate::tasks::TaskPool;
use crate::utils::word_count;

const LOCK_SYNC_SOURCE: &str = "novel-sync-source";
const LOCK_UPDATE_ALL_WORD_COUNT: &str = "novel-update-all-word-count";
const LOCK_UPDATE_ALL_CHAPTER_COUNT: &str = "novel-update-chapter-count";

const SYNC_SOURCE_LOCK_TTL: Duration = Duration::from_secs(60 * 60);
const RECOMPUTE_LOCK_TTL: Duration = Duration::from_secs(10 * 60);

/// How many of the most recent chapters feed the recency weight
const RECENT_CHAPTER_SAMPLE: usize = 10;

/// Top-N size of the hot keyword surface
const HOT_KEYWORD_LIMIT: usize = 10;

/// Category summary cache TTL
const CATEGORY_SUMMARY_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Category backfill only bothers with novels of some substance
const CATEGORY_BACKFILL_MIN_CHAPTERS: i64 = 100;

/// Discovery bounds and error policy, lifted from [`SyncConfig`]
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub discover_floor: i64,
    pub discover_max: i64,
    pub discover_error_policy: DiscoverErrorPolicy,
}

impl From<&SyncConfig> for SyncPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            discover_floor: config.discover_floor,
            discover_max: config.discover_max,
            discover_error_policy: config.discover_error_policy,
        }
    }
}

/// Recency-decay score over chapter update times
///
/// +10 per chapter updated within a day, +2 within a week, +1 within a
/// month, nothing beyond. Drives how often a novel gets re-synced.
pub fn recency_weight(update_times: &[DateTime<Utc>], now: DateTime<Utc>) -> i64 {
    let one_day = ChronoDuration::days(1);
    let one_week = ChronoDuration::weeks(1);
    let one_month = ChronoDuration::days(30);

    update_times
        .iter()
        .map(|updated_at| {
            let age = now - *updated_at;
            if age < one_day {
                10
            } else if age < one_week {
                2
            } else if age < one_month {
                1
            } else {
                0
            }
        })
        .sum()
}

/// The orchestration service
pub struct NovelSrv {
    novels: Arc<dyn NovelRepository>,
    chapters: Arc<dyn ChapterRepository>,
    sources: Arc<dyn SourceRepository>,
    biquge: Arc<BiQuGe>,
    qidian: Arc<QiDian>,
    lock: Arc<dyn SyncLock>,
    trends: Arc<dyn TrendStore>,
    tasks: Arc<TaskPool>,
    policy: SyncPolicy,
}

impl NovelSrv {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        novels: Arc<dyn NovelRepository>,
        chapters: Arc<dyn ChapterRepository>,
        sources: Arc<dyn SourceRepository>,
        biquge: Arc<BiQuGe>,
        qidian: Arc<QiDian>,
        lock: Arc<dyn SyncLock>,
        trends: Arc<dyn TrendStore>,
        tasks: Arc<TaskPool>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            novels,
            chapters,
            sources,
            biquge,
            qidian,
            lock,
            trends,
            tasks,
            policy,
        }
    }

    // ========================================================================
    // Fetcher resolution
    // ========================================================================

    /// Resolve the fetcher for an already-looked-up catalog entry
    fn fetcher_for_entry(&self, entry: &NovelSource) -> Result<Box<dyn Fetcher>> {
        match entry.source {
            SourceSite::BiQuGe => Ok(Box::new(self.biquge.fetcher(entry.source_id))),
            // QiDian only offers search; it cannot back a novel's chapters
            SourceSite::QiDian => Err(Error::UnsupportedSource(entry.source)),
        }
    }

    /// Resolve a fetcher from a novel identity
    ///
    /// Fails with [`Error::SourceNotFound`] when no catalog entry matches;
    /// that is the answer to "why can't I sync this novel".
    pub fn fetcher_for(&self, params: &QueryParams) -> Result<Box<dyn Fetcher>> {
        let entry = self
            .sources
            .find_one(params)?
            .ok_or_else(|| Error::SourceNotFound {
                name: params.name.clone(),
                author: params.author.clone(),
            })?;
        self.fetcher_for_entry(&entry)
    }

    /// Resolve a fetcher from a novel id
    pub fn fetcher_for_novel(&self, novel_id: i64) -> Result<Box<dyn Fetcher>> {
        let novel = self
            .novels
            .get(novel_id)?
            .ok_or(Error::NovelNotFound(novel_id))?;
        let mut params = QueryParams::new(novel.name, novel.author);
        params.source = Some(novel.source);
        self.fetcher_for(&params)
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Walk the primary source's id space and stage new titles
    ///
    /// Guarded by a cluster-wide lock; a second instance calling this while
    /// a walk runs returns immediately with no work done.
    pub async fn sync_source(&self) -> Result<()> {
        let Some(guard) =
            acquire_guarded(&self.lock, LOCK_SYNC_SOURCE, SYNC_SOURCE_LOCK_TTL).await?
        else {
            tracing::info!("source sync already running elsewhere");
            return Ok(());
        };

        let result = self.discover_biquge().await;
        if let Err(e) = guard.release().await {
            tracing::warn!(error = %e, "failed to release source sync lock");
        }
        result
    }

    /// Sequential id walk over BiQuGe, resuming past the highest staged id
    async fn discover_biquge(&self) -> Result<()> {
        let staged_max = self.sources.max_source_id(SourceSite::BiQuGe)?;
        let floor = self.policy.discover_floor.max(staged_max);

        for id in (floor + 1)..=self.policy.discover_max {
            if self.sources.exists(SourceSite::BiQuGe, id)? {
                continue;
            }

            let detail = match self.biquge.get_detail(id).await {
                Ok(detail) => detail,
                // A page that parses as "not a novel" is a vacant id
                Err(Error::Parse(e)) if e.is_novel_missing() => continue,
                Err(e) => match self.policy.discover_error_policy {
                    DiscoverErrorPolicy::SkipAndContinue => {
                        tracing::error!(id, error = %e, "discover scrape failed");
                        metrics::record_fetch(SourceSite::BiQuGe.as_str(), "error");
                        continue;
                    }
                    DiscoverErrorPolicy::Abort => return Err(e),
                },
            };
            if detail.is_empty() {
                continue;
            }

            let entry = NewNovelSource {
                name: detail.name,
                author: detail.author,
                source: SourceSite::BiQuGe,
                source_id: id,
            };
            match self.sources.create(&entry) {
                Ok(created) => {
                    tracing::info!(id, name = %created.name, "staged new novel source");
                }
                // Same title under a different id; first discovery wins
                Err(e) if e.is_constraint_violation() => {
                    tracing::debug!(id, name = %entry.name, "duplicate title, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Publish
    // ========================================================================

    /// Turn a staged catalog entry into a reader-visible novel
    ///
    /// Idempotent: when a novel with this (name, author) already exists it
    /// is returned unchanged with no fetch and no insert. The originating
    /// catalog entry's status flip to Published is best-effort and happens
    /// off the request path.
    pub async fn publish(&self, params: QueryParams) -> Result<Novel> {
        if let Some(existing) = self.novels.find_one(&params)? {
            return Ok(existing);
        }

        let entry = self
            .sources
            .find_one(&params)?
            .ok_or_else(|| Error::SourceNotFound {
                name: params.name.clone(),
                author: params.author.clone(),
            })?;
        let fetcher = self.fetcher_for_entry(&entry)?;
        let mut detail = fetcher.detail().await?;

        // The secondary source's summary (and cover, when present) is
        // richer than the primary's
        match self.qidian.search(&params.name, &params.author).await {
            Ok(Some(enriched)) if !enriched.is_empty() => {
                detail.summary = enriched.summary;
                if !enriched.cover_url.is_empty() {
                    detail.cover_url = enriched.cover_url;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(name = %params.name, error = %e, "secondary source lookup failed");
            }
        }

        let novel = self.novels.create(&NewNovel {
            name: detail.name,
            author: detail.author,
            source: entry.source,
            summary: detail.summary,
            cover: detail.cover_url,
        })?;
        metrics::record_publish(entry.source.as_str());
        metrics::record_event(
            "novel-publish",
            HashMap::from([("name", novel.name.clone()), ("author", novel.author.clone())]),
        );

        // The novel row is the important side effect; the status flip is
        // best-effort and only logged on failure
        let sources = Arc::clone(&self.sources);
        let (name, author) = (params.name.clone(), params.author.clone());
        if let Err(e) = self.tasks.spawn("publish-status-flip", async move {
            let affected = sources.mark_published(&name, &author)?;
            if affected == 0 {
                tracing::warn!(name = %name, "no source entry to mark published");
            }
            Ok(())
        }) {
            tracing::warn!(name = %params.name, error = %e, "status flip not queued");
        }

        Ok(novel)
    }

    // ========================================================================
    // Chapter sync
    // ========================================================================

    /// Append chapter headers the source has but we do not
    ///
    /// No-ops when the source reports no more chapters than are stored;
    /// stale local chapters are never deleted even if the source shrank.
    /// Relies on the source's chapter list being append-only so the suffix
    /// beyond the current count is exactly the new material.
    pub async fn update_chapters(&self, novel_id: i64) -> Result<()> {
        let novel = self
            .novels
            .get(novel_id)?
            .ok_or(Error::NovelNotFound(novel_id))?;
        let mut params = QueryParams::new(novel.name.clone(), novel.author.clone());
        params.source = Some(novel.source);
        let fetcher = self.fetcher_for(&params)?;

        let stubs = fetcher.chapters().await?;
        let current = self.chapters.count(novel_id)?;
        if stubs.len() as i64 <= current {
            return Ok(());
        }

        let fresh = &stubs[current as usize..];
        let inserted = self.chapters.bulk_create(novel_id, fresh)?;
        metrics::record_chapters_synced(novel.source.as_str(), inserted);
        tracing::info!(novel_id, inserted, "chapters synced");
        Ok(())
    }

    /// Chapter sync across the catalog for novels at or above a weight
    pub async fn update_all_chapters_by_weight(&self, min_weight: i64) -> Result<()> {
        let max_id = self.novels.max_id()?;
        for id in 1..=max_id {
            let Some(novel) = self.novels.get(id)? else {
                continue;
            };
            if novel.updated_weight < min_weight {
                continue;
            }
            if let Err(e) = self.update_chapters(id).await {
                tracing::error!(novel_id = id, error = %e, "chapter sync failed");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Chapter content
    // ========================================================================

    /// Fetch one chapter, pulling its content from the source on first read
    ///
    /// Content is permanent once stored: a non-empty row short-circuits
    /// with no outbound fetch, even if the source's copy changed since.
    pub async fn get_chapter_detail(&self, novel_id: i64, no: i64) -> Result<Chapter> {
        let chapter = self
            .chapters
            .find(novel_id, no)?
            .ok_or(Error::ChapterNotFound { novel_id, no })?;
        if !chapter.content.is_empty() {
            return Ok(chapter);
        }

        let fetcher = self.fetcher_for_novel(novel_id)?;
        let content = fetcher.chapter_content(no as usize).await?;
        let count = word_count(&content);
        self.chapters.set_content(chapter.id, &content, count)
    }

    /// Pull content for every stored chapter of a novel
    pub async fn fetch_all_chapter_content(&self, novel_id: i64) -> Result<()> {
        let count = self.chapters.count(novel_id)?;
        for no in 0..count {
            self.get_chapter_detail(novel_id, no).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Aggregate maintenance
    // ========================================================================

    /// Refresh a novel's chapter-count field from the highest stored number
    pub fn update_chapter_count(&self, novel_id: i64) -> Result<()> {
        let Some(latest_no) = self.chapters.latest_no(novel_id)? else {
            return Ok(());
        };
        let novel = self
            .novels
            .get(novel_id)?
            .ok_or(Error::NovelNotFound(novel_id))?;
        if novel.chapter_count == latest_no {
            return Ok(());
        }
        self.novels.update_chapter_count(novel_id, latest_no)
    }

    /// Refresh a novel's total word count
    ///
    /// Skips the whole recompute when the newest chapter update predates
    /// `updated_after`; untouched novels stay cheap.
    pub fn update_word_count(&self, novel_id: i64, updated_after: DateTime<Utc>) -> Result<()> {
        let Some(latest) = self.chapters.latest_updated_at(novel_id)? else {
            return Ok(());
        };
        if latest < updated_after {
            return Ok(());
        }

        let total = self.chapters.sum_word_count(novel_id)?;
        let novel = self
            .novels
            .get(novel_id)?
            .ok_or(Error::NovelNotFound(novel_id))?;
        if novel.word_count == total {
            return Ok(());
        }
        self.novels.update_word_count(novel_id, total)
    }

    /// Re-score a novel's update recency
    pub fn update_updated_weight(&self, novel_id: i64) -> Result<()> {
        let times = self
            .chapters
            .recent_update_times(novel_id, RECENT_CHAPTER_SAMPLE)?;
        let weight = recency_weight(&times, Utc::now());
        self.novels.update_updated_weight(novel_id, weight)
    }

    /// Word-count recompute across the catalog, cluster-locked
    pub async fn update_all_word_count(&self) -> Result<()> {
        if !self
            .lock
            .acquire(LOCK_UPDATE_ALL_WORD_COUNT, RECOMPUTE_LOCK_TTL)
            .await?
        {
            tracing::info!("word count recompute already running elsewhere");
            return Ok(());
        }

        // Only novels touched in the last two days are worth summing
        let updated_after = Utc::now() - ChronoDuration::days(2);
        self.for_each_novel(|id| self.update_word_count(id, updated_after))
    }

    /// Chapter-count recompute across the catalog, cluster-locked
    pub async fn update_all_chapter_count(&self) -> Result<()> {
        if !self
            .lock
            .acquire(LOCK_UPDATE_ALL_CHAPTER_COUNT, RECOMPUTE_LOCK_TTL)
            .await?
        {
            tracing::info!("chapter count recompute already running elsewhere");
            return Ok(());
        }

        self.for_each_novel(|id| self.update_chapter_count(id))
    }

    /// Weight recompute across the catalog
    pub fn update_all_updated_weight(&self) -> Result<()> {
        self.for_each_novel(|id| self.update_updated_weight(id))
    }

    /// Run a per-novel job over ids 1..=max, skipping gaps
    fn for_each_novel(&self, job: impl Fn(i64) -> Result<()>) -> Result<()> {
        let max_id = self.novels.max_id()?;
        for id in 1..=max_id {
            match job(id) {
                Ok(()) => {}
                // Ids can have gaps; a missing row is not a failure
                Err(Error::NovelNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Counters and covers
    // ========================================================================

    pub fn add_views(&self, novel_id: i64) -> Result<()> {
        self.novels.add_views(novel_id, 1)
    }

    pub fn add_favorites(&self, novel_id: i64) -> Result<()> {
        self.novels.add_favorites(novel_id, 1)
    }

    /// Stored cover reference for a novel
    pub fn get_cover(&self, novel_id: i64) -> Result<String> {
        let novel = self
            .novels
            .get(novel_id)?
            .ok_or(Error::NovelNotFound(novel_id))?;
        Ok(novel.cover)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    /// Backfill categories from the secondary source
    ///
    /// Only novels with real substance and no categories yet are worth a
    /// search; per-novel failures are logged and skipped.
    pub async fn update_all_category(&self) -> Result<()> {
        let novels = self
            .novels
            .list_uncategorized(CATEGORY_BACKFILL_MIN_CHAPTERS)?;
        for item in novels {
            let found = match self.qidian.search(&item.name, &item.author).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(name = %item.name, error = %e, "category search failed");
                    continue;
                }
            };
            let Some(found) = found else {
                continue;
            };
            if found.category.is_empty() {
                continue;
            }
            if let Err(e) = self.novels.set_categories(item.id, &[found.category]) {
                tracing::error!(name = %item.name, author = %item.author, error = %e, "update category fail");
            }
        }
        Ok(())
    }

    /// Recompute the category summary and cache it
    pub async fn update_category_summary(&self) -> Result<()> {
        let novels = self.novels.list_categorized()?;
        let mut data: HashMap<String, i64> = HashMap::new();
        for novel in &novels {
            for category in &novel.categories {
                *data.entry(category.clone()).or_insert(0) += 1;
            }
        }

        let mut summaries: Vec<CategorySummary> = data
            .into_iter()
            .map(|(name, count)| CategorySummary { name, count })
            .collect();
        summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        // A failed cache write only costs readers a stale summary
        if let Err(e) = self
            .trends
            .set_category_summary(&summaries, CATEGORY_SUMMARY_TTL)
            .await
        {
            tracing::warn!(error = %e, "category summary cache write failed");
        }
        Ok(())
    }

    /// Read the cached category summary
    pub async fn list_category_summary(&self) -> Result<Vec<CategorySummary>> {
        Ok(self.trends.get_category_summary().await?.unwrap_or_default())
    }

    // ========================================================================
    // Hot keywords
    // ========================================================================

    /// Bump a search keyword on the leaderboard
    pub async fn add_hot_keyword(&self, keyword: &str) -> Result<()> {
        if keyword.is_empty() {
            return Ok(());
        }
        self.trends.incr_keyword(keyword).await
    }

    /// Top trending search keywords
    pub async fn list_hot_keywords(&self) -> Result<Vec<String>> {
        self.trends.top_keywords(HOT_KEYWORD_LIMIT).await
    }

    /// Reset the leaderboard (scheduled daily)
    pub async fn clear_hot_keywords(&self) -> Result<()> {
        self.trends.clear_keywords().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours_ago(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
        now - ChronoDuration::hours(hours)
    }

    #[test]
    fn test_recency_weight_tiers() {
        let now = Utc::now();

        // 30 minutes ago scores the full 10
        assert_eq!(recency_weight(&[now - ChronoDuration::minutes(30)], now), 10);
        // 10 days ago falls in the one-week..one-month band
        assert_eq!(recency_weight(&[now - ChronoDuration::days(10)], now), 2);
        // 45 days ago contributes nothing
        assert_eq!(recency_weight(&[now - ChronoDuration::days(45)], now), 0);
    }

    #[test]
    fn test_recency_weight_boundaries() {
        let now = Utc::now();

        assert_eq!(recency_weight(&[hours_ago(now, 23)], now), 10);
        assert_eq!(recency_weight(&[hours_ago(now, 25)], now), 2);
        assert_eq!(recency_weight(&[now - ChronoDuration::days(8)], now), 1);
        assert_eq!(recency_weight(&[now - ChronoDuration::days(30)], now), 0);
    }

    #[test]
    fn test_recency_weight_sums_over_chapters() {
        let now = Utc::now();
        let times = vec![
            hours_ago(now, 1),
            hours_ago(now, 2),
            now - ChronoDuration::days(3),
            now - ChronoDuration::days(60),
        ];
        assert_eq!(recency_weight(&times, now), 22);
        assert_eq!(recency_weight(&[], now), 0);
    }
}
