//! Shared helpers for integration tests
//!
//! Builds the orchestration service over in-memory SQLite, the in-process
//! lock and trend store, and scraper clients pointed at wiremock servers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use wenku::analytics::{MemoryTrendStore, TrendStore};
use wenku::config::DiscoverErrorPolicy;
use wenku::lock::{MemorySyncLock, SyncLock};
use wenku::service::{NovelSrv, SyncPolicy};
use wenku::sources::{BiQuGe, QiDian, SourceClient};
use wenku::storage::{ChapterRepository, Database, NovelRepository, SourceRepository};
use wenku::tasks::TaskPool;

/// Knobs individual tests care about
pub struct EnvOptions {
    pub cache_ttl: Duration,
    pub client_retries: u32,
    pub policy: SyncPolicy,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            client_retries: 0,
            policy: SyncPolicy {
                discover_floor: 0,
                discover_max: 3,
                discover_error_policy: DiscoverErrorPolicy::SkipAndContinue,
            },
        }
    }
}

pub struct TestEnv {
    pub db: Arc<Database>,
    pub srv: Arc<NovelSrv>,
    pub lock: Arc<dyn SyncLock>,
    pub trends: Arc<MemoryTrendStore>,
    pub tasks: Arc<TaskPool>,
}

impl TestEnv {
    pub fn novels(&self) -> Arc<dyn NovelRepository> {
        self.db.clone()
    }

    pub fn chapters(&self) -> Arc<dyn ChapterRepository> {
        self.db.clone()
    }

    pub fn sources(&self) -> Arc<dyn SourceRepository> {
        self.db.clone()
    }
}

/// Wire a service against mock source sites
pub fn test_env(biquge_url: &str, qidian_url: &str, opts: EnvOptions) -> TestEnv {
    let db = Database::in_memory().unwrap().shared();

    let biquge_client = SourceClient::with_config(
        biquge_url,
        100,
        opts.client_retries,
        10,
        Duration::from_secs(5),
    )
    .unwrap();
    let biquge = Arc::new(BiQuGe::new(biquge_client, 50, opts.cache_ttl));

    let qidian_client =
        SourceClient::with_config(qidian_url, 100, 0, 10, Duration::from_secs(5)).unwrap();
    let qidian = Arc::new(QiDian::new(qidian_client));

    let lock: Arc<dyn SyncLock> = Arc::new(MemorySyncLock::new());
    let trends = Arc::new(MemoryTrendStore::new());
    let tasks = Arc::new(TaskPool::new(2, 32));

    let novels: Arc<dyn NovelRepository> = db.clone();
    let chapters: Arc<dyn ChapterRepository> = db.clone();
    let sources: Arc<dyn SourceRepository> = db.clone();
    let trend_store: Arc<dyn TrendStore> = trends.clone();

    let srv = NovelSrv::new(
        novels,
        chapters,
        sources,
        biquge,
        qidian,
        Arc::clone(&lock),
        trend_store,
        Arc::clone(&tasks),
        opts.policy,
    );

    TestEnv {
        db,
        srv: Arc::new(srv),
        lock,
        trends,
        tasks,
    }
}

/// A BiQuGe-style detail page with the given chapter list
pub fn detail_page(name: &str, author: &str, chapters: &[(&str, &str)]) -> String {
    let list: String = chapters
        .iter()
        .map(|(title, href)| format!("<dd><a href=\"{href}\">{title}</a></dd>"))
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html>
<body>
<div id="maininfo">
  <div id="info">
    <h1>{name}</h1>
    <p>作&nbsp;&nbsp;者：{author}</p>
    <p>最后更新：2020-01-01</p>
  </div>
  <div id="intro">
    简介：{name}的故事。
  </div>
</div>
<div id="list"><dl>{list}</dl></div>
</body>
</html>"#
    )
}

/// A detail page with no title element (vacant id)
pub fn vacant_page() -> String {
    "<html><body><div id=\"maininfo\"><div id=\"info\"></div></div></body></html>".to_string()
}

/// A BiQuGe-style chapter page wrapping the given content markup
pub fn chapter_page(content_html: &str) -> String {
    format!("<html><body><div id=\"content\">{content_html}</div></body></html>")
}

/// A QiDian-style search result page with one book entry
pub fn qidian_search_page(
    name: &str,
    author: &str,
    bid: i64,
    summary: &str,
    category: &str,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body>
<div id="result-list">
  <div class="res-book-item" data-bid="{bid}">
    <div class="book-img-box"><a><img src="//bookcover.test/{bid}/150"/></a></div>
    <div class="book-mid-info">
      <h4><a>{name}</a></h4>
      <p class="author"><a class="name">{author}</a><a>{category}</a></p>
      <p class="intro">{summary}</p>
    </div>
  </div>
</div>
</body>
</html>"#
    )
}

/// An empty QiDian search result page
pub fn qidian_empty_page() -> String {
    "<html><body><div id=\"result-list\"></div></body></html>".to_string()
}

/// Poll until a condition holds or a second passes
pub async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}
