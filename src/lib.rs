//! wenku - Novel catalog ingestion and synchronization backend
//!
//! The content-acquisition pipeline behind a novel-reading platform:
//! scraping third-party sites into a staging catalog, reconciling staged
//! entries into published novels, incrementally syncing chapters, and
//! maintaining the aggregate counters and recency weights that drive how
//! often each novel is re-synced.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`sources`] - Scraper clients and the `Fetcher` abstraction
//! - [`cache`] - Process-local detail-page cache
//! - [`lock`] - Distributed TTL lock for cluster-wide jobs
//! - [`storage`] - Repository traits and the SQLite store
//! - [`service`] - Orchestration: discover, publish, sync, maintain
//! - [`analytics`] - Hot keywords and the category summary cache
//! - [`tasks`] - Bounded worker pool for background jobs
//! - [`scheduler`] - Periodic job cadences
//! - [`utils`] - Common utilities and helpers

pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod sources;
pub mod storage;
pub mod tasks;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{Chapter, ChapterStub, Novel, NovelDetail, NovelSource, QueryParams};
    pub use crate::service::NovelSrv;
    pub use crate::sources::{BiQuGe, Fetcher, QiDian, SourceClient};
    pub use crate::storage::Database;
}

// Direct re-exports for convenience
pub use models::{Chapter, Novel, NovelSource, QueryParams, SourceSite};
