//! Scraper clients for external novel sources
//!
//! Each source site implements the same three-operation [`Fetcher`]
//! contract, bound to one already-resolved novel identity. The
//! orchestration layer picks the implementation at runtime from the source
//! catalog entry's site field and never knows which site backs a novel.

pub mod biquge;
pub mod client;
pub mod qidian;

pub use biquge::BiQuGe;
pub use client::SourceClient;
pub use qidian::QiDian;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChapterStub, NovelDetail};

/// Per-novel capability to retrieve detail, chapter list, and chapter
/// content regardless of the underlying source site
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the novel's metadata from its source
    async fn detail(&self) -> Result<NovelDetail>;

    /// Fetch the ordered chapter header list from the source
    async fn chapters(&self) -> Result<Vec<ChapterStub>>;

    /// Fetch the text of one chapter by its 0-based number
    async fn chapter_content(&self, no: usize) -> Result<String>;
}
