//! BiQuGe scraper client
//!
//! The primary source site. Detail pages carry both the novel metadata and
//! the full chapter list, so one cached download serves `get_detail`,
//! `get_chapters`, and the chapter-list re-resolution inside
//! `get_chapter_content`. Cover URLs are computed from the source id by
//! template substitution, never scraped.

use async_trait::async_trait;
use bytes::Bytes;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{detail_key, DetailCache};
use crate::error::{Error, ParseError, Result};
use crate::models::{ChapterStub, NovelDetail};
use crate::sources::client::SourceClient;
use crate::sources::Fetcher;
use crate::utils::retry::{with_retry, RetryConfig};
use crate::utils::split_paragraphs;

/// Covers smaller than this are the site's placeholder image
const COVER_MIN_BYTES: usize = 10 * 1024;

/// Attempts for the full fetch-parse sequence of one chapter page
const CONTENT_ATTEMPTS: u32 = 3;

struct Selectors {
    info: Selector,
    title: Selector,
    info_line: Selector,
    intro: Selector,
    chapter_items: Selector,
    chapter_link: Selector,
    content: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            info: Selector::parse("#maininfo #info").expect("Invalid CSS selector"),
            title: Selector::parse("h1").expect("Invalid CSS selector"),
            info_line: Selector::parse("p").expect("Invalid CSS selector"),
            intro: Selector::parse("#maininfo #intro").expect("Invalid CSS selector"),
            chapter_items: Selector::parse("#list dd").expect("Invalid CSS selector"),
            chapter_link: Selector::parse("a").expect("Invalid CSS selector"),
            content: Selector::parse("#content").expect("Invalid CSS selector"),
        }
    }
}

/// BiQuGe site client
pub struct BiQuGe {
    client: SourceClient,
    cache: DetailCache,
    selectors: Selectors,
}

impl BiQuGe {
    /// Create a client over an already-configured [`SourceClient`]
    pub fn new(client: SourceClient, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            client,
            cache: DetailCache::new(cache_capacity, cache_ttl),
            selectors: Selectors::new(),
        }
    }

    /// Build the per-novel [`Fetcher`] adapter for a source-native id
    pub fn fetcher(self: &Arc<Self>, source_id: i64) -> BiQuGeFetcher {
        BiQuGeFetcher {
            site: Arc::clone(self),
            source_id,
        }
    }

    /// Cover URL derived from the source id
    ///
    /// The site shards cover images by id/1000 and never links them from
    /// the detail page.
    pub fn cover_url(&self, source_id: i64) -> String {
        let prefix = source_id / 1000;
        format!(
            "{}/files/article/image/{prefix}/{source_id}/{source_id}s.jpg",
            self.client.base_url()
        )
    }

    /// Raw detail page, served from cache when fresh
    async fn detail_page(&self, source_id: i64) -> Result<Bytes> {
        let key = detail_key(source_id);
        if let Some(data) = self.cache.get(&key) {
            return Ok(data);
        }

        let data = self
            .client
            .fetch_bytes(&format!("/book/{source_id}/"))
            .await?;
        self.cache.put(key, data.clone());
        Ok(data)
    }

    /// Fetch and parse the novel's metadata
    ///
    /// A missing title element or an author line that does not split on the
    /// `：` delimiter means the page does not describe a novel; both surface
    /// as [`ParseError`] so discovery can treat the id as vacant.
    pub async fn get_detail(&self, source_id: i64) -> Result<NovelDetail> {
        let data = self.detail_page(source_id).await?;
        let html = SourceClient::decode_bytes(&data, "")?;
        let doc = Html::parse_document(&html);

        let info = doc
            .select(&self.selectors.info)
            .next()
            .ok_or(ParseError::TitleNotFound)?;

        let name = info
            .select(&self.selectors.title)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            return Err(ParseError::TitleNotFound.into());
        }

        let author_line = info
            .select(&self.selectors.info_line)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let parts: Vec<&str> = author_line.split('：').collect();
        if parts.len() != 2 {
            return Err(ParseError::AuthorFormat.into());
        }
        let author = parts[1].trim().to_string();

        let summary = doc
            .select(&self.selectors.intro)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        Ok(NovelDetail {
            name,
            author,
            summary,
            category: String::new(),
            source_id,
            cover_url: self.cover_url(source_id),
        })
    }

    /// Fetch the ordered chapter list
    ///
    /// Chapter numbers are list positions; the site keeps the list
    /// append-only so positions are stable.
    pub async fn get_chapters(&self, source_id: i64) -> Result<Vec<ChapterStub>> {
        let data = self.detail_page(source_id).await?;
        let html = SourceClient::decode_bytes(&data, "")?;
        let doc = Html::parse_document(&html);

        let chapters = doc
            .select(&self.selectors.chapter_items)
            .enumerate()
            .map(|(no, item)| {
                let title = item.text().collect::<String>().trim().to_string();
                let url = item
                    .select(&self.selectors.chapter_link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .unwrap_or_default()
                    .to_string();
                ChapterStub {
                    title,
                    no: no as i64,
                    url,
                }
            })
            .collect();

        Ok(chapters)
    }

    /// Fetch the text of one chapter
    ///
    /// Re-resolves the chapter list first; a number at or beyond the list
    /// length tells the caller the source has fewer chapters than expected.
    /// The fetch-parse sequence retries in full, scraped chapter pages fail
    /// in transient ways.
    pub async fn get_chapter_content(&self, source_id: i64, no: usize) -> Result<String> {
        let chapters = self.get_chapters(source_id).await?;
        if no >= chapters.len() {
            return Err(Error::ChapterOutOfRange {
                no,
                total: chapters.len(),
            });
        }

        let url = chapters[no].url.clone();
        let retry = RetryConfig {
            max_retries: CONTENT_ATTEMPTS - 1,
            base_delay_ms: 500,
            ..Default::default()
        };
        with_retry(&retry, || self.fetch_chapter_body(&url)).await
    }

    async fn fetch_chapter_body(&self, url: &str) -> Result<String> {
        let html = self.client.fetch_html(url).await?;
        let doc = Html::parse_document(&html);
        let container = doc
            .select(&self.selectors.content)
            .next()
            .ok_or(ParseError::ContentNotFound)?;
        Ok(split_paragraphs(&container.inner_html()))
    }

    /// Fetch the cover image bytes
    ///
    /// The site answers missing covers with a small placeholder instead of
    /// a 404, so anything under [`COVER_MIN_BYTES`] counts as no cover.
    pub async fn get_cover(&self, source_id: i64) -> Result<Bytes> {
        let data = self.client.fetch_bytes(&self.cover_url(source_id)).await?;
        if data.len() < COVER_MIN_BYTES {
            return Err(Error::CoverNotFound { source_id });
        }
        Ok(data)
    }
}

/// Per-novel adapter closing over a source-native id
pub struct BiQuGeFetcher {
    site: Arc<BiQuGe>,
    source_id: i64,
}

#[async_trait]
impl Fetcher for BiQuGeFetcher {
    async fn detail(&self) -> Result<NovelDetail> {
        self.site.get_detail(self.source_id).await
    }

    async fn chapters(&self) -> Result<Vec<ChapterStub>> {
        self.site.get_chapters(self.source_id).await
    }

    async fn chapter_content(&self, no: usize) -> Result<String> {
        self.site.get_chapter_content(self.source_id, no).await
    }
}
