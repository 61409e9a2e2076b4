//! QiDian scraper client
//!
//! Secondary source used only for keyword search at publish time: when the
//! same title exists there, its summary (and cover, when present) is richer
//! than the primary source's and overrides it. QiDian does not serve
//! chapters here.

use scraper::{Html, Selector};

use crate::error::Result;
use crate::models::NovelDetail;
use crate::sources::client::SourceClient;

struct Selectors {
    result_items: Selector,
    title: Selector,
    author_name: Selector,
    intro: Selector,
    cover_img: Selector,
    author_links: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            result_items: Selector::parse("#result-list .res-book-item")
                .expect("Invalid CSS selector"),
            title: Selector::parse("h4").expect("Invalid CSS selector"),
            author_name: Selector::parse(".author .name").expect("Invalid CSS selector"),
            intro: Selector::parse(".intro").expect("Invalid CSS selector"),
            cover_img: Selector::parse(".book-img-box img").expect("Invalid CSS selector"),
            author_links: Selector::parse(".author a").expect("Invalid CSS selector"),
        }
    }
}

/// QiDian site client
pub struct QiDian {
    client: SourceClient,
    selectors: Selectors,
}

impl QiDian {
    pub fn new(client: SourceClient) -> Self {
        Self {
            client,
            selectors: Selectors::new(),
        }
    }

    /// Search the site for an exact (name, author) match
    ///
    /// Returns None when no result row matches both fields exactly.
    pub async fn search(&self, name: &str, author: &str) -> Result<Option<NovelDetail>> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("kw", name)
            .finish();
        let html = self.client.fetch_html(&format!("/search?{query}")).await?;
        let doc = Html::parse_document(&html);

        for item in doc.select(&self.selectors.result_items) {
            let cur_name = item
                .select(&self.selectors.title)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let cur_author = item
                .select(&self.selectors.author_name)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            if cur_name != name || cur_author != author {
                continue;
            }

            let summary = item
                .select(&self.selectors.intro)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            let bid = item.value().attr("data-bid").unwrap_or_default();
            let source_id: i64 = bid.parse().unwrap_or(0);

            // The search page links 150px thumbnails; the 180px variant
            // lives at the same path
            let cover_url = item
                .select(&self.selectors.cover_img)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| {
                    format!("https:{src}").replacen(&format!("{bid}/150"), &format!("{bid}/180"), 1)
                })
                .unwrap_or_default();

            let category = item
                .select(&self.selectors.author_links)
                .nth(1)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            return Ok(Some(NovelDetail {
                name: cur_name,
                author: cur_author,
                summary,
                category,
                source_id,
                cover_url,
            }));
        }

        Ok(None)
    }
}
