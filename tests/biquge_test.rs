//! Integration tests for the BiQuGe scraper using wiremock
//!
//! These validate detail/chapter parsing, the detail cache, retry
//! behavior, and the cover placeholder threshold against mock servers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{chapter_page, detail_page, vacant_page};
use wenku::error::{Error, ParseError};
use wenku::sources::{BiQuGe, Fetcher, QiDian, SourceClient};

fn site(base_url: &str) -> BiQuGe {
    site_with(base_url, 0, Duration::from_secs(60))
}

fn site_with(base_url: &str, retries: u32, cache_ttl: Duration) -> BiQuGe {
    let client =
        SourceClient::with_config(base_url, 100, retries, 10, Duration::from_secs(5)).unwrap();
    BiQuGe::new(client, 50, cache_ttl)
}

#[tokio::test]
async fn test_get_detail_parses_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
            "斗破苍穹",
            "天蚕土豆",
            &[("第一章 陨落的天才", "/book/42/1.html")],
        )))
        .mount(&server)
        .await;

    let site = site(&server.uri());
    let detail = site.get_detail(42).await.unwrap();

    assert_eq!(detail.name, "斗破苍穹");
    assert_eq!(detail.author, "天蚕土豆");
    assert!(detail.summary.contains("斗破苍穹"));
    assert_eq!(detail.source_id, 42);
    assert_eq!(
        detail.cover_url,
        format!("{}/files/article/image/0/42/42s.jpg", server.uri())
    );
}

#[tokio::test]
async fn test_get_detail_missing_title_is_novel_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/7/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(vacant_page()))
        .mount(&server)
        .await;

    let site = site(&server.uri());
    let err = site.get_detail(7).await.unwrap_err();
    match err {
        Error::Parse(e) => assert!(e.is_novel_missing()),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_detail_malformed_author_line() {
    let server = MockServer::start().await;
    let html = r#"<html><body>
<div id="maininfo">
  <div id="info"><h1>某书</h1><p>no delimiter here</p></div>
</div>
</body></html>"#;
    Mock::given(method("GET"))
        .and(path("/book/7/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let site = site(&server.uri());
    let err = site.get_detail(7).await.unwrap_err();
    assert!(matches!(err, Error::Parse(ParseError::AuthorFormat)));
}

#[tokio::test]
async fn test_get_chapters_ordered_by_page_position() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
            "斗破苍穹",
            "天蚕土豆",
            &[
                ("第一章", "/book/42/1.html"),
                ("第二章", "/book/42/2.html"),
                ("第三章", "/book/42/3.html"),
            ],
        )))
        .mount(&server)
        .await;

    let site = site(&server.uri());
    let chapters = site.get_chapters(42).await.unwrap();

    assert_eq!(chapters.len(), 3);
    for (i, chapter) in chapters.iter().enumerate() {
        assert_eq!(chapter.no, i as i64);
    }
    assert_eq!(chapters[0].title, "第一章");
    assert_eq!(chapters[2].url, "/book/42/3.html");
}

#[tokio::test]
async fn test_detail_page_cached_across_operations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
            "斗破苍穹",
            "天蚕土豆",
            &[("第一章", "/book/42/1.html")],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let site = site(&server.uri());
    site.get_detail(42).await.unwrap();
    site.get_chapters(42).await.unwrap();
    site.get_detail(42).await.unwrap();
    // expect(1) verifies a single download served all three calls
}

#[tokio::test]
async fn test_chapter_content_trimmed_and_joined() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
            "斗破苍穹",
            "天蚕土豆",
            &[("第一章", "/book/42/1.html")],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/book/42/1.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(chapter_page(
            "　　这是第一段。<br/><br/>　　这是第二段。<br/>&nbsp;<br/>这是第三段。",
        )))
        .mount(&server)
        .await;

    let site = site(&server.uri());
    let content = site.get_chapter_content(42, 0).await.unwrap();

    assert_eq!(content, "这是第一段。\n这是第二段。\n这是第三段。");
}

#[tokio::test]
async fn test_chapter_out_of_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
            "斗破苍穹",
            "天蚕土豆",
            &[("第一章", "/book/42/1.html")],
        )))
        .mount(&server)
        .await;

    let site = site(&server.uri());
    let err = site.get_chapter_content(42, 5).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ChapterOutOfRange { no: 5, total: 1 }
    ));
}

#[tokio::test]
async fn test_chapter_fetch_retries_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
            "斗破苍穹",
            "天蚕土豆",
            &[("第一章", "/book/42/1.html")],
        )))
        .mount(&server)
        .await;

    // Chapter page fails twice, then succeeds
    Mock::given(method("GET"))
        .and(path("/book/42/1.html"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/book/42/1.html"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(chapter_page("正文内容<br/>第二段")),
        )
        .mount(&server)
        .await;

    let site = site_with(&server.uri(), 2, Duration::from_secs(60));
    let content = site.get_chapter_content(42, 0).await.unwrap();
    assert_eq!(content, "正文内容\n第二段");
}

#[tokio::test]
async fn test_cover_placeholder_threshold() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/article/image/0/42/42s.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/article/image/0/43/43s.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 20 * 1024]))
        .mount(&server)
        .await;

    let site = site(&server.uri());

    let err = site.get_cover(42).await.unwrap_err();
    assert!(matches!(err, Error::CoverNotFound { source_id: 42 }));

    let cover = site.get_cover(43).await.unwrap();
    assert_eq!(cover.len(), 20 * 1024);
}

#[tokio::test]
async fn test_fetcher_adapter_binds_source_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(
            "斗破苍穹",
            "天蚕土豆",
            &[("第一章", "/book/42/1.html")],
        )))
        .mount(&server)
        .await;

    let site = Arc::new(site(&server.uri()));
    let fetcher = site.fetcher(42);

    let detail = fetcher.detail().await.unwrap();
    assert_eq!(detail.source_id, 42);

    let chapters = fetcher.chapters().await.unwrap();
    assert_eq!(chapters.len(), 1);
}

#[tokio::test]
async fn test_qidian_search_exact_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::qidian_search_page(
            "斗破苍穹",
            "天蚕土豆",
            123,
            "三十年河东，三十年河西。",
            "玄幻",
        )))
        .mount(&server)
        .await;

    let client = SourceClient::with_config(&server.uri(), 100, 0, 10, Duration::from_secs(5))
        .unwrap();
    let qidian = QiDian::new(client);

    let found = qidian
        .search("斗破苍穹", "天蚕土豆")
        .await
        .unwrap()
        .expect("exact match found");
    assert_eq!(found.source_id, 123);
    assert_eq!(found.summary, "三十年河东，三十年河西。");
    assert_eq!(found.category, "玄幻");
    assert_eq!(found.cover_url, "https://bookcover.test/123/180");

    // A different author is not a match
    let missing = qidian.search("斗破苍穹", "别人").await.unwrap();
    assert!(missing.is_none());
}
