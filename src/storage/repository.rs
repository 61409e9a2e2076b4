//! Repository pattern for database abstraction
//!
//! Trait-based repositories decouple the orchestration logic from the
//! storage backend, enabling:
//! - Easy testing over in-memory SQLite
//! - Swappable storage backends
//! - Clear separation of concerns
//!
//! The [`Database`] struct implements all three repositories over a single
//! SQLite connection; hand out `Arc<Database>` clones coerced to the trait
//! objects the service takes.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::{
    Chapter, ChapterStub, Novel, NovelSource, NovelStatus, QueryParams, SourceSite, SourceStatus,
};

// ============================================================================
// New-row value types
// ============================================================================

/// Fields for a novel row at publish time
#[derive(Debug, Clone)]
pub struct NewNovel {
    pub name: String,
    pub author: String,
    pub source: SourceSite,
    pub summary: String,
    pub cover: String,
}

/// Fields for a source catalog entry at discovery time
#[derive(Debug, Clone)]
pub struct NewNovelSource {
    pub name: String,
    pub author: String,
    pub source: SourceSite,
    pub source_id: i64,
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository for the staging source catalog
pub trait SourceRepository: Send + Sync {
    /// Insert a discovered entry with status NotPublished
    fn create(&self, entry: &NewNovelSource) -> Result<NovelSource>;

    /// Whether an entry exists for (source, source-native id)
    fn exists(&self, source: SourceSite, source_id: i64) -> Result<bool>;

    /// First entry matching the given identity, ordered by source ascending
    fn find_one(&self, params: &QueryParams) -> Result<Option<NovelSource>>;

    /// Flip matching entries to Published; returns affected row count
    fn mark_published(&self, name: &str, author: &str) -> Result<usize>;

    /// Highest source-native id seen for a site (0 when none)
    fn max_source_id(&self, source: SourceSite) -> Result<i64>;
}

/// Repository for published novels
pub trait NovelRepository: Send + Sync {
    /// Insert a novel with status Writing and zeroed counters
    fn create(&self, data: &NewNovel) -> Result<Novel>;

    /// Fetch by id
    fn get(&self, id: i64) -> Result<Option<Novel>>;

    /// First novel matching name/author
    fn find_one(&self, params: &QueryParams) -> Result<Option<Novel>>;

    /// Highest novel id (0 when the table is empty)
    fn max_id(&self) -> Result<i64>;

    fn update_chapter_count(&self, id: i64, count: i64) -> Result<()>;

    fn update_word_count(&self, id: i64, count: i64) -> Result<()>;

    fn update_updated_weight(&self, id: i64, weight: i64) -> Result<()>;

    fn add_views(&self, id: i64, delta: i64) -> Result<()>;

    fn add_favorites(&self, id: i64, delta: i64) -> Result<()>;

    fn set_categories(&self, id: i64, categories: &[String]) -> Result<()>;

    /// Novels with more than `min_chapter_count` chapters and no categories
    fn list_uncategorized(&self, min_chapter_count: i64) -> Result<Vec<Novel>>;

    /// Novels carrying at least one category
    fn list_categorized(&self) -> Result<Vec<Novel>>;
}

/// Repository for chapters
pub trait ChapterRepository: Send + Sync {
    /// Insert chapter headers in bulk (content stays empty)
    fn bulk_create(&self, novel_id: i64, stubs: &[ChapterStub]) -> Result<usize>;

    /// Stored chapter count for a novel
    fn count(&self, novel_id: i64) -> Result<i64>;

    /// Fetch one chapter by (novel, number)
    fn find(&self, novel_id: i64, no: i64) -> Result<Option<Chapter>>;

    /// Persist fetched content and its word count, returning the row
    fn set_content(&self, id: i64, content: &str, word_count: i64) -> Result<Chapter>;

    /// Highest stored chapter number for a novel
    fn latest_no(&self, novel_id: i64) -> Result<Option<i64>>;

    /// Most recent chapter update time for a novel
    fn latest_updated_at(&self, novel_id: i64) -> Result<Option<DateTime<Utc>>>;

    /// Sum of stored chapter word counts
    fn sum_word_count(&self, novel_id: i64) -> Result<i64>;

    /// Update times of the most recent chapters by number descending
    fn recent_update_times(&self, novel_id: i64, limit: usize) -> Result<Vec<DateTime<Utc>>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite store implementing all three repositories
///
/// Uses a `Mutex` for thread-safety on the connection; WAL mode and a busy
/// timeout stand in for per-query deadlines on this embedded backend.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at the given path
    pub fn new(path: impl AsRef<Path>, busy_timeout: std::time::Duration) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("cannot create database dir: {e}")))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(busy_timeout)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(db)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_schema()?;
        Ok(db)
    }

    /// Shared handle suitable for coercion to the repository trait objects
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS novels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                author TEXT NOT NULL,
                source INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 1,
                chapter_count INTEGER NOT NULL DEFAULT 0,
                word_count INTEGER NOT NULL DEFAULT 0,
                views INTEGER NOT NULL DEFAULT 0,
                downloads INTEGER NOT NULL DEFAULT 0,
                favorites INTEGER NOT NULL DEFAULT 0,
                updated_weight INTEGER NOT NULL DEFAULT 0,
                cover TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL DEFAULT '',
                categories TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_novels_name_author
                ON novels(name, author);

            CREATE INDEX IF NOT EXISTS idx_novels_updated_weight
                ON novels(updated_weight);

            CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                novel_id INTEGER NOT NULL,
                no INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                word_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_chapters_novel_no
                ON chapters(novel_id, no);

            CREATE TABLE IF NOT EXISTS novel_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                author TEXT NOT NULL,
                source INTEGER NOT NULL,
                source_id INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_novel_sources_site_id
                ON novel_sources(source, source_id);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_novel_sources_identity
                ON novel_sources(name, author, source);
            "#,
        )?;

        Ok(())
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn parse_time(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn novel_from_row(row: &Row<'_>) -> rusqlite::Result<Novel> {
    let categories: Option<String> = row.get("categories")?;
    Ok(Novel {
        id: row.get("id")?,
        name: row.get("name")?,
        author: row.get("author")?,
        source: SourceSite::from_i64(row.get("source")?).unwrap_or(SourceSite::BiQuGe),
        status: NovelStatus::from_i64(row.get("status")?).unwrap_or(NovelStatus::Writing),
        chapter_count: row.get("chapter_count")?,
        word_count: row.get("word_count")?,
        views: row.get("views")?,
        downloads: row.get("downloads")?,
        favorites: row.get("favorites")?,
        updated_weight: row.get("updated_weight")?,
        cover: row.get("cover")?,
        summary: row.get("summary")?,
        categories: categories
            .and_then(|v| serde_json::from_str(&v).ok())
            .unwrap_or_default(),
        created_at: parse_time(row.get("created_at")?),
        updated_at: parse_time(row.get("updated_at")?),
    })
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: row.get("id")?,
        novel_id: row.get("novel_id")?,
        no: row.get("no")?,
        title: row.get("title")?,
        content: row.get("content")?,
        word_count: row.get("word_count")?,
        created_at: parse_time(row.get("created_at")?),
        updated_at: parse_time(row.get("updated_at")?),
    })
}

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<NovelSource> {
    Ok(NovelSource {
        id: row.get("id")?,
        name: row.get("name")?,
        author: row.get("author")?,
        source: SourceSite::from_i64(row.get("source")?).unwrap_or(SourceSite::BiQuGe),
        status: SourceStatus::from_i64(row.get("status")?).unwrap_or(SourceStatus::NotPublished),
        source_id: row.get("source_id")?,
        created_at: parse_time(row.get("created_at")?),
        updated_at: parse_time(row.get("updated_at")?),
    })
}

impl SourceRepository for Database {
    fn create(&self, entry: &NewNovelSource) -> Result<NovelSource> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            r#"
            INSERT INTO novel_sources (name, author, source, source_id, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                entry.name,
                entry.author,
                entry.source.as_i64(),
                entry.source_id,
                SourceStatus::NotPublished.as_i64(),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let created = conn.query_row(
            "SELECT * FROM novel_sources WHERE id = ?1",
            params![id],
            source_from_row,
        )?;
        Ok(created)
    }

    fn exists(&self, source: SourceSite, source_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM novel_sources WHERE source = ?1 AND source_id = ?2)",
            params![source.as_i64(), source_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn find_one(&self, params: &QueryParams) -> Result<Option<NovelSource>> {
        let conn = self.conn.lock().unwrap();
        let mut sql =
            String::from("SELECT * FROM novel_sources WHERE name = ?1 AND author = ?2");
        if params.source.is_some() {
            sql.push_str(" AND source = ?3");
        }
        sql.push_str(" ORDER BY source ASC LIMIT 1");

        let found = match params.source {
            Some(site) => conn
                .query_row(
                    &sql,
                    rusqlite::params![params.name, params.author, site.as_i64()],
                    source_from_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    &sql,
                    rusqlite::params![params.name, params.author],
                    source_from_row,
                )
                .optional()?,
        };
        Ok(found)
    }

    fn mark_published(&self, name: &str, author: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE novel_sources SET status = ?1, updated_at = ?2 WHERE name = ?3 AND author = ?4",
            params![
                SourceStatus::Published.as_i64(),
                now_rfc3339(),
                name,
                author
            ],
        )?;
        Ok(affected)
    }

    fn max_source_id(&self, source: SourceSite) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(source_id) FROM novel_sources WHERE source = ?1",
            params![source.as_i64()],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }
}

impl NovelRepository for Database {
    fn create(&self, data: &NewNovel) -> Result<Novel> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            r#"
            INSERT INTO novels (name, author, source, status, summary, cover, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
            params![
                data.name,
                data.author,
                data.source.as_i64(),
                NovelStatus::Writing.as_i64(),
                data.summary,
                data.cover,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let created =
            conn.query_row("SELECT * FROM novels WHERE id = ?1", params![id], novel_from_row)?;
        Ok(created)
    }

    fn get(&self, id: i64) -> Result<Option<Novel>> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row("SELECT * FROM novels WHERE id = ?1", params![id], novel_from_row)
            .optional()?;
        Ok(found)
    }

    fn find_one(&self, params: &QueryParams) -> Result<Option<Novel>> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT * FROM novels WHERE name = ?1 AND author = ?2 LIMIT 1",
                rusqlite::params![params.name, params.author],
                novel_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn max_id(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> =
            conn.query_row("SELECT MAX(id) FROM novels", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    fn update_chapter_count(&self, id: i64, count: i64) -> Result<()> {
        self.update_novel_field(id, "chapter_count", count)
    }

    fn update_word_count(&self, id: i64, count: i64) -> Result<()> {
        self.update_novel_field(id, "word_count", count)
    }

    fn update_updated_weight(&self, id: i64, weight: i64) -> Result<()> {
        self.update_novel_field(id, "updated_weight", weight)
    }

    fn add_views(&self, id: i64, delta: i64) -> Result<()> {
        self.bump_novel_counter(id, "views", delta)
    }

    fn add_favorites(&self, id: i64, delta: i64) -> Result<()> {
        self.bump_novel_counter(id, "favorites", delta)
    }

    fn set_categories(&self, id: i64, categories: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(categories)?;
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE novels SET categories = ?1, updated_at = ?2 WHERE id = ?3",
            params![encoded, now_rfc3339(), id],
        )?;
        if affected == 0 {
            return Err(Error::NovelNotFound(id));
        }
        Ok(())
    }

    fn list_uncategorized(&self, min_chapter_count: i64) -> Result<Vec<Novel>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM novels
            WHERE chapter_count > ?1
              AND (categories IS NULL OR categories = '' OR categories = '[]')
            "#,
        )?;
        let novels = stmt
            .query_map(params![min_chapter_count], novel_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(novels)
    }

    fn list_categorized(&self) -> Result<Vec<Novel>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM novels
            WHERE categories IS NOT NULL AND categories != '' AND categories != '[]'
            "#,
        )?;
        let novels = stmt
            .query_map([], novel_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(novels)
    }
}

impl Database {
    fn update_novel_field(&self, id: i64, field: &str, value: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // field names come from the callers above, never from input
        let sql = format!("UPDATE novels SET {field} = ?1, updated_at = ?2 WHERE id = ?3");
        let affected = conn.execute(&sql, params![value, now_rfc3339(), id])?;
        if affected == 0 {
            return Err(Error::NovelNotFound(id));
        }
        Ok(())
    }

    fn bump_novel_counter(&self, id: i64, field: &str, delta: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("UPDATE novels SET {field} = {field} + ?1, updated_at = ?2 WHERE id = ?3");
        let affected = conn.execute(&sql, params![delta, now_rfc3339(), id])?;
        if affected == 0 {
            return Err(Error::NovelNotFound(id));
        }
        Ok(())
    }
}

impl ChapterRepository for Database {
    fn bulk_create(&self, novel_id: i64, stubs: &[ChapterStub]) -> Result<usize> {
        if stubs.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chapters (novel_id, no, title, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                "#,
            )?;
            for stub in stubs {
                stmt.execute(params![novel_id, stub.no, stub.title, now])?;
            }
        }
        tx.commit()?;
        Ok(stubs.len())
    }

    fn count(&self, novel_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE novel_id = ?1",
            params![novel_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn find(&self, novel_id: i64, no: i64) -> Result<Option<Chapter>> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT * FROM chapters WHERE novel_id = ?1 AND no = ?2",
                params![novel_id, no],
                chapter_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn set_content(&self, id: i64, content: &str, word_count: i64) -> Result<Chapter> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE chapters SET content = ?1, word_count = ?2, updated_at = ?3 WHERE id = ?4",
            params![content, word_count, now_rfc3339(), id],
        )?;
        let updated = conn.query_row(
            "SELECT * FROM chapters WHERE id = ?1",
            params![id],
            chapter_from_row,
        )?;
        Ok(updated)
    }

    fn latest_no(&self, novel_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(no) FROM chapters WHERE novel_id = ?1",
            params![novel_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn latest_updated_at(&self, novel_id: i64) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(updated_at) FROM chapters WHERE novel_id = ?1",
            params![novel_id],
            |row| row.get(0),
        )?;
        Ok(latest.map(parse_time))
    }

    fn sum_word_count(&self, novel_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let sum: Option<i64> = conn.query_row(
            "SELECT SUM(word_count) FROM chapters WHERE novel_id = ?1",
            params![novel_id],
            |row| row.get(0),
        )?;
        Ok(sum.unwrap_or(0))
    }

    fn recent_update_times(&self, novel_id: i64, limit: usize) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT updated_at FROM chapters WHERE novel_id = ?1 ORDER BY no DESC LIMIT ?2",
        )?;
        let times = stmt
            .query_map(params![novel_id, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(parse_time)
            .collect();
        Ok(times)
    }
}

// ============================================================================
// Tests
// ============================================================================
