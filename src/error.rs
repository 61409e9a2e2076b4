//! Unified error handling for the wenku crate
//!
//! This module provides a unified error type that consolidates all
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain errors (`FetchError`, `ParseError`) usable on their own at the
//! scraper layer.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`FetchError`] / [`ParseError`] - Scraper-layer errors
//! - [`Error`] - Unified error enum used across module boundaries

use thiserror::Error;

use crate::models::SourceSite;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether this fetch failure is worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::ServerError(status) => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::MaxRetriesExceeded | Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors that can occur while parsing scraped pages
///
/// A missing title or a malformed author line means the page does not
/// describe a novel (moved, deleted, or never existed) rather than a hard
/// failure; discovery treats those as "not found" and moves on.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Title element not found in detail page
    #[error("Title not found in detail page")]
    TitleNotFound,

    /// Author line did not split on its expected delimiter
    #[error("Author line has unexpected format")]
    AuthorFormat,

    /// Content container not found in chapter page
    #[error("Content not found in chapter page")]
    ContentNotFound,
}

impl ParseError {
    /// Parse failures that mean "this novel does not exist at this id"
    pub fn is_novel_missing(&self) -> bool {
        matches!(self, Self::TitleNotFound | Self::AuthorFormat)
    }
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Parsing and data extraction errors
    Parsing,
    /// Storage errors
    Storage,
    /// Redis lock/cache errors
    Redis,
    /// Configuration and validation errors
    Config,
    /// Domain-level errors (missing source, out-of-range chapter)
    Domain,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the wenku crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Parse-specific errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// No source catalog entry matches the requested novel identity.
    /// This is the user-facing "cannot sync this title" condition.
    #[error("No source found for novel {name} by {author}")]
    SourceNotFound { name: String, author: String },

    /// A source catalog entry exists but its site cannot serve chapters
    #[error("Source site {0:?} does not support chapter fetching")]
    UnsupportedSource(SourceSite),

    /// Requested chapter number exceeds what the source currently offers
    #[error("Chapter {no} is beyond the latest chapter ({total} available)")]
    ChapterOutOfRange { no: usize, total: usize },

    /// Cover body was under the placeholder threshold
    #[error("Cover not found for source id {source_id}")]
    CoverNotFound { source_id: i64 },

    /// Novel row missing in a single-entity lookup
    #[error("Novel {0} not found")]
    NovelNotFound(i64),

    /// Chapter row missing in a single-entity lookup
    #[error("Chapter {no} of novel {novel_id} not found")]
    ChapterNotFound { novel_id: i64, no: i64 },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Redis command errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool errors
    #[error("Redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Background task queue is full
    #[error("Task queue full, rejected job: {0}")]
    TaskQueueFull(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the underlying database error is a unique-index violation
    ///
    /// Racing chapter inserts trip the unique (novel_id, no) index; callers
    /// in bulk contexts may want to treat that as "someone else got there".
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Redis(_) | Self::RedisPool(_) => true,
            Self::TaskQueueFull(_) => true,
            _ => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Parse(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Database(_) => ErrorCategory::Storage,
            Self::Redis(_) | Self::RedisPool(_) => ErrorCategory::Redis,
            Self::Config(_) => ErrorCategory::Config,
            Self::SourceNotFound { .. }
            | Self::UnsupportedSource(_)
            | Self::ChapterOutOfRange { .. }
            | Self::CoverNotFound { .. }
            | Self::NovelNotFound(_)
            | Self::ChapterNotFound { .. } => ErrorCategory::Domain,
            Self::TaskQueueFull(_) => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
