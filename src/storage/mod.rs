//! Storage layer
//!
//! Repository traits decoupling the orchestration service from the backing
//! store, plus the SQLite implementation. Deletion is deliberately absent
//! from every trait: novels, chapters, and source entries are never removed,
//! only created and updated.

pub mod repository;

pub use repository::{
    ChapterRepository, Database, NewNovel, NewNovelSource, NovelRepository, SourceRepository,
};
