//! Single source of truth: SQLite with `sqlite-vec` and FTS5 shadow tables
//! kept in sync by triggers (C8).

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::{ChunkFilters, SearchFilters};
