//! DDL and the one-time migration/backfill rule (C8).
//!
//! `chunks.id`/`documents.id` are TEXT (UUIDv4, assigned by the domain
//! layer at construction — see `crate::domain::Document::new`) rather than
//! integer rowids, so `chunks_vec` is declared with an explicit `id TEXT
//! PRIMARY KEY` column (sqlite-vec's vec0 tables support a single text or
//! integer primary key column for exactly this case) and `chunks_fts`
//! carries the id as an ordinary unindexed column rather than relying on
//! FTS5's integer-rowid-only `content_rowid` linkage — this is why the
//! vector-branch join is spelled out against `cv.id`, never `cv.rowid`.

use tokio_rusqlite::Connection;

use crate::error::StoreError;

fn documents_ddl() -> &'static str {
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        media_type TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )"
}

fn chunks_ddl() -> &'static str {
    "CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        content TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        chunk_type TEXT NOT NULL,
        language TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )"
}

fn chunks_index_ddl() -> &'static str {
    "CREATE INDEX IF NOT EXISTS idx_chunks_type_language ON chunks(chunk_type, language)"
}

fn chunks_doc_index_ddl() -> &'static str {
    "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)"
}

fn chunks_vec_ddl(dim: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_vec USING vec0(
            id TEXT PRIMARY KEY,
            embedding FLOAT[{dim}]
        )"
    )
}

fn chunks_fts_ddl() -> &'static str {
    "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(content, chunk_id UNINDEXED)"
}

fn media_tasks_ddl() -> &'static str {
    "CREATE TABLE IF NOT EXISTS media_tasks (
        id TEXT PRIMARY KEY,
        media_path TEXT NOT NULL,
        media_type TEXT NOT NULL,
        mime_type TEXT,
        user_prompt TEXT,
        context_text TEXT,
        status TEXT NOT NULL,
        error_message TEXT,
        result TEXT,
        result_document_id TEXT,
        created_at TEXT NOT NULL,
        processed_at TEXT
    )"
}

fn triggers_ddl() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
            INSERT INTO chunks_fts(content, chunk_id) VALUES (new.content, new.id);
        END",
        "CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
            DELETE FROM chunks_fts WHERE chunk_id = old.id;
            DELETE FROM chunks_vec WHERE id = old.id;
        END",
        "CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
            DELETE FROM chunks_fts WHERE chunk_id = old.id;
            INSERT INTO chunks_fts(content, chunk_id) VALUES (new.content, new.id);
        END",
    ]
}

/// Creates every table/index/trigger if absent, then runs the one-time
/// FTS backfill and legacy `documents_fts` drop.
pub async fn migrate(conn: &Connection, embedding_dim: usize) -> Result<(), StoreError> {
    conn.call(move |conn| {
        conn.execute_batch(&format!(
            "{};{};{};{};{};{}",
            documents_ddl(),
            chunks_ddl(),
            chunks_index_ddl(),
            chunks_doc_index_ddl(),
            chunks_vec_ddl(embedding_dim),
            chunks_fts_ddl(),
        ))?;
        conn.execute(media_tasks_ddl(), [])?;
        for trigger in triggers_ddl() {
            conn.execute_batch(trigger)?;
        }
        Ok(())
    })
    .await?;

    backfill_fts_if_needed(conn).await?;
    drop_legacy_documents_fts(conn).await?;
    Ok(())
}

async fn backfill_fts_if_needed(conn: &Connection) -> Result<(), StoreError> {
    conn.call(|conn| {
        let chunk_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let fts_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks_fts", [], |r| r.get(0))?;
        if chunk_count > 0 && fts_count == 0 {
            conn.execute(
                "INSERT INTO chunks_fts(content, chunk_id) SELECT content, id FROM chunks",
                [],
            )?;
        }
        Ok(())
    })
    .await?;
    Ok(())
}

async fn drop_legacy_documents_fts(conn: &Connection) -> Result<(), StoreError> {
    conn.call(|conn| {
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='documents_fts'",
            [],
            |r| r.get(0),
        )?;
        if exists > 0 {
            conn.execute_batch("DROP TABLE documents_fts")?;
        }
        Ok(())
    })
    .await?;
    Ok(())
}
