//! SQLite-backed store (C8): single source of truth for documents, chunks,
//! their vector/full-text shadow tables, and the media task queue.
//!
//! The `sqlite-vec` extension registration is lifted near-verbatim from
//! `wg-ragsmith::stores::sqlite::SqliteChunkStore::register_sqlite_vec` —
//! `sqlite_vec::sqlite3_vec_init` is a C ABI entrypoint with a different
//! signature than `ffi::sqlite3_auto_extension` expects, so it has to be
//! transmuted; the `Once` + result-caching `Mutex` makes registration safe to
//! call from every `SqliteStore::open`.

use std::ffi::c_char;
use std::mem::transmute;
use std::sync::{Mutex, Once};

use rusqlite::{ffi, OptionalExtension};
use tokio_rusqlite::Connection;

use crate::config::EngineConfig;
use crate::domain::{
    Chunk, ChunkMetadata, ChunkResult, ChunkType, ChunkWithEmbedding, Document, MatchType,
    MediaTask, MediaType, Metadata, Role, SearchMode, TaskStatus,
};
use crate::error::StoreError;

use super::schema;
use super::types::{ChunkFilters, SearchFilters};

/// Candidate pool size each single-mode branch fetches before RRF fusion;
/// wider than the final `limit` so fusion has real overlap to work with.
const HYBRID_CANDIDATE_POOL: usize = 50;

fn register_sqlite_vec() -> Result<(), StoreError> {
    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit = transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(StoreError::MigrationFailed)
}

fn metadata_to_json(metadata: &Metadata) -> Result<String, StoreError> {
    serde_json::to_string(metadata).map_err(|e| StoreError::Io(e.to_string()))
}

fn metadata_from_json(s: &str) -> Metadata {
    serde_json::from_str(s).unwrap_or_default()
}

fn chunk_metadata_to_json(metadata: &ChunkMetadata) -> Result<String, StoreError> {
    serde_json::to_string(metadata).map_err(|e| StoreError::Io(e.to_string()))
}

fn chunk_metadata_from_json(s: &str) -> ChunkMetadata {
    serde_json::from_str(s).unwrap_or_default()
}

fn media_type_from_str(s: &str) -> MediaType {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(MediaType::Text)
}

fn chunk_type_from_str(s: &str) -> ChunkType {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(ChunkType::Text)
}

fn task_status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Processing => "processing",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn task_status_from_str(s: &str) -> TaskStatus {
    match s {
        "processing" => TaskStatus::Processing,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let metadata_json: String = row.get(3)?;
    Ok(Document {
        id: row.get(0)?,
        content: row.get(1)?,
        media_type: media_type_from_str(&row.get::<_, String>(2)?),
        metadata: metadata_from_json(&metadata_json),
        created_at: row.get(4)?,
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let metadata_json: String = row.get(6)?;
    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        content: row.get(2)?,
        chunk_index: row.get::<_, i64>(3)? as usize,
        chunk_type: chunk_type_from_str(&row.get::<_, String>(4)?),
        language: row.get(5)?,
        metadata: chunk_metadata_from_json(&metadata_json),
        created_at: row.get(7)?,
    })
}

const CHUNK_COLUMNS: &str = "id, document_id, content, chunk_index, chunk_type, language, metadata, created_at";

/// The embedded document/chunk/vector/FTS/media-task store.
pub struct SqliteStore {
    conn: Connection,
    embedding_dim: usize,
}

impl SqliteStore {
    pub async fn open(config: &EngineConfig) -> Result<Self, StoreError> {
        register_sqlite_vec()?;
        let conn = Connection::open(&config.db_path).await?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
            Ok(())
        })
        .await?;
        // Fails loudly if the extension didn't actually load into this connection.
        conn.call(|conn| conn.query_row("SELECT vec_version()", [], |r| r.get::<_, String>(0)))
            .await?;
        schema::migrate(&conn, config.embedding_dim).await?;
        Ok(Self { conn, embedding_dim: config.embedding_dim })
    }

    /// Persists a document and its chunks (with embeddings) in one
    /// transaction: either all rows land or none do.
    pub async fn save(&self, document: &Document, chunks: &[ChunkWithEmbedding]) -> Result<(), StoreError> {
        for c in chunks {
            if c.embedding.len() != self.embedding_dim {
                return Err(StoreError::VectorDimMismatch { expected: self.embedding_dim, actual: c.embedding.len() });
            }
        }

        let document = document.clone();
        let chunks: Vec<ChunkWithEmbedding> = chunks.to_vec();
        let metadata_json = metadata_to_json(&document.metadata)?;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO documents (id, content, media_type, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        content = excluded.content,
                        media_type = excluded.media_type,
                        metadata = excluded.metadata",
                    rusqlite::params![
                        document.id,
                        document.content,
                        document.media_type.to_string(),
                        metadata_json,
                        document.created_at.to_rfc3339(),
                    ],
                )?;

                for cwe in &chunks {
                    let chunk = &cwe.chunk;
                    let meta_json = serde_json::to_string(&chunk.metadata)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    tx.execute(
                        "INSERT INTO chunks (id, document_id, content, chunk_index, chunk_type, language, metadata, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT(id) DO UPDATE SET
                            content = excluded.content,
                            chunk_index = excluded.chunk_index,
                            chunk_type = excluded.chunk_type,
                            language = excluded.language,
                            metadata = excluded.metadata",
                        rusqlite::params![
                            chunk.id,
                            chunk.document_id,
                            chunk.content,
                            chunk.chunk_index as i64,
                            chunk.chunk_type.to_string(),
                            chunk.language,
                            meta_json,
                            chunk.created_at.to_rfc3339(),
                        ],
                    )?;

                    let embedding_json = serde_json::to_string(&cwe.embedding)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    tx.execute("DELETE FROM chunks_vec WHERE id = ?1", rusqlite::params![chunk.id])?;
                    tx.execute(
                        "INSERT INTO chunks_vec (id, embedding) VALUES (?1, vec_f32(?2))",
                        rusqlite::params![chunk.id, embedding_json],
                    )?;
                }

                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_document_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = id.to_string();
        let doc = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, content, media_type, metadata, created_at FROM documents WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_document,
                )
                .optional()
            })
            .await?;
        Ok(doc)
    }

    pub async fn get_chunks_by_document_id(&self, document_id: &str, role: Option<Role>) -> Result<Vec<Chunk>, StoreError> {
        let document_id = document_id.to_string();
        let role_str = role.map(|r| r.to_string());
        let chunks = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params![document_id], row_to_chunk)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                if let Some(role_str) = role_str {
                    out.retain(|c| c.metadata.role.map(|r| r.to_string()) == Some(role_str.clone()));
                }
                Ok(out)
            })
            .await?;
        Ok(chunks)
    }

    /// Deletes every document (and, via the chunk cascade below, every
    /// chunk/vector/FTS row) whose metadata matches every key/value pair in
    /// `filters`. Returns the number of documents removed.
    pub async fn delete_by_metadata(&self, filters: &SearchFilters) -> Result<u64, StoreError> {
        if filters.metadata.is_empty() {
            return Ok(0);
        }
        let pairs: Vec<(String, serde_json::Value)> =
            filters.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut clauses = Vec::new();
                let mut params: Vec<rusqlite::types::Value> = Vec::new();
                for (key, value) in &pairs {
                    clauses.push(format!("json_extract(metadata, '$.{key}') = ?"));
                    params.push(json_scalar_to_sql(value));
                }
                let where_clause = clauses.join(" AND ");

                let ids_sql = format!("SELECT id FROM documents WHERE {where_clause}");
                let ids: Vec<String> = {
                    let mut stmt = tx.prepare(&ids_sql)?;
                    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |r| r.get::<_, String>(0))?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };

                for id in &ids {
                    tx.execute("DELETE FROM chunks WHERE document_id = ?1", rusqlite::params![id])?;
                    tx.execute("DELETE FROM documents WHERE id = ?1", rusqlite::params![id])?;
                }
                tx.commit()?;
                Ok(ids.len() as u64)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn delete_chunks_by_document_id(&self, document_id: &str) -> Result<(), StoreError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM chunks WHERE document_id = ?1", rusqlite::params![document_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Deletes specific chunks by id (and, via the `chunks_ad` trigger,
    /// their vector/FTS rows). Used by `rerun_step` to clear one role's
    /// chunks before the pipeline regenerates them.
    pub async fn delete_chunks_by_ids(&self, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for id in &ids {
                    tx.execute("DELETE FROM chunks WHERE id = ?1", rusqlite::params![id])?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Updates `chunk_index` for already-persisted chunks in place, without
    /// touching their content, embedding or FTS row. Used by `rerun_step`
    /// to keep the document's chunk indices contiguous after only one
    /// role's chunks were replaced.
    pub async fn reindex_chunks(&self, updates: &[(String, usize)]) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let updates = updates.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (id, index) in &updates {
                    tx.execute("UPDATE chunks SET chunk_index = ?1 WHERE id = ?2", rusqlite::params![*index as i64, id])?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recently completed media task whose analysis produced
    /// `document_id`, used by `rerun_step` to recover the original
    /// `AnalysisResult` without re-invoking the analyzer.
    pub async fn get_latest_completed_media_task_for_document(&self, document_id: &str) -> Result<Option<MediaTask>, StoreError> {
        let document_id = document_id.to_string();
        let task = self
            .conn
            .call(move |conn| {
                let sql = "SELECT id, media_path, media_type, mime_type, user_prompt, context_text, status, error_message, result, result_document_id, created_at, processed_at
                           FROM media_tasks WHERE result_document_id = ?1 AND status = 'completed' ORDER BY processed_at DESC LIMIT 1";
                let mut stmt = conn.prepare(sql)?;
                let mut rows = stmt.query_map(rusqlite::params![document_id], row_to_media_task)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await?;
        Ok(task)
    }

    pub async fn search_chunks(
        &self,
        query_vector: Option<Vec<f32>>,
        query_text: Option<&str>,
        mode: SearchMode,
        limit: usize,
        rrf_k: f64,
        chunk_filters: &ChunkFilters,
    ) -> Result<Vec<ChunkResult>, StoreError> {
        if let Some(v) = &query_vector {
            if v.len() != self.embedding_dim {
                return Err(StoreError::VectorDimMismatch { expected: self.embedding_dim, actual: v.len() });
            }
        }

        match mode {
            SearchMode::Vector => {
                let vector = query_vector.ok_or_else(|| StoreError::Constraint("vector search requires a query embedding".into()))?;
                self.search_vector(&vector, limit, chunk_filters).await
            }
            SearchMode::Fts => {
                let text = query_text.ok_or_else(|| StoreError::Constraint("full-text search requires query text".into()))?;
                self.search_fts(text, limit, chunk_filters).await
            }
            SearchMode::Hybrid => {
                let vector = query_vector.ok_or_else(|| StoreError::Constraint("hybrid search requires a query embedding".into()))?;
                let text = query_text.ok_or_else(|| StoreError::Constraint("hybrid search requires query text".into()))?;
                self.search_hybrid(&vector, text, limit, rrf_k, chunk_filters).await
            }
        }
    }

    async fn search_vector(&self, vector: &[f32], limit: usize, filters: &ChunkFilters) -> Result<Vec<ChunkResult>, StoreError> {
        let embedding_json = serde_json::to_string(vector).map_err(|e| StoreError::Io(e.to_string()))?;
        let filters = filters.clone();
        let rows = self
            .conn
            .call(move |conn| {
                let (extra_clause, extra_params) = filter_clause(&filters);
                let sql = format!(
                    "SELECT {cols}, vec_distance_cosine(cv.embedding, vec_f32(?1)) AS distance
                     FROM chunks_vec cv
                     JOIN chunks c ON c.id = cv.id
                     WHERE 1=1 {extra_clause}
                     ORDER BY distance ASC
                     LIMIT {limit}",
                    cols = prefixed_chunk_columns("c"),
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut params: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Text(embedding_json)];
                params.extend(extra_params);
                let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    let chunk = row_to_chunk(row)?;
                    let distance: f64 = row.get(8)?;
                    Ok((chunk, distance))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(chunk, distance)| {
                let document_id = chunk.document_id.clone();
                ChunkResult {
                    chunk,
                    score: 1.0 / (1.0 + distance),
                    match_type: MatchType::Vector,
                    document_id,
                    document_title: None,
                }
            })
            .collect())
    }

    async fn search_fts(&self, text: &str, limit: usize, filters: &ChunkFilters) -> Result<Vec<ChunkResult>, StoreError> {
        let text = text.to_string();
        let filters = filters.clone();
        let rows = self
            .conn
            .call(move |conn| {
                let (extra_clause, extra_params) = filter_clause(&filters);
                let sql = format!(
                    "SELECT {cols}, bm25(chunks_fts) AS rank
                     FROM chunks_fts
                     JOIN chunks c ON c.id = chunks_fts.chunk_id
                     WHERE chunks_fts MATCH ?1 {extra_clause}
                     ORDER BY rank ASC
                     LIMIT {limit}",
                    cols = prefixed_chunk_columns("c"),
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut params: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Text(text)];
                params.extend(extra_params);
                let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    let chunk = row_to_chunk(row)?;
                    let rank: f64 = row.get(8)?;
                    Ok((chunk, rank))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(chunk, rank)| {
                let document_id = chunk.document_id.clone();
                ChunkResult {
                    chunk,
                    score: -rank,
                    match_type: MatchType::Fts,
                    document_id,
                    document_title: None,
                }
            })
            .collect())
    }

    /// Fuses a vector-branch and an FTS-branch candidate pool via Reciprocal
    /// Rank Fusion: `rrf_score = 1/(k+rank_vec) + 1/(k+rank_fts)`, each rank
    /// 1-based within its own branch; a chunk absent from a branch simply
    /// contributes no term for it. Ties break on `chunk.id` ascending so
    /// results are deterministic across runs.
    async fn search_hybrid(
        &self,
        vector: &[f32],
        text: &str,
        limit: usize,
        rrf_k: f64,
        filters: &ChunkFilters,
    ) -> Result<Vec<ChunkResult>, StoreError> {
        let vector_results = self.search_vector_pool(vector, HYBRID_CANDIDATE_POOL, filters).await?;
        let fts_results = self.search_fts_pool(text, HYBRID_CANDIDATE_POOL, filters).await?;

        let mut by_id: std::collections::BTreeMap<String, (Chunk, f64)> = std::collections::BTreeMap::new();

        for (rank, chunk) in vector_results.into_iter().enumerate() {
            let id = chunk.id.clone();
            let term = 1.0 / (rrf_k + (rank as f64 + 1.0));
            by_id.entry(id).and_modify(|(_, s)| *s += term).or_insert((chunk, term));
        }
        for (rank, chunk) in fts_results.into_iter().enumerate() {
            let id = chunk.id.clone();
            let term = 1.0 / (rrf_k + (rank as f64 + 1.0));
            by_id.entry(id).and_modify(|(_, s)| *s += term).or_insert((chunk, term));
        }

        let mut merged: Vec<(Chunk, f64)> = by_id.into_values().collect();
        merged.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        merged.truncate(limit);

        Ok(merged
            .into_iter()
            .map(|(chunk, score)| {
                let document_id = chunk.document_id.clone();
                ChunkResult { chunk, score, match_type: MatchType::Hybrid, document_id, document_title: None }
            })
            .collect())
    }

    async fn search_vector_pool(&self, vector: &[f32], pool: usize, filters: &ChunkFilters) -> Result<Vec<Chunk>, StoreError> {
        Ok(self.search_vector(vector, pool, filters).await?.into_iter().map(|r| r.chunk).collect())
    }

    async fn search_fts_pool(&self, text: &str, pool: usize, filters: &ChunkFilters) -> Result<Vec<Chunk>, StoreError> {
        Ok(self.search_fts(text, pool, filters).await?.into_iter().map(|r| r.chunk).collect())
    }

    // --- Media task queue storage (backs crate::media::queue::MediaTaskQueue) ---

    pub async fn insert_media_task(&self, task: &MediaTask) -> Result<(), StoreError> {
        let task = task.clone();
        let result_json = task.result.as_ref().map(|r| serde_json::to_string(r)).transpose().map_err(|e| StoreError::Io(e.to_string()))?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO media_tasks (id, media_path, media_type, mime_type, user_prompt, context_text, status, error_message, result, result_document_id, created_at, processed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    rusqlite::params![
                        task.id,
                        task.media_path,
                        task.media_type.to_string(),
                        task.mime_type,
                        task.user_prompt,
                        task.context_text,
                        task_status_to_str(task.status),
                        task.error_message,
                        result_json,
                        task.result_document_id,
                        task.created_at.to_rfc3339(),
                        task.processed_at.map(|t| t.to_rfc3339()),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Oldest pending task by `created_at`, the FIFO order the queue must
    /// process in.
    pub async fn next_pending_media_task(&self) -> Result<Option<MediaTask>, StoreError> {
        let task = self
            .conn
            .call(|conn| {
                conn.query_row(
                    "SELECT id, media_path, media_type, mime_type, user_prompt, context_text, status, error_message, result, result_document_id, created_at, processed_at
                     FROM media_tasks WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1",
                    [],
                    row_to_media_task,
                )
                .optional()
            })
            .await?;
        Ok(task)
    }

    pub async fn get_media_task_by_id(&self, id: &str) -> Result<Option<MediaTask>, StoreError> {
        let id = id.to_string();
        let task = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, media_path, media_type, mime_type, user_prompt, context_text, status, error_message, result, result_document_id, created_at, processed_at
                     FROM media_tasks WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_media_task,
                )
                .optional()
            })
            .await?;
        Ok(task)
    }

    pub async fn update_media_task(&self, task: &MediaTask) -> Result<(), StoreError> {
        let task = task.clone();
        let result_json = task.result.as_ref().map(|r| serde_json::to_string(r)).transpose().map_err(|e| StoreError::Io(e.to_string()))?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE media_tasks SET status = ?2, error_message = ?3, result = ?4, result_document_id = ?5, processed_at = ?6
                     WHERE id = ?1",
                    rusqlite::params![
                        task.id,
                        task_status_to_str(task.status),
                        task.error_message,
                        result_json,
                        task.result_document_id,
                        task.processed_at.map(|t| t.to_rfc3339()),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn count_media_tasks_by_status(&self, status: TaskStatus) -> Result<u64, StoreError> {
        let status_str = task_status_to_str(status);
        let count: i64 = self
            .conn
            .call(move |conn| conn.query_row("SELECT COUNT(*) FROM media_tasks WHERE status = ?1", rusqlite::params![status_str], |r| r.get(0)))
            .await?;
        Ok(count as u64)
    }
}

fn row_to_media_task(row: &rusqlite::Row) -> rusqlite::Result<MediaTask> {
    let result_json: Option<String> = row.get(8)?;
    Ok(MediaTask {
        id: row.get(0)?,
        media_path: row.get(1)?,
        media_type: media_type_from_str(&row.get::<_, String>(2)?),
        mime_type: row.get(3)?,
        user_prompt: row.get(4)?,
        context_text: row.get(5)?,
        status: task_status_from_str(&row.get::<_, String>(6)?),
        error_message: row.get(7)?,
        result: result_json.and_then(|s| serde_json::from_str(&s).ok()),
        result_document_id: row.get(9)?,
        created_at: row.get(10)?,
        processed_at: row.get(11)?,
    })
}

fn prefixed_chunk_columns(alias: &str) -> String {
    CHUNK_COLUMNS.split(", ").map(|c| format!("{alias}.{c}")).collect::<Vec<_>>().join(", ")
}

fn filter_clause(filters: &ChunkFilters) -> (String, Vec<rusqlite::types::Value>) {
    let mut clause = String::new();
    let mut params = Vec::new();
    if let Some(ct) = filters.chunk_type {
        clause.push_str(" AND c.chunk_type = ?");
        params.push(rusqlite::types::Value::Text(ct.to_string()));
    }
    if let Some(lang) = &filters.language {
        clause.push_str(" AND c.language = ?");
        params.push(rusqlite::types::Value::Text(lang.clone()));
    }
    (clause, params)
}

fn json_scalar_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
    match value {
        serde_json::Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        serde_json::Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(rusqlite::types::Value::Integer)
            .or_else(|| n.as_f64().map(rusqlite::types::Value::Real))
            .unwrap_or(rusqlite::types::Value::Null),
        serde_json::Value::Null => rusqlite::types::Value::Null,
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkMetadata, MediaType};

    async fn open_test_store() -> SqliteStore {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("test.db")).with_embedding_dim(4);
        // Keep the tempdir alive for the store's lifetime by leaking it in tests only.
        std::mem::forget(dir);
        SqliteStore::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn save_and_get_document_round_trips() {
        let store = open_test_store().await;
        let doc = Document::new("hello world", MediaType::Text, Metadata::new());
        store.save(&doc, &[]).await.unwrap();
        let fetched = store.get_document_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
    }

    #[tokio::test]
    async fn save_rejects_mismatched_embedding_dimension() {
        let store = open_test_store().await;
        let doc = Document::new("x", MediaType::Text, Metadata::new());
        let chunk = Chunk::new(doc.id.clone(), 0, "x", ChunkType::Text, ChunkMetadata::for_document(&doc));
        let result = store.save(&doc, &[ChunkWithEmbedding { chunk, embedding: vec![0.1, 0.2] }]).await;
        assert!(matches!(result, Err(StoreError::VectorDimMismatch { expected: 4, actual: 2 })));
    }

    #[tokio::test]
    async fn vector_search_returns_closest_first() {
        let store = open_test_store().await;
        let doc = Document::new("doc", MediaType::Text, Metadata::new());
        store.save(&doc, &[]).await.unwrap();

        let near = Chunk::new(doc.id.clone(), 0, "near", ChunkType::Text, ChunkMetadata::for_document(&doc));
        let far = Chunk::new(doc.id.clone(), 1, "far", ChunkType::Text, ChunkMetadata::for_document(&doc));
        store
            .save(
                &doc,
                &[
                    ChunkWithEmbedding { chunk: near.clone(), embedding: vec![1.0, 0.0, 0.0, 0.0] },
                    ChunkWithEmbedding { chunk: far.clone(), embedding: vec![0.0, 0.0, 0.0, 1.0] },
                ],
            )
            .await
            .unwrap();

        let results = store
            .search_chunks(Some(vec![0.9, 0.1, 0.0, 0.0]), None, SearchMode::Vector, 10, 60.0, &ChunkFilters::default())
            .await
            .unwrap();
        assert_eq!(results.first().unwrap().chunk.id, near.id);
    }

    #[tokio::test]
    async fn fts_search_finds_matching_term() {
        let store = open_test_store().await;
        let doc = Document::new("doc", MediaType::Text, Metadata::new());
        store.save(&doc, &[]).await.unwrap();
        let chunk = Chunk::new(doc.id.clone(), 0, "the quick brown fox", ChunkType::Text, ChunkMetadata::for_document(&doc));
        store.save(&doc, &[ChunkWithEmbedding { chunk: chunk.clone(), embedding: vec![0.0; 4] }]).await.unwrap();

        let results = store
            .search_chunks(None, Some("fox"), SearchMode::Fts, 10, 60.0, &ChunkFilters::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, chunk.id);
    }

    #[tokio::test]
    async fn delete_by_metadata_removes_document_and_chunks() {
        let store = open_test_store().await;
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::Value::String("/a.md".into()));
        let doc = Document::new("doc", MediaType::Text, metadata);
        let chunk = Chunk::new(doc.id.clone(), 0, "text", ChunkType::Text, ChunkMetadata::for_document(&doc));
        store.save(&doc, &[ChunkWithEmbedding { chunk, embedding: vec![0.0; 4] }]).await.unwrap();

        let deleted = store.delete_by_metadata(&SearchFilters::new().with("source", serde_json::Value::String("/a.md".into()))).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_document_by_id(&doc.id).await.unwrap().is_none());
        assert!(store.get_chunks_by_document_id(&doc.id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hybrid_search_fuses_ranks_with_reciprocal_rank_fusion() {
        let store = open_test_store().await;
        let doc = Document::new("doc", MediaType::Text, Metadata::new());
        store.save(&doc, &[]).await.unwrap();

        let top = Chunk::new(doc.id.clone(), 0, "reciprocal rank fusion", ChunkType::Text, ChunkMetadata::for_document(&doc));
        let other = Chunk::new(doc.id.clone(), 1, "unrelated gardening text", ChunkType::Text, ChunkMetadata::for_document(&doc));
        store
            .save(
                &doc,
                &[
                    ChunkWithEmbedding { chunk: top.clone(), embedding: vec![1.0, 0.0, 0.0, 0.0] },
                    ChunkWithEmbedding { chunk: other.clone(), embedding: vec![0.0, 0.0, 0.0, 1.0] },
                ],
            )
            .await
            .unwrap();

        let results = store
            .search_chunks(Some(vec![1.0, 0.0, 0.0, 0.0]), Some("reciprocal rank fusion"), SearchMode::Hybrid, 10, 60.0, &ChunkFilters::default())
            .await
            .unwrap();

        assert_eq!(results[0].chunk.id, top.id);
        let expected = 1.0 / (60.0 + 1.0) + 1.0 / (60.0 + 1.0);
        assert!((results[0].score - expected).abs() < 1e-9, "got {}", results[0].score);
    }

    #[tokio::test]
    async fn media_task_queue_round_trips_fifo_order() {
        let store = open_test_store().await;
        let mut first = MediaTask::new("/a.png", MediaType::Image);
        let mut second = MediaTask::new("/b.png", MediaType::Image);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        first.created_at -= chrono::Duration::seconds(1);
        store.insert_media_task(&first).await.unwrap();
        store.insert_media_task(&second).await.unwrap();

        let next = store.next_pending_media_task().await.unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }
}
