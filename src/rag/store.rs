//! Single-file SQLite persistence for `VectorIndex`.
//!
//! The whole aggregate (manifest, chunk metadata, vectors) lives in one
//! database file. `persist` writes a complete new file beside the target and
//! renames it into place, so readers only ever see the old store or the new
//! one. `load` verifies row alignment and a SHA-256 checksum before handing
//! the index out.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::chunker::Chunk;
use super::index::{IndexMetadata, VectorIndex, INDEX_FORMAT_VERSION};
use crate::core::errors::RagError;

const META_MANIFEST: &str = "manifest";
const META_CHUNK_COUNT: &str = "chunk_count";
const META_CHECKSUM: &str = "checksum";

impl VectorIndex {
    /// Write the full index to `path`, replacing any previous store atomically.
    pub async fn persist(&self, path: &Path) -> Result<(), RagError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = staging_path(path);
        match write_store(self, &staging).await {
            Ok(()) => {
                tokio::fs::rename(&staging, path).await?;
                tracing::info!("Saved index with {} chunks to {}", self.len(), path.display());
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                Err(e)
            }
        }
    }

    /// Read a store written by `persist`.
    ///
    /// A missing file is `EmptyIndex`; anything unreadable or inconsistent is
    /// `CorruptStore`.
    pub async fn load(path: &Path) -> Result<VectorIndex, RagError> {
        if !path.is_file() {
            return Err(RagError::EmptyIndex(format!(
                "{} does not exist; run training first",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(RagError::corrupt)?;

        let result = read_store(&pool).await;
        pool.close().await;
        let index = result?;

        tracing::info!(
            "Loaded index from {}: {} documents, {} chunks",
            path.display(),
            index.metadata().document_count,
            index.len()
        );
        Ok(index)
    }

    /// `load`, then fail with `IncompatibleIndex` unless the store was built
    /// with `embedding_model` at `dimension`.
    pub async fn load_compatible(
        path: &Path,
        embedding_model: &str,
        dimension: usize,
    ) -> Result<VectorIndex, RagError> {
        let index = Self::load(path).await?;
        index.ensure_compatible(embedding_model, dimension)?;
        Ok(index)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index.sqlite".to_string());
    path.with_file_name(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()))
}

fn store_error<E: std::fmt::Display>(err: E) -> RagError {
    RagError::Io(std::io::Error::other(err.to_string()))
}

async fn write_store(index: &VectorIndex, path: &Path) -> Result<(), RagError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Full);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(store_error)?;

    let result = write_contents(index, &pool).await;
    pool.close().await;
    result
}

async fn write_contents(index: &VectorIndex, pool: &SqlitePool) -> Result<(), RagError> {
    sqlx::query(
        "CREATE TABLE index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(store_error)?;

    sqlx::query(
        "CREATE TABLE entries (
            row_id INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            source_document TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            page INTEGER,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(store_error)?;

    let manifest = serde_json::to_string(index.metadata()).map_err(store_error)?;
    let blobs: Vec<Vec<u8>> = index
        .matrix()
        .rows()
        .into_iter()
        .map(|row| serialize_embedding(row.iter().copied()))
        .collect();
    let checksum = compute_checksum(&manifest, index.chunks(), &blobs);

    let mut tx = pool.begin().await.map_err(store_error)?;

    for (key, value) in [
        (META_MANIFEST, manifest),
        (META_CHUNK_COUNT, index.len().to_string()),
        (META_CHECKSUM, checksum),
    ] {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
    }

    for (row_id, (chunk, blob)) in index.chunks().iter().zip(&blobs).enumerate() {
        sqlx::query(
            "INSERT INTO entries
                (row_id, chunk_id, source_document, chunk_index, start_offset, end_offset, page, content, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(row_id as i64)
        .bind(chunk.chunk_id.as_str())
        .bind(chunk.source_document.as_str())
        .bind(chunk.chunk_index as i64)
        .bind(chunk.start_offset as i64)
        .bind(chunk.end_offset as i64)
        .bind(chunk.page.map(i64::from))
        .bind(chunk.text.as_str())
        .bind(blob.as_slice())
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
    }

    tx.commit().await.map_err(store_error)?;
    Ok(())
}

async fn read_store(pool: &SqlitePool) -> Result<VectorIndex, RagError> {
    let manifest = read_meta(pool, META_MANIFEST).await?;
    let metadata: IndexMetadata = serde_json::from_str(&manifest)
        .map_err(|e| RagError::corrupt(format!("unreadable manifest: {}", e)))?;
    if metadata.format_version != INDEX_FORMAT_VERSION {
        return Err(RagError::corrupt(format!(
            "unsupported store format version {}",
            metadata.format_version
        )));
    }

    let expected_rows: usize = read_meta(pool, META_CHUNK_COUNT)
        .await?
        .parse()
        .map_err(|e| RagError::corrupt(format!("bad chunk count: {}", e)))?;
    let checksum = read_meta(pool, META_CHECKSUM).await?;

    let rows = sqlx::query(
        "SELECT row_id, chunk_id, source_document, chunk_index, start_offset, end_offset, page, content, embedding
         FROM entries
         ORDER BY row_id",
    )
    .fetch_all(pool)
    .await
    .map_err(RagError::corrupt)?;

    if rows.len() != expected_rows {
        return Err(RagError::corrupt(format!(
            "manifest lists {} chunks but {} are stored",
            expected_rows,
            rows.len()
        )));
    }

    let blob_len = metadata.dimension * 4;
    let mut chunks = Vec::with_capacity(rows.len());
    let mut blobs = Vec::with_capacity(rows.len());

    for (position, row) in rows.iter().enumerate() {
        let row_id: i64 = row.try_get("row_id").map_err(RagError::corrupt)?;
        if row_id != position as i64 {
            return Err(RagError::corrupt(format!(
                "row ids are not contiguous: expected {}, found {}",
                position, row_id
            )));
        }

        let blob: Vec<u8> = row.try_get("embedding").map_err(RagError::corrupt)?;
        if blob.len() != blob_len {
            return Err(RagError::corrupt(format!(
                "row {} holds a {}-byte vector, expected {}",
                row_id,
                blob.len(),
                blob_len
            )));
        }

        chunks.push(row_to_chunk(row)?);
        blobs.push(blob);
    }

    if compute_checksum(&manifest, &chunks, &blobs) != checksum {
        return Err(RagError::corrupt("checksum mismatch"));
    }

    let vectors = blobs.iter().flat_map(|b| deserialize_embedding(b)).collect();
    let index = VectorIndex::from_parts(metadata, chunks, vectors)?;

    let stored_documents = index.sources().len();
    if index.metadata().document_count != stored_documents {
        return Err(RagError::corrupt(format!(
            "manifest lists {} documents but chunks cite {}",
            index.metadata().document_count,
            stored_documents
        )));
    }
    Ok(index)
}

async fn read_meta(pool: &SqlitePool, key: &str) -> Result<String, RagError> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(RagError::corrupt)?;
    value.ok_or_else(|| RagError::corrupt(format!("missing '{}' entry", key)))
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, RagError> {
    let as_usize = |column: &str| -> Result<usize, RagError> {
        let value: i64 = row.try_get(column).map_err(RagError::corrupt)?;
        usize::try_from(value).map_err(|_| RagError::corrupt(format!("negative {}", column)))
    };
    let page: Option<i64> = row.try_get("page").map_err(RagError::corrupt)?;

    Ok(Chunk {
        chunk_id: row.try_get("chunk_id").map_err(RagError::corrupt)?,
        text: row.try_get("content").map_err(RagError::corrupt)?,
        source_document: row.try_get("source_document").map_err(RagError::corrupt)?,
        chunk_index: as_usize("chunk_index")?,
        start_offset: as_usize("start_offset")?,
        end_offset: as_usize("end_offset")?,
        page: page.and_then(|p| u32::try_from(p).ok()),
    })
}

fn serialize_embedding(values: impl Iterator<Item = f32>) -> Vec<u8> {
    values.flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Covers the manifest text and every persisted column. Variable-length
/// fields are length-prefixed so neighbouring values cannot trade bytes.
fn compute_checksum(manifest: &str, chunks: &[Chunk], blobs: &[Vec<u8>]) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, manifest.as_bytes());
    for (row_id, (chunk, blob)) in chunks.iter().zip(blobs).enumerate() {
        hasher.update((row_id as u64).to_le_bytes());
        field(&mut hasher, chunk.chunk_id.as_bytes());
        field(&mut hasher, chunk.source_document.as_bytes());
        hasher.update((chunk.chunk_index as u64).to_le_bytes());
        hasher.update((chunk.start_offset as u64).to_le_bytes());
        hasher.update((chunk.end_offset as u64).to_le_bytes());
        match chunk.page {
            Some(page) => {
                hasher.update([1u8]);
                hasher.update(page.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        field(&mut hasher, chunk.text.as_bytes());
        field(&mut hasher, blob);
    }
    hex::encode(hasher.finalize())
}
