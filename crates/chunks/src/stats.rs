//! Aggregate chunking statistics (`chunking_stats()`, `spec.md` §6.5).

use serde::Serialize;

use crate::error::ChunkError;

#[derive(Debug, Clone, Serialize, Default)]
pub struct MetadataStats {
    pub total_chunked_items: i64,
    pub total_original_size: i64,
    pub avg_original_size: f64,
    pub total_chunks: i64,
    pub compressed_items: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ChunkRecordStats {
    pub total_chunk_records: i64,
    pub total_stored_size: i64,
    pub avg_chunk_size: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ChunkingStats {
    pub metadata: MetadataStats,
    pub chunks: ChunkRecordStats,
    pub compression_ratio: f64,
}

/// Compute [`ChunkingStats`] from the two system tables.
///
/// # Errors
///
/// Returns [`ChunkError::LibSql`] if either aggregate query fails.
pub async fn compute(conn: &libsql::Connection) -> Result<ChunkingStats, ChunkError> {
    let mut rows = conn
        .query(
            "SELECT
                COUNT(*),
                COALESCE(SUM(original_size), 0),
                COALESCE(AVG(original_size), 0.0),
                COALESCE(SUM(total_chunks), 0),
                COALESCE(SUM(compressed), 0)
             FROM chunk_metadata",
            (),
        )
        .await?;
    let metadata = if let Some(row) = rows.next().await? {
        MetadataStats {
            total_chunked_items: row.get::<i64>(0)?,
            total_original_size: row.get::<i64>(1)?,
            avg_original_size: row.get::<f64>(2)?,
            total_chunks: row.get::<i64>(3)?,
            compressed_items: row.get::<i64>(4)?,
        }
    } else {
        MetadataStats::default()
    };

    let mut rows = conn
        .query(
            "SELECT
                COUNT(*),
                COALESCE(SUM(chunk_size), 0),
                COALESCE(AVG(chunk_size), 0.0)
             FROM content_chunks",
            (),
        )
        .await?;
    let chunks = if let Some(row) = rows.next().await? {
        ChunkRecordStats {
            total_chunk_records: row.get::<i64>(0)?,
            total_stored_size: row.get::<i64>(1)?,
            avg_chunk_size: row.get::<f64>(2)?,
        }
    } else {
        ChunkRecordStats::default()
    };

    let compression_ratio = if metadata.total_original_size > 0 {
        chunks.total_stored_size as f64 / metadata.total_original_size as f64
    } else {
        0.0
    };

    Ok(ChunkingStats {
        metadata,
        chunks,
        compression_ratio,
    })
}
