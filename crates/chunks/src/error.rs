//! Chunk store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Metadata and chunk rows disagree: the stored chunk count does not
    /// match `chunk_metadata.total_chunks` (`spec.md` §4.3, §7 `CorruptChunkSet`).
    #[error("corrupt chunk set for content id '{content_id}': expected {expected} chunks, found {found}")]
    CorruptChunkSet {
        content_id: String,
        expected: i64,
        found: i64,
    },

    /// The chunk bytes could not be decompressed despite the metadata's
    /// compression flag being set.
    #[error("failed to decompress chunk content for '{content_id}': {source}")]
    Decompress {
        content_id: String,
        source: std::io::Error,
    },

    /// The chunk bytes are not valid base64 or not valid UTF-8 once decoded.
    #[error("corrupt chunk encoding for '{content_id}': {reason}")]
    Encoding { content_id: String, reason: String },
}
