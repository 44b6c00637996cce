//! The chunk store itself: split, optionally compress, persist, and
//! retrieve large text/JSON blobs behind opaque reference tokens.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use stage_config::ChunkingConfig;
use stage_core::token::format_token;

use crate::error::ChunkError;
use crate::policy::ChunkPolicy;

/// Content-type tag recorded alongside a chunked blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Text,
}

impl ContentType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

/// Either the literal value (chunking bypassed) or a chunk-reference token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeChunked {
    Literal(String),
    Token(String),
}

/// Wraps a single compartment's `libsql::Connection` to provide chunked
/// large-content storage. Shares the connection with C6/C7/C8 — the chunk
/// tables are plain tables in the same compartment database.
pub struct ChunkStore {
    conn: libsql::Connection,
    config: ChunkingConfig,
}

const CREATE_TABLES_SQL: &str = "
CREATE TABLE IF NOT EXISTS chunk_metadata (
    content_id TEXT PRIMARY KEY,
    total_chunks INTEGER NOT NULL,
    original_size INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    compressed INTEGER NOT NULL DEFAULT 0,
    encoding TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS content_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunk_data TEXT NOT NULL,
    chunk_size INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(content_id, chunk_index)
);
CREATE INDEX IF NOT EXISTS idx_content_chunks_lookup ON content_chunks(content_id, chunk_index);
CREATE INDEX IF NOT EXISTS idx_chunk_metadata_size ON chunk_metadata(original_size);
";

impl ChunkStore {
    /// Wrap a compartment connection, creating the system tables
    /// (`content_chunks`, `chunk_metadata`) if they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::LibSql`] if table creation fails.
    pub async fn new(conn: libsql::Connection, config: ChunkingConfig) -> Result<Self, ChunkError> {
        conn.execute_batch(CREATE_TABLES_SQL).await?;
        Ok(Self { conn, config })
    }

    /// Store `content` if `policy` (folded with the engine default) says it
    /// should be chunked; otherwise return it unchanged. This is the entry
    /// point C6/C7 call for every scalar/complex field value on the way in.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError`] if the underlying store fails.
    pub async fn maybe_chunk(
        &self,
        content: &str,
        content_type: ContentType,
        policy: ChunkPolicy,
    ) -> Result<MaybeChunked, ChunkError> {
        let len = content.len() as u64;
        if policy.should_chunk(len) {
            let token = self.store(content, content_type).await?;
            Ok(MaybeChunked::Token(token))
        } else {
            Ok(MaybeChunked::Literal(content.to_string()))
        }
    }

    /// Unconditionally store `content`, returning its chunk-reference token.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::LibSql`] if any insert fails.
    pub async fn store(&self, content: &str, content_type: ContentType) -> Result<String, ChunkError> {
        let original_size = content.len() as i64;
        let content_id = generate_content_id();

        let (bytes, compressed) = maybe_compress(content, &self.config);
        let encoded = BASE64.encode(&bytes);

        let chunk_size = self.config.chunk_size_bytes.max(1) as usize;
        let pieces: Vec<&str> = chunk_into_pieces(&encoded, chunk_size);
        let total_chunks = pieces.len().max(1);

        for (index, piece) in pieces.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO content_chunks (content_id, chunk_index, chunk_data, chunk_size)
                     VALUES (?1, ?2, ?3, ?4)",
                    libsql::params![content_id.as_str(), index as i64, *piece, piece.len() as i64],
                )
                .await?;
        }
        if pieces.is_empty() {
            // Empty content still gets exactly one (empty) chunk so that
            // P1's invariant (chunk count == total_chunks, indices [0, N))
            // holds even for a zero-length stored value.
            self.conn
                .execute(
                    "INSERT INTO content_chunks (content_id, chunk_index, chunk_data, chunk_size)
                     VALUES (?1, 0, '', 0)",
                    libsql::params![content_id.as_str()],
                )
                .await?;
        }

        let encoding = if compressed { Some("gzip+base64") } else { Some("base64") };
        self.conn
            .execute(
                "INSERT INTO chunk_metadata
                    (content_id, total_chunks, original_size, content_type, compressed, encoding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    content_id.as_str(),
                    total_chunks as i64,
                    original_size,
                    content_type.as_str(),
                    i64::from(compressed),
                    encoding
                ],
            )
            .await?;

        tracing::debug!(content_id = %content_id, total_chunks, original_size, compressed, "stored chunked content");

        Ok(format_token(&content_id))
    }

    /// Retrieve and reassemble the content behind `content_id`.
    ///
    /// Returns `Ok(None)` when no metadata record exists for the id.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::CorruptChunkSet`] if the stored chunk count
    /// disagrees with the metadata, or a decompression/encoding error if
    /// the stored bytes cannot be reconstituted.
    pub async fn retrieve(&self, content_id: &str) -> Result<Option<String>, ChunkError> {
        let mut rows = self
            .conn
            .query(
                "SELECT total_chunks, compressed FROM chunk_metadata WHERE content_id = ?1",
                libsql::params![content_id],
            )
            .await?;
        let Some(meta_row) = rows.next().await? else {
            return Ok(None);
        };
        let total_chunks = meta_row.get::<i64>(0)?;
        let compressed = meta_row.get::<i64>(1)? != 0;

        let mut chunk_rows = self
            .conn
            .query(
                "SELECT chunk_data FROM content_chunks WHERE content_id = ?1 ORDER BY chunk_index ASC",
                libsql::params![content_id],
            )
            .await?;

        let mut pieces = Vec::new();
        while let Some(row) = chunk_rows.next().await? {
            pieces.push(row.get::<String>(0)?);
        }

        if pieces.len() as i64 != total_chunks {
            return Err(ChunkError::CorruptChunkSet {
                content_id: content_id.to_string(),
                expected: total_chunks,
                found: pieces.len() as i64,
            });
        }

        let encoded: String = pieces.concat();
        let bytes = BASE64.decode(encoded.as_bytes()).map_err(|e| ChunkError::Encoding {
            content_id: content_id.to_string(),
            reason: e.to_string(),
        })?;

        let decoded_bytes = if compressed {
            let mut decoder = GzDecoder::new(bytes.as_slice());
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ChunkError::Decompress {
                    content_id: content_id.to_string(),
                    source: e,
                })?;
            out
        } else {
            bytes
        };

        let text = String::from_utf8(decoded_bytes).map_err(|e| ChunkError::Encoding {
            content_id: content_id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Some(text))
    }
}

fn generate_content_id() -> String {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).expect("system RNG unavailable");
    let mut hex = String::with_capacity(32 + 6);
    hex.push_str("chunk_");
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

fn maybe_compress(content: &str, config: &ChunkingConfig) -> (Vec<u8>, bool) {
    let raw = content.as_bytes();
    if !config.compression_enabled || (raw.len() as u64) <= config.compress_min_bytes {
        return (raw.to_vec(), false);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let compressed = encoder
        .write_all(raw)
        .and_then(|()| encoder.finish())
        .ok();

    match compressed {
        Some(gzipped) if gzipped.len() < raw.len() => (gzipped, true),
        _ => (raw.to_vec(), false),
    }
}

fn chunk_into_pieces(s: &str, chunk_size: usize) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    let bytes = s.as_bytes();
    let mut pieces = Vec::with_capacity(bytes.len().div_ceil(chunk_size));
    let mut start = 0;
    while start < bytes.len() {
        let end = (start + chunk_size).min(bytes.len());
        // base64 output is pure ASCII, so byte offsets are always char boundaries.
        pieces.push(&s[start..end]);
        start = end;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn in_memory_store() -> ChunkStore {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        ChunkStore::new(conn, ChunkingConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_small_uncompressed_content() {
        let store = in_memory_store().await;
        let text = "hello world";
        let token = store.store(text, ContentType::Text).await.unwrap();
        assert!(token.starts_with("__CHUNKED__:chunk_"));

        let content_id = token.strip_prefix("__CHUNKED__:").unwrap();
        let retrieved = store.retrieve(content_id).await.unwrap().unwrap();
        assert_eq!(retrieved, text);
    }

    #[tokio::test]
    async fn round_trips_large_content_across_many_chunks() {
        let store = in_memory_store().await;
        let text = "x".repeat(100_000);
        let token = store.store(&text, ContentType::Text).await.unwrap();
        let content_id = token.strip_prefix("__CHUNKED__:").unwrap();
        let retrieved = store.retrieve(content_id).await.unwrap().unwrap();
        assert_eq!(retrieved, text);
    }

    #[tokio::test]
    async fn round_trips_compressible_content() {
        let store = in_memory_store().await;
        let text = "repeat me ".repeat(5_000);
        let token = store.store(&text, ContentType::Text).await.unwrap();
        let content_id = token.strip_prefix("__CHUNKED__:").unwrap();

        let mut rows = store
            .conn
            .query(
                "SELECT compressed FROM chunk_metadata WHERE content_id = ?1",
                libsql::params![content_id],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);

        let retrieved = store.retrieve(content_id).await.unwrap().unwrap();
        assert_eq!(retrieved, text);
    }

    #[tokio::test]
    async fn missing_metadata_returns_none() {
        let store = in_memory_store().await;
        let result = store.retrieve("chunk_doesnotexist").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn detects_corrupt_chunk_set() {
        let store = in_memory_store().await;
        let token = store.store(&"y".repeat(100_000), ContentType::Text).await.unwrap();
        let content_id = token.strip_prefix("__CHUNKED__:").unwrap();

        store
            .conn
            .execute(
                "DELETE FROM content_chunks WHERE content_id = ?1 AND chunk_index = 0",
                libsql::params![content_id],
            )
            .await
            .unwrap();

        let result = store.retrieve(content_id).await;
        assert!(matches!(result, Err(ChunkError::CorruptChunkSet { .. })));
    }

    #[tokio::test]
    async fn maybe_chunk_bypasses_below_threshold() {
        let store = in_memory_store().await;
        let short = "short text";
        let result = store
            .maybe_chunk(short, ContentType::Text, ChunkPolicy::SizeBased { threshold_bytes: 32 * 1024 })
            .await
            .unwrap();
        assert_eq!(result, MaybeChunked::Literal(short.to_string()));

        let mut rows = store.conn.query("SELECT COUNT(*) FROM chunk_metadata", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 0);
    }

    #[tokio::test]
    async fn maybe_chunk_chunks_above_threshold() {
        let store = in_memory_store().await;
        let long = "z".repeat(40_000);
        let result = store
            .maybe_chunk(&long, ContentType::Text, ChunkPolicy::SizeBased { threshold_bytes: 32 * 1024 })
            .await
            .unwrap();
        assert!(matches!(result, MaybeChunked::Token(_)));
    }
}
