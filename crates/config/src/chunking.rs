//! Chunk store tunables (`spec.md` §4.3 thresholds, with override points).

use serde::{Deserialize, Serialize};

const fn default_threshold() -> u64 {
    32 * 1024
}

const fn default_chunk_size() -> u64 {
    16 * 1024
}

const fn default_compress_min() -> u64 {
    8 * 1024
}

const fn default_compression_enabled() -> bool {
    true
}

const fn default_sample_rows() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Minimum byte length at which a field value is chunked (`CHUNK_THRESHOLD`).
    #[serde(default = "default_threshold")]
    pub chunk_threshold_bytes: u64,

    /// Slice size used when splitting an oversized value (`CHUNK_SIZE`).
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,

    /// Minimum byte length at which gzip compression is attempted (`COMPRESS_MIN`).
    #[serde(default = "default_compress_min")]
    pub compress_min_bytes: u64,

    /// Whether gzip compression is attempted at all above `compress_min_bytes`.
    #[serde(default = "default_compression_enabled")]
    pub compression_enabled: bool,

    /// Number of sample rows captured per table for introspection summaries.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: default_threshold(),
            chunk_size_bytes: default_chunk_size(),
            compress_min_bytes: default_compress_min(),
            compression_enabled: default_compression_enabled(),
            sample_rows: default_sample_rows(),
        }
    }
}
