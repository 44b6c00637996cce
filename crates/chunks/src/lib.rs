//! # stage-chunks
//!
//! Large-content chunking store (C3, `spec.md` §4.3): detects oversized
//! field payloads, splits them into size-bounded chunks with optional gzip
//! compression, and transparently reassembles them on read.
//!
//! Values live behind an opaque chunk-reference token (`stage_core::token`);
//! callers never see the chunk table shape directly.

pub mod error;
pub mod policy;
pub mod stats;
pub mod store;

pub use error::ChunkError;
pub use policy::{ChunkPolicy, FieldChunkRule, effective_policy};
pub use stats::ChunkingStats;
pub use store::{ChunkStore, ContentType, MaybeChunked};
