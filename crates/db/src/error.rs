//! Error types for the insertion engine, SQL gate, and introspector (C6–C8).

use thiserror::Error;

/// Errors surfaced by `stage-db`.
///
/// Per `spec.md` §7, most of these are absorbed at the service boundary
/// rather than propagated to the caller: `OperationNotAllowed` and
/// `SqlExecutionError` become `{ success: false, error }` responses;
/// `StagingFailure` becomes `{ success: false, message }`.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// A chunk store operation failed.
    #[error("chunk store error: {0}")]
    Chunk(#[from] stage_chunks::ChunkError),

    /// The query gate rejected a statement (`spec.md` §4.7, §7 `OperationNotAllowed`).
    #[error("operation not allowed: {reason}")]
    OperationNotAllowed { reason: String },

    /// A value could not be serialised to JSON on its way into a `_json` column.
    #[error("failed to serialise value: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Insertion or DDL failed mid-operation (`spec.md` §7 `StagingFailure`).
    #[error("staging failed: {0}")]
    StagingFailure(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
