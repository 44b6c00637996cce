//! Schema descriptor parse errors.

use thiserror::Error;

/// Errors from parsing a type-graph schema descriptor (C4).
///
/// The parser is informative-only: a `SchemaError` aborts descriptor
/// parsing, not structural inference — callers degrade to pure structural
/// inference (C5) on any of these.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A type block was opened but never closed.
    #[error("unterminated type block '{type_name}' starting at line {line}")]
    UnterminatedBlock { type_name: String, line: usize },

    /// A field line could not be split into a name and a type expression.
    #[error("malformed field line at line {line}: {text:?}")]
    MalformedFieldLine { line: usize, text: String },

    /// A chunk rule annotation referenced an unrecognised priority keyword.
    #[error("unknown chunk rule '{rule}' at line {line}, expected never/always/size-based")]
    UnknownChunkRule { line: usize, rule: String },
}
