//! # stage-core
//!
//! Foundational, dependency-free building blocks shared by every other
//! crate in the staging engine:
//! - safe SQL identifier normalisation (table and column names)
//! - per-column SQL storage-class inference and widening
//! - the chunk-reference token format used to mark oversized values

pub mod ident;
pub mod token;
pub mod types;
