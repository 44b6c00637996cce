//! # stage-schema
//!
//! Schema descriptor parsing and structural inference over staged JSON
//! payloads.
//!
//! This crate provides:
//! - [`descriptor`]: an optional, informative-only type-graph DSL parser
//!   that refines chunking policy and relationship cardinality when a
//!   descriptor is supplied.
//! - [`infer`]: the structural inference engine that discovers entities,
//!   relationships, and table/junction shapes directly from an untyped
//!   payload, with or without a descriptor.
//! - [`model`]: the shared types both produce.
//!
//! ## Architecture
//!
//! Entity discovery and row-shaping rules live in [`infer`] as free
//! functions (`classify_field`, `build_entity_row_fields`, ...) so that the
//! insertion engine in `stage-db` can replay the same traversal against a
//! payload without duplicating the classification logic.

pub mod descriptor;
pub mod error;
pub mod infer;
pub mod model;

pub use error::SchemaError;
pub use infer::{
    build_entity_row_fields, classify_field, infer, infer_type_name, is_candidate_entity, is_identifier_key,
    relation_row_field, supplied_identifier, supplied_identifier_key, FieldClass, InferenceOutput,
};
pub use model::{
    Cardinality, ChunkRule, ColumnDef, DiscoveredType, ExtractionRule, FieldDescriptor, JunctionDef, ParsedDescriptor,
    Relationship, TableDef, TypeDescriptor,
};
