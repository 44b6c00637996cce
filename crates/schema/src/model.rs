//! Shared types produced by the descriptor parser (C4) and the inference
//! engine (C5): discovered entity types, table/junction shapes, and the
//! relationship graph between them.

use std::collections::BTreeMap;

use stage_chunks::ChunkPolicy;
use stage_core::types::ColumnType;

/// Cardinality of a directed relationship between two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

/// A directed "parent contains child" relationship observed between two
/// distinct entity types, or declared explicitly in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub from_type: String,
    pub to_type: String,
    pub field_name: String,
    pub cardinality: Cardinality,
}

/// A field's declared shape in a schema descriptor: its base type, and
/// whether it is a list and/or nullable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub base_type: String,
    pub is_list: bool,
    pub is_nullable: bool,
}

/// A descriptor-declared type: field name -> declared shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub fields: BTreeMap<String, FieldDescriptor>,
}

/// A field-level extraction hint from a descriptor: which source path (if
/// different from the field name) to read the value from. The parser is
/// informative-only — this is consumed by C5/C6 only when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    pub type_name: String,
    pub field_name: String,
    pub source_path: String,
}

/// A per-field chunking override parsed from a descriptor (§4.3), keyed by
/// `(type_name, field_name)`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRule {
    pub policy: ChunkPolicy,
}

/// The full result of parsing a schema descriptor: declared types,
/// relationships, extraction rules, and chunk rules. Every field is
/// independently optional to consult — a caller with no descriptor at all
/// simply never builds one of these.
#[derive(Debug, Clone, Default)]
pub struct ParsedDescriptor {
    pub types: BTreeMap<String, TypeDescriptor>,
    pub relationships: Vec<Relationship>,
    pub extraction_rules: Vec<ExtractionRule>,
    pub chunk_rules: BTreeMap<(String, String), ChunkRule>,
}

impl ParsedDescriptor {
    #[must_use]
    pub fn chunk_rule_for(&self, type_name: &str, field_name: &str) -> Option<ChunkPolicy> {
        self.chunk_rules
            .get(&(type_name.to_string(), field_name.to_string()))
            .map(|rule| rule.policy)
    }
}

/// A type discovered by structural inference (C5 phase 1): every observed
/// entity's fields folded into a column-type map, plus a handful of
/// materialised samples. Relationships fanning out from this type are
/// tracked separately, deduplicated across all discovered types.
#[derive(Debug, Clone)]
pub struct DiscoveredType {
    pub name: String,
    pub columns: BTreeMap<String, ColumnType>,
    /// Whether every observation of this type supplied its own `id` (or
    /// domain-identifier) value as an integer — used to decide whether the
    /// surrogate key is `INTEGER PRIMARY KEY` (caller-supplied) or
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`.
    pub all_ids_supplied_as_integer: bool,
    pub any_id_supplied: bool,
    /// Storage class folded over every supplied id value observed for this
    /// type; meaningless (defaults `Integer`) when `any_id_supplied` is
    /// `false` — the surrogate is then a plain autoincrementing integer.
    pub id_column_type: ColumnType,
    pub samples: Vec<serde_json::Value>,
}

impl Default for DiscoveredType {
    fn default() -> Self {
        Self {
            name: String::new(),
            columns: BTreeMap::new(),
            all_ids_supplied_as_integer: true,
            any_id_supplied: false,
            id_column_type: ColumnType::Integer,
            samples: Vec::new(),
        }
    }
}

/// A single column in a synthesised table.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// A flat row shape synthesised for one entity type (§3 "Table").
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub id_column_type: ColumnType,
    /// `true` when at least one observation supplied its own id (or domain
    /// identifier) value — the surrogate is then declared without
    /// `AUTOINCREMENT` (§4.5 phase 2).
    pub id_is_caller_supplied: bool,
}

/// A many-to-many link table between two distinct entity types (§3
/// "Junction Table"). `left_type`/`right_type` are always in alphabetical
/// order — callers key collected pairs the same way.
#[derive(Debug, Clone)]
pub struct JunctionDef {
    pub name: String,
    pub left_type: String,
    pub right_type: String,
    pub left_column: String,
    pub right_column: String,
}

impl JunctionDef {
    /// Build the canonical (alphabetically-ordered) junction definition for
    /// two entity type names (§4.5 phase 3, §9 "Canonical junction naming").
    #[must_use]
    pub fn canonical(type_a: &str, type_b: &str) -> Self {
        let (left, right) = if type_a <= type_b {
            (type_a, type_b)
        } else {
            (type_b, type_a)
        };
        Self {
            name: stage_core::ident::normalise_table(&format!("{left}_{right}")),
            left_type: left.to_string(),
            right_type: right.to_string(),
            left_column: format!("{left}_id"),
            right_column: format!("{right}_id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_junction_is_alphabetical_regardless_of_input_order() {
        let ab = JunctionDef::canonical("target", "disease");
        let ba = JunctionDef::canonical("disease", "target");
        assert_eq!(ab.name, ba.name);
        assert_eq!(ab.name, "disease_target");
        assert_eq!(ab.left_type, "disease");
        assert_eq!(ab.right_type, "target");
    }

    #[test]
    fn self_relations_are_representable_but_callers_suppress_them() {
        let def = JunctionDef::canonical("target", "target");
        assert_eq!(def.left_type, def.right_type);
    }
}
