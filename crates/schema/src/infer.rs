//! Schema inference engine (C5).
//!
//! Walks an untyped JSON payload depth-first, enumerates entities and the
//! relationships between them, and synthesises table and junction
//! definitions. Also exposes the row-shaping building blocks
//! ([`classify_field`], [`build_entity_row_fields`]) that the insertion
//! engine (C6, in `stage-db`) reuses to replay the same traversal while
//! materialising rows.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use serde_json::Value;
use stage_core::ident::{normalise_column, normalise_table};
use stage_core::types::ColumnType;

use crate::model::{Cardinality, ColumnDef, DiscoveredType, JunctionDef, Relationship, TableDef};

const HUMAN_MEANINGFUL_FIELDS: &[&str] = &["name", "symbol", "description", "type", "score"];

/// Domain identifier keys that map to a canonical entity type name,
/// independent of the enclosing path segment (§4.1 "a known identifier
/// key... maps to a canonical type name"). Keys are matched after
/// lowercasing and stripping non-alphanumeric characters, so `ensemblId`,
/// `ensembl_id`, and `ENSEMBL-ID` are all equivalent.
static DOMAIN_IDENTIFIER_TYPES: LazyLock<std::collections::HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("ensemblid", "target"),
        ("targetid", "target"),
        ("chemblid", "compound"),
        ("compoundid", "compound"),
        ("efoid", "disease"),
        ("diseaseid", "disease"),
        ("geneid", "gene"),
    ]
    .into_iter()
    .collect()
});

fn normalise_key(key: &str) -> String {
    key.chars().filter(char::is_ascii_alphanumeric).collect::<String>().to_ascii_lowercase()
}

/// Whether `key` is one of the designated identifier keys: the generic
/// `id`, or a domain identifier key (§3 "Entity").
#[must_use]
pub fn is_identifier_key(key: &str) -> bool {
    let norm = normalise_key(key);
    norm == "id" || DOMAIN_IDENTIFIER_TYPES.contains_key(norm.as_str())
}

fn identifier_type_hint(key: &str) -> Option<&'static str> {
    DOMAIN_IDENTIFIER_TYPES.get(normalise_key(key).as_str()).copied()
}

fn is_scalar_value(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Whether a map node qualifies as an entity (§3 "Entity"): it carries at
/// least one identifier key, or it has at least two fields and at least one
/// human-meaningful field.
#[must_use]
pub fn is_candidate_entity(map: &serde_json::Map<String, Value>) -> bool {
    if map.is_empty() {
        return false;
    }
    if map.keys().any(|k| is_identifier_key(k)) {
        return true;
    }
    map.len() >= 2 && map.keys().any(|k| HUMAN_MEANINGFUL_FIELDS.contains(&normalise_key(k).as_str()))
}

/// If `map` carries no identifier of its own but wraps exactly one nested
/// entity-shaped field, return that field's key. This is the "relation-row
/// wrapper" shape from `spec.md` §8 scenario 2 — `{ "disease": {...}, "score":
/// 0.9 }`, or the bare `{ "disease": {...} }` — a carrier for a relationship
/// plus optional relation-attribute scalars, never an entity in its own
/// right even when a sibling scalar happens to be human-meaningful (`score`
/// is itself in [`HUMAN_MEANINGFUL_FIELDS`]). `None` if `map` supplies its
/// own identifier, or if zero or more than one field qualifies as a nested
/// entity (ambiguous).
#[must_use]
pub fn relation_row_field(map: &serde_json::Map<String, Value>) -> Option<&str> {
    if map.keys().any(|k| is_identifier_key(k)) {
        return None;
    }
    let mut found: Option<&str> = None;
    for (key, value) in map {
        if let Value::Object(nested) = value
            && is_candidate_entity(nested)
        {
            if found.is_some() {
                return None;
            }
            found = Some(key.as_str());
        }
    }
    found
}

/// The key whose value is used as this entity's surrogate identifier.
/// Prefers the generic `id` field over any domain identifier key when both
/// are present (`spec.md` §9 Open Question (i), preserved as-is).
#[must_use]
pub fn supplied_identifier_key(map: &serde_json::Map<String, Value>) -> Option<&str> {
    if map.contains_key("id") {
        return Some("id");
    }
    map.keys().find(|k| is_identifier_key(k)).map(String::as_str)
}

/// The value at [`supplied_identifier_key`], if any.
#[must_use]
pub fn supplied_identifier(map: &serde_json::Map<String, Value>) -> Option<&Value> {
    supplied_identifier_key(map).and_then(|key| map.get(key))
}

fn singularize(segment: &str) -> String {
    if let Some(stem) = segment.strip_suffix("ies") {
        format!("{stem}y")
    } else if segment.len() > 1 && segment.ends_with('s') && !segment.ends_with("ss") {
        segment[..segment.len() - 1].to_string()
    } else {
        segment.to_string()
    }
}

/// Derive a stable entity type name for `map`, in priority order: an
/// explicit `__typename` discriminator; a known identifier key's canonical
/// type; the singularised enclosing path segment; else a synthesised unique
/// name (§3 "Entity Type"). The result is always already normalised via
/// [`normalise_table`].
pub fn infer_type_name(map: &serde_json::Map<String, Value>, path_segment: &str, synthetic_counter: &mut usize) -> String {
    if let Some(explicit) = map.get("__typename").and_then(Value::as_str) {
        return normalise_table(explicit);
    }
    if let Some(hint) = map.keys().find_map(|k| identifier_type_hint(k)) {
        return hint.to_string();
    }
    if !path_segment.is_empty() {
        return normalise_table(&singularize(path_segment));
    }
    *synthetic_counter += 1;
    normalise_table(&format!("type_{synthetic_counter}"))
}

/// The shape a field's value takes when building an entity's row (§4.5,
/// "Within a single entity, when extracting fields for its row shape").
pub enum FieldClass<'a> {
    Scalar(&'a Value),
    NestedEntitySingleton(&'a serde_json::Map<String, Value>),
    /// An array of entity-shaped elements (possibly unwrapped from a graph
    /// wrapper `{edges: [...]}` / `{rows: [...]}` / `{nodes: [...]}`).
    EntityArray(Vec<&'a Value>),
    FlattenedMap(&'a serde_json::Map<String, Value>),
    Complex(&'a Value),
}

/// Unwrap a graph-wrapper shape (`{edges: [{node: ...}]}`, `{rows: [...]}`,
/// `{nodes: [...]}`) into its inner element list, or `None` if `map` is not
/// a wrapper (§9 "Graph-wrapper transparency").
fn unwrap_wrapper_elements(map: &serde_json::Map<String, Value>) -> Option<Vec<&Value>> {
    if let Some(Value::Array(edges)) = map.get("edges") {
        return Some(edges.iter().map(|edge| edge.get("node").unwrap_or(edge)).collect());
    }
    if let Some(Value::Array(rows)) = map.get("rows") {
        return Some(rows.iter().collect());
    }
    if let Some(Value::Array(nodes)) = map.get("nodes") {
        return Some(nodes.iter().collect());
    }
    None
}

fn as_entity_array(elements: Vec<&Value>) -> Option<FieldClass<'_>> {
    let first_is_entity = elements
        .first()
        .and_then(|v| v.as_object())
        .is_some_and(is_candidate_entity);
    first_is_entity.then_some(FieldClass::EntityArray(elements))
}

/// Classify a field's value into the row-shape bucket it contributes to its
/// owning entity's columns (§4.5).
#[must_use]
pub fn classify_field(value: &Value) -> FieldClass<'_> {
    match value {
        Value::Array(arr) => as_entity_array(arr.iter().collect()).unwrap_or(FieldClass::Complex(value)),
        Value::Object(map) => {
            if let Some(elements) = unwrap_wrapper_elements(map) {
                return as_entity_array(elements).unwrap_or(FieldClass::Complex(value));
            }
            if is_candidate_entity(map) {
                FieldClass::NestedEntitySingleton(map)
            } else if map.values().any(is_scalar_value) {
                FieldClass::FlattenedMap(map)
            } else {
                FieldClass::Complex(value)
            }
        }
        scalar => FieldClass::Scalar(scalar),
    }
}

/// Build the flat `(column_name, column_type, value)` triples for one
/// entity's row, per §4.5's field-extraction rules. `skip_key`, when given,
/// excludes the field that supplied the surrogate identifier (it becomes
/// the `id` column itself, not a duplicate regular column).
///
/// Shared verbatim between schema inference (which only needs the shape)
/// and data insertion (C6, which needs the values too).
#[must_use]
pub fn build_entity_row_fields(map: &serde_json::Map<String, Value>, skip_key: Option<&str>) -> Vec<(String, ColumnType, Value)> {
    let mut fields = Vec::new();
    for (key, value) in map {
        if Some(key.as_str()) == skip_key {
            continue;
        }
        match classify_field(value) {
            FieldClass::Scalar(v) => fields.push((normalise_column(key), ColumnType::observe(v), v.clone())),
            FieldClass::NestedEntitySingleton(nested) => {
                let id_value = supplied_identifier(nested).cloned().unwrap_or(Value::Null);
                let column_type = if id_value.is_null() { ColumnType::Integer } else { ColumnType::observe(&id_value) };
                fields.push((normalise_column(&format!("{key}_id")), column_type, id_value));
            }
            FieldClass::EntityArray(_) => {
                // Becomes a junction row, not a column on this entity's own table.
            }
            FieldClass::FlattenedMap(sub) => {
                for (sub_key, sub_value) in sub {
                    if is_scalar_value(sub_value) {
                        fields.push((
                            normalise_column(&format!("{key}_{sub_key}")),
                            ColumnType::observe(sub_value),
                            sub_value.clone(),
                        ));
                    }
                }
            }
            FieldClass::Complex(v) => {
                fields.push((normalise_column(&format!("{key}_json")), ColumnType::Text, v.clone()));
            }
        }
    }
    fields
}

/// The outcome of running C5 over a payload: table and junction
/// definitions ready for DDL emission, plus the raw relationship list
/// junctions were derived from (useful for diagnostics/logging).
#[derive(Debug, Clone, Default)]
pub struct InferenceOutput {
    pub tables: Vec<TableDef>,
    pub junctions: Vec<JunctionDef>,
    pub relationships: Vec<Relationship>,
}

struct Discovery {
    types: BTreeMap<String, DiscoveredType>,
    relationships: Vec<Relationship>,
    seen_relationships: HashSet<(String, String, String)>,
    synthetic_counter: usize,
    sample_rows: usize,
}

impl Discovery {
    fn new(sample_rows: usize) -> Self {
        Self {
            types: BTreeMap::new(),
            relationships: Vec::new(),
            seen_relationships: HashSet::new(),
            synthetic_counter: 0,
            sample_rows,
        }
    }

    fn record_relationship(&mut self, from_type: &str, to_type: &str, field_name: &str) {
        if from_type == to_type {
            return;
        }
        let key = (from_type.to_string(), to_type.to_string(), field_name.to_string());
        if self.seen_relationships.insert(key) {
            self.relationships.push(Relationship {
                from_type: from_type.to_string(),
                to_type: to_type.to_string(),
                field_name: field_name.to_string(),
                cardinality: Cardinality::OneToMany,
            });
        }
    }

    fn fold_entity(&mut self, type_name: &str, map: &serde_json::Map<String, Value>) {
        let skip_key = supplied_identifier_key(map).map(ToString::to_string);
        let entry = self
            .types
            .entry(type_name.to_string())
            .or_insert_with(|| DiscoveredType {
                name: type_name.to_string(),
                ..Default::default()
            });

        if let Some(id_value) = supplied_identifier(map) {
            entry.any_id_supplied = true;
            let is_integer = matches!(id_value, Value::Number(n) if n.is_i64() || n.is_u64());
            entry.all_ids_supplied_as_integer &= is_integer;
            entry.id_column_type = entry.id_column_type.widen(ColumnType::observe(id_value));
        } else {
            entry.all_ids_supplied_as_integer = false;
        }

        for (name, column_type, _value) in build_entity_row_fields(map, skip_key.as_deref()) {
            entry
                .columns
                .entry(name)
                .and_modify(|existing| *existing = existing.widen(column_type))
                .or_insert(column_type);
        }

        if entry.samples.len() < self.sample_rows {
            entry.samples.push(Value::Object(map.clone()));
        }
    }

    /// Recurse into an entity's own fields, one level deeper, discovering
    /// further nested entities and the relationships they form.
    fn recurse_entity_fields(&mut self, type_name: &str, map: &serde_json::Map<String, Value>) {
        for (key, value) in map {
            self.walk(value, key, Some(type_name));
        }
    }

    fn process_element_list(&mut self, elements: Vec<&Value>, path_segment: &str, parent_type: Option<&str>) {
        let first_map = elements.first().and_then(|v| v.as_object());

        // A "rows"-style element may be a relation-row wrapper carrying
        // exactly one nested entity-shaped field plus relation-attribute
        // scalars (spec.md §8 scenario 2's `{ "disease": {...}, "score": 0.9
        // }` / bare `{ "disease": {...} }` shapes), rather than a genuine
        // entity. Checked ahead of `is_candidate_entity` so a
        // human-meaningful sibling scalar (`score`) never promotes the
        // wrapper itself to entity status — the relationship attaches to
        // the nested field instead.
        if first_map.and_then(relation_row_field).is_some() {
            for element in elements {
                let Some(map) = element.as_object() else { continue };
                let Some(field_key) = relation_row_field(map) else {
                    self.walk(element, path_segment, parent_type);
                    continue;
                };
                let Some(Value::Object(nested)) = map.get(field_key) else { continue };
                let child_type = infer_type_name(nested, field_key, &mut self.synthetic_counter);
                if let Some(parent) = parent_type {
                    self.record_relationship(parent, &child_type, field_key);
                }
                self.fold_entity(&child_type, nested);
                self.recurse_entity_fields(&child_type, nested);
            }
            return;
        }

        let Some(first_map) = first_map.filter(|m| is_candidate_entity(m)) else {
            for element in elements {
                self.walk(element, path_segment, parent_type);
            }
            return;
        };

        // Mixed-entity arrays: the type is inferred once from the first
        // entity-shaped element and applied to every element in the array
        // (spec.md §9 Open Question (ii), first-wins resolution).
        let child_type = infer_type_name(first_map, path_segment, &mut self.synthetic_counter);

        if let Some(parent) = parent_type {
            self.record_relationship(parent, &child_type, path_segment);
        }

        for element in elements {
            if let Some(map) = element.as_object() {
                self.fold_entity(&child_type, map);
                self.recurse_entity_fields(&child_type, map);
            }
        }
    }

    fn walk(&mut self, value: &Value, path_segment: &str, parent_type: Option<&str>) {
        match value {
            Value::Array(arr) => {
                self.process_element_list(arr.iter().collect(), path_segment, parent_type);
            }
            Value::Object(map) => {
                if let Some(elements) = unwrap_wrapper_elements(map) {
                    self.process_element_list(elements, path_segment, parent_type);
                    return;
                }
                if let Some(field_key) = relation_row_field(map) {
                    if let Some(Value::Object(nested)) = map.get(field_key) {
                        let child_type = infer_type_name(nested, field_key, &mut self.synthetic_counter);
                        if let Some(parent) = parent_type {
                            self.record_relationship(parent, &child_type, field_key);
                        }
                        self.fold_entity(&child_type, nested);
                        self.recurse_entity_fields(&child_type, nested);
                    }
                    return;
                }
                if is_candidate_entity(map) {
                    let type_name = infer_type_name(map, path_segment, &mut self.synthetic_counter);
                    self.fold_entity(&type_name, map);
                    self.recurse_entity_fields(&type_name, map);
                } else {
                    for (key, val) in map {
                        self.walk(val, key, parent_type);
                    }
                }
            }
            _ => {}
        }
    }
}

fn table_def_from_discovered(discovered: &DiscoveredType) -> TableDef {
    let columns = discovered
        .columns
        .iter()
        .map(|(name, column_type)| ColumnDef {
            name: name.clone(),
            column_type: *column_type,
        })
        .collect();
    TableDef {
        name: discovered.name.clone(),
        columns,
        id_column_type: discovered.id_column_type,
        id_is_caller_supplied: discovered.any_id_supplied,
    }
}

fn junctions_from_relationships(relationships: &[Relationship], known_types: &BTreeMap<String, DiscoveredType>) -> Vec<JunctionDef> {
    let mut seen = HashSet::new();
    let mut junctions = Vec::new();
    for rel in relationships {
        if rel.from_type == rel.to_type {
            continue;
        }
        if !known_types.contains_key(&rel.from_type) || !known_types.contains_key(&rel.to_type) {
            continue;
        }
        let def = JunctionDef::canonical(&rel.from_type, &rel.to_type);
        if seen.insert(def.name.clone()) {
            junctions.push(def);
        }
    }
    junctions
}

fn flatten_fallback_row(map: &serde_json::Map<String, Value>) -> Vec<(String, ColumnType, Value)> {
    let mut fields = Vec::new();
    for (key, value) in map {
        match classify_field(value) {
            FieldClass::Scalar(v) => fields.push((normalise_column(key), ColumnType::observe(v), v.clone())),
            FieldClass::FlattenedMap(sub) => {
                for (sub_key, sub_value) in sub {
                    if is_scalar_value(sub_value) {
                        fields.push((
                            normalise_column(&format!("{key}_{sub_key}")),
                            ColumnType::observe(sub_value),
                            sub_value.clone(),
                        ));
                    }
                }
            }
            FieldClass::NestedEntitySingleton(_) | FieldClass::EntityArray(_) | FieldClass::Complex(_) => {
                fields.push((normalise_column(&format!("{key}_json")), ColumnType::Text, value.clone()));
            }
        }
    }
    fields
}

/// Build the single-table fallback when phase 1 discovers no entities at
/// all (§4.5 "Fallback").
fn fallback_output(payload: &Value) -> InferenceOutput {
    let (name, columns) = match payload {
        Value::Array(items) => {
            let mut folded: BTreeMap<String, ColumnType> = BTreeMap::new();
            for item in items {
                let row = if let Value::Object(map) = item {
                    flatten_fallback_row(map)
                } else {
                    vec![("value".to_string(), ColumnType::observe(item), item.clone())]
                };
                for (col_name, col_type, _) in row {
                    folded
                        .entry(col_name)
                        .and_modify(|existing| *existing = existing.widen(col_type))
                        .or_insert(col_type);
                }
            }
            ("array_data".to_string(), folded)
        }
        Value::Object(map) => {
            let mut folded = BTreeMap::new();
            for (col_name, col_type, _) in flatten_fallback_row(map) {
                folded.insert(col_name, col_type);
            }
            ("root_object".to_string(), folded)
        }
        scalar => {
            let mut folded = BTreeMap::new();
            folded.insert("value".to_string(), ColumnType::observe(scalar));
            ("scalar_data".to_string(), folded)
        }
    };

    let table = TableDef {
        name,
        columns: columns
            .into_iter()
            .map(|(name, column_type)| ColumnDef { name, column_type })
            .collect(),
        id_column_type: ColumnType::Integer,
        id_is_caller_supplied: false,
    };

    InferenceOutput {
        tables: vec![table],
        junctions: Vec::new(),
        relationships: Vec::new(),
    }
}

/// Run the full C5 pipeline over `payload`: discover entities and
/// relationships, synthesise table and junction definitions, and fall back
/// to a single scalar/array/root-object table when no entities are found.
#[must_use]
pub fn infer(payload: &Value, sample_rows: usize) -> InferenceOutput {
    let mut discovery = Discovery::new(sample_rows);
    discovery.walk(payload, "", None);

    if discovery.types.is_empty() {
        return fallback_output(payload);
    }

    let tables = discovery.types.values().map(table_def_from_discovered).collect();
    let junctions = junctions_from_relationships(&discovery.relationships, &discovery.types);

    InferenceOutput {
        tables,
        junctions,
        relationships: discovery.relationships,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table<'a>(output: &'a InferenceOutput, name: &str) -> &'a TableDef {
        output.tables.iter().find(|t| t.name == name).unwrap_or_else(|| panic!("no table named {name}"))
    }

    #[test]
    fn single_entity_scenario() {
        let payload = json!({
            "target": { "id": "ENSG00000169083", "approvedSymbol": "AR", "biotype": "protein_coding" }
        });
        let output = infer(&payload, 3);
        assert_eq!(output.tables.len(), 1);
        let target = table(&output, "target");
        assert!(target.id_is_caller_supplied);
        assert_eq!(target.id_column_type, ColumnType::Text);
        let col_names: Vec<_> = target.columns.iter().map(|c| c.name.as_str()).collect();
        assert!(col_names.contains(&"approved_symbol"));
        assert!(col_names.contains(&"biotype"));
    }

    #[test]
    fn one_to_many_scenario_produces_junction() {
        let payload = json!({
            "target": {
                "id": "T1",
                "approvedSymbol": "AR",
                "associatedDiseases": {
                    "rows": [
                        { "disease": { "id": "D1", "name": "a" }, "score": 0.9 },
                        { "disease": { "id": "D2", "name": "b" }, "score": 0.7 }
                    ]
                }
            }
        });
        let output = infer(&payload, 3);
        assert!(output.tables.iter().any(|t| t.name == "target"));
        assert!(output.tables.iter().any(|t| t.name == "disease"));
        assert_eq!(output.junctions.len(), 1);
        assert_eq!(output.junctions[0].name, "disease_target");
    }

    #[test]
    fn widening_scenario() {
        let payload = json!({ "xs": [ { "v": 1 }, { "v": 1.5 }, { "v": "a" } ] });
        let output = infer(&payload, 3);
        let x = table(&output, "x");
        let v_col = x.columns.iter().find(|c| c.name == "v").unwrap();
        assert_eq!(v_col.column_type, ColumnType::Text);
    }

    #[test]
    fn boundary_null_payload_produces_scalar_data() {
        let output = infer(&Value::Null, 3);
        assert_eq!(output.tables.len(), 1);
        assert_eq!(output.tables[0].name, "scalar_data");
    }

    #[test]
    fn boundary_array_payload_produces_array_data_with_widened_value() {
        let output = infer(&json!([1, 2, "x"]), 3);
        assert_eq!(output.tables[0].name, "array_data");
        let value_col = &output.tables[0].columns[0];
        assert_eq!(value_col.name, "value");
        assert_eq!(value_col.column_type, ColumnType::Text);
    }

    #[test]
    fn boundary_empty_object_produces_root_object_with_no_columns() {
        let output = infer(&json!({}), 3);
        assert_eq!(output.tables[0].name, "root_object");
        assert!(output.tables[0].columns.is_empty());
    }

    #[test]
    fn self_relations_are_suppressed() {
        let payload = json!({
            "target": {
                "id": "T1",
                "name": "AR",
                "relatedTargets": { "rows": [ { "id": "T2", "name": "AR2" } ] }
            }
        });
        let output = infer(&payload, 3);
        assert!(output.junctions.is_empty());
    }

    #[test]
    fn explicit_typename_wins_over_path_segment() {
        let payload = json!({
            "things": [ { "__typename": "Target", "id": "T1", "name": "AR" } ]
        });
        let output = infer(&payload, 3);
        assert!(output.tables.iter().any(|t| t.name == "target"));
    }

    #[test]
    fn mixed_entity_arrays_use_first_wins_type() {
        let payload = json!({
            "items": [
                { "id": "1", "name": "a" },
                { "__typename": "Other", "id": "2", "name": "b" }
            ]
        });
        let output = infer(&payload, 3);
        // first-wins: both elements fold into the type inferred from the
        // first element ("item", singularised from the path segment).
        assert!(output.tables.iter().any(|t| t.name == "item"));
        assert!(!output.tables.iter().any(|t| t.name == "other"));
    }
}
