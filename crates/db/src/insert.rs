//! Data insertion engine (C6, `spec.md` §4.6).
//!
//! Replays the same depth-first traversal the schema inference engine (C5,
//! `stage_schema::infer::Discovery`) uses, this time performing the actual
//! `INSERT OR IGNORE` statements: entities first (phase A), then junction
//! rows for every relation that produced at least one pair (phase B).
//!
//! Identity within a single staging run is by *payload object identity*
//! (`spec.md` §3 invariant 5, §9 "Identity by object identity"): each
//! `serde_json::Map` node's address is stable for the lifetime of this
//! traversal, so the identity memo is keyed on `(type_name, address)` rather
//! than on value equality — see `DESIGN.md`.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use stage_chunks::{ChunkStore, ContentType, MaybeChunked, effective_policy};
use stage_config::ChunkingConfig;
use stage_core::ident::normalise_column;
use stage_schema::{
    FieldClass, JunctionDef, ParsedDescriptor, classify_field, infer_type_name, is_candidate_entity, is_identifier_key,
    relation_row_field, supplied_identifier, supplied_identifier_key,
};

use crate::error::DbError;
use crate::helpers::json_scalar_to_sql;

fn is_scalar_value(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

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

/// A row's surrogate identifier: either a caller-supplied value (which may
/// be text, e.g. an Ensembl id) or an autoincremented integer (§3 "Table").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowId {
    Integer(i64),
    Text(String),
}

impl RowId {
    fn from_supplied(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_i64().map_or_else(|| Self::Text(value.to_string()), Self::Integer),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    fn to_sql(&self) -> libsql::Value {
        match self {
            Self::Integer(i) => libsql::Value::Integer(*i),
            Self::Text(s) => libsql::Value::Text(s.clone()),
        }
    }
}

/// Outcome of a full phase A + phase B insertion run.
#[derive(Debug, Clone, Default)]
pub struct InsertOutput {
    pub table_row_attempts: BTreeMap<String, i64>,
    pub junction_row_counts: BTreeMap<String, i64>,
}

struct Inserter<'a> {
    conn: &'a libsql::Connection,
    chunk_store: &'a ChunkStore,
    chunking_config: &'a ChunkingConfig,
    descriptor: Option<&'a ParsedDescriptor>,
    downgraded_tables: &'a HashSet<String>,
    memo: HashMap<(String, usize), RowId>,
    junction_defs: HashMap<String, JunctionDef>,
    junction_pairs: HashMap<String, HashSet<(RowId, RowId)>>,
    table_row_attempts: BTreeMap<String, i64>,
    synthetic_counter: usize,
}

impl<'a> Inserter<'a> {
    async fn chunk_complex_value(&self, type_name: &str, field_name: &str, value: &Value) -> Result<String, DbError> {
        let text = serde_json::to_string(value)?;
        let rule = self.descriptor.and_then(|d| d.chunk_rule_for(type_name, field_name));
        let policy = effective_policy(is_identifier_key(field_name), rule, self.chunking_config.chunk_threshold_bytes);
        let stored = self.chunk_store.maybe_chunk(&text, ContentType::Json, policy).await?;
        Ok(match stored {
            MaybeChunked::Literal(s) | MaybeChunked::Token(s) => s,
        })
    }

    /// Build the row's non-relational columns (everything except
    /// array-of-entity fields, which become junction rows instead).
    ///
    /// Nested singleton entities are inserted eagerly here, before this
    /// row's own `INSERT`, so the foreign-key column holds the nested row's
    /// *real* assigned id (supplied or autoincremented) rather than only a
    /// caller-supplied value.
    async fn build_row_columns(
        &mut self,
        type_name: &str,
        map: &serde_json::Map<String, Value>,
        skip_key: Option<&str>,
    ) -> Result<Vec<(String, libsql::Value)>, DbError> {
        let mut columns = Vec::new();
        for (key, value) in map {
            if Some(key.as_str()) == skip_key {
                continue;
            }
            match classify_field(value) {
                FieldClass::Scalar(v) => columns.push((normalise_column(key), json_scalar_to_sql(v))),
                FieldClass::NestedEntitySingleton(nested) => {
                    let nested_type = infer_type_name(nested, key, &mut self.synthetic_counter);
                    let nested_id = Box::pin(self.insert_entity(&nested_type, nested)).await?;
                    columns.push((normalise_column(&format!("{key}_id")), nested_id.to_sql()));
                }
                FieldClass::EntityArray(_) => {
                    // Handled after this row is inserted, once we know its own id.
                }
                FieldClass::FlattenedMap(sub) => {
                    for (sub_key, sub_value) in sub {
                        if is_scalar_value(sub_value) {
                            columns.push((normalise_column(&format!("{key}_{sub_key}")), json_scalar_to_sql(sub_value)));
                        }
                    }
                }
                FieldClass::Complex(v) => {
                    let text = self.chunk_complex_value(type_name, key, v).await?;
                    columns.push((normalise_column(&format!("{key}_json")), libsql::Value::Text(text)));
                }
            }
        }
        Ok(columns)
    }

    async fn insert_entity(&mut self, type_name: &str, map: &serde_json::Map<String, Value>) -> Result<RowId, DbError> {
        let addr = std::ptr::from_ref(map) as usize;
        let memo_key = (type_name.to_string(), addr);
        if let Some(existing) = self.memo.get(&memo_key) {
            return Ok(existing.clone());
        }

        let supplied_id = supplied_identifier(map).cloned();
        let downgraded = self.downgraded_tables.contains(type_name);

        let mut columns = if downgraded {
            let payload_json = serde_json::to_string(&Value::Object(map.clone()))?;
            vec![("data_json".to_string(), libsql::Value::Text(payload_json))]
        } else {
            let skip_key = supplied_identifier_key(map).map(ToString::to_string);
            self.build_row_columns(type_name, map, skip_key.as_deref()).await?
        };

        if let Some(id_value) = &supplied_id {
            columns.push(("id".to_string(), RowId::from_supplied(id_value).to_sql()));
        }

        let sql = if columns.is_empty() {
            format!("INSERT OR IGNORE INTO {type_name} DEFAULT VALUES")
        } else {
            let column_list = columns.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", ");
            let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            format!("INSERT OR IGNORE INTO {type_name} ({column_list}) VALUES ({placeholders})")
        };
        let params: Vec<libsql::Value> = columns.into_iter().map(|(_, v)| v).collect();

        self.conn
            .execute(&sql, params)
            .await
            .map_err(|e| DbError::StagingFailure(format!("insert into {type_name}: {e}")))?;

        *self.table_row_attempts.entry(type_name.to_string()).or_insert(0) += 1;

        let row_id = match supplied_id {
            Some(id_value) => RowId::from_supplied(&id_value),
            None => RowId::Integer(self.conn.last_insert_rowid()),
        };
        self.memo.insert(memo_key, row_id.clone());

        // Generic recursion: revisit every field one level deeper, exactly as
        // the inference engine's `recurse_entity_fields` does, to discover
        // further nested entities and to materialise array-of-entity fields
        // into junction pairs now that this row's own id is known. Already
        // inserted nested singletons are no-ops here thanks to the memo.
        for (key, value) in map {
            if let Err(err) = Box::pin(self.walk(value, key, Some((type_name, &row_id)))).await {
                tracing::warn!(r#type = type_name, field = key, error = %err, "row insertion failed, skipping");
            }
        }

        Ok(row_id)
    }

    async fn walk(&mut self, value: &Value, path_segment: &str, parent: Option<(&str, &RowId)>) -> Result<(), DbError> {
        match value {
            Value::Array(arr) => {
                let parent = parent.map(|(t, id)| (t.to_string(), id.clone()));
                self.process_element_list(arr.iter().collect(), path_segment, parent.as_ref().map(|(t, i)| (t.as_str(), i)))
                    .await
            }
            Value::Object(map) => {
                if let Some(elements) = unwrap_wrapper_elements(map) {
                    let parent = parent.map(|(t, id)| (t.to_string(), id.clone()));
                    return self
                        .process_element_list(elements, path_segment, parent.as_ref().map(|(t, i)| (t.as_str(), i)))
                        .await;
                }
                if let Some(field_key) = relation_row_field(map) {
                    let Some(Value::Object(nested)) = map.get(field_key) else { return Ok(()) };
                    let child_type = infer_type_name(nested, field_key, &mut self.synthetic_counter);
                    let child_id = Box::pin(self.insert_entity(&child_type, nested)).await?;
                    if let Some((parent_type, parent_id)) = parent
                        && parent_type != child_type
                    {
                        let def = self
                            .junction_defs
                            .entry(JunctionDef::canonical(parent_type, &child_type).name.clone())
                            .or_insert_with(|| JunctionDef::canonical(parent_type, &child_type))
                            .clone();
                        let pair = if def.left_type == parent_type {
                            (parent_id.clone(), child_id)
                        } else {
                            (child_id, parent_id.clone())
                        };
                        self.junction_pairs.entry(def.name.clone()).or_default().insert(pair);
                    }
                    return Ok(());
                }
                if is_candidate_entity(map) {
                    let type_name = infer_type_name(map, path_segment, &mut self.synthetic_counter);
                    Box::pin(self.insert_entity(&type_name, map)).await?;
                    Ok(())
                } else {
                    for (key, val) in map {
                        if let Err(err) = Box::pin(self.walk(val, key, parent)).await {
                            tracing::warn!(field = key, error = %err, "nested insertion failed, skipping");
                        }
                    }
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    async fn process_element_list(
        &mut self,
        elements: Vec<&Value>,
        path_segment: &str,
        parent: Option<(&str, &RowId)>,
    ) -> Result<(), DbError> {
        let first_map = elements.first().and_then(|v| v.as_object());

        // A "rows"-style element may be a relation-row wrapper carrying
        // exactly one nested entity-shaped field plus relation-attribute
        // scalars (spec.md §8 scenario 2's `{ "disease": {...}, "score": 0.9
        // }` / bare `{ "disease": {...} }` shapes), rather than a genuine
        // entity. Checked ahead of `is_candidate_entity` so a
        // human-meaningful sibling scalar (`score`) never promotes the
        // wrapper itself to entity status — the relationship attaches to
        // the nested field instead. Mirrors `stage_schema::infer::Discovery`.
        if first_map.and_then(relation_row_field).is_some() {
            for element in elements {
                let Some(map) = element.as_object() else { continue };
                let Some(field_key) = relation_row_field(map) else {
                    if let Err(err) = Box::pin(self.walk(element, path_segment, parent)).await {
                        tracing::warn!(error = %err, "array element insertion failed, skipping");
                    }
                    continue;
                };
                let Some(Value::Object(nested)) = map.get(field_key) else { continue };
                let child_type = infer_type_name(nested, field_key, &mut self.synthetic_counter);
                let child_id = match Box::pin(self.insert_entity(&child_type, nested)).await {
                    Ok(id) => id,
                    Err(err) => {
                        tracing::warn!(r#type = %child_type, error = %err, "relation-row child insertion failed, skipping");
                        continue;
                    }
                };

                if let Some((parent_type, parent_id)) = parent
                    && parent_type != child_type
                {
                    let def = self
                        .junction_defs
                        .entry(JunctionDef::canonical(parent_type, &child_type).name.clone())
                        .or_insert_with(|| JunctionDef::canonical(parent_type, &child_type))
                        .clone();
                    let pair = if def.left_type == parent_type {
                        (parent_id.clone(), child_id)
                    } else {
                        (child_id, parent_id.clone())
                    };
                    self.junction_pairs.entry(def.name.clone()).or_default().insert(pair);
                }
            }
            return Ok(());
        }

        let first_entity_map = first_map.filter(|m| is_candidate_entity(m));

        let Some(first_map) = first_entity_map else {
            for element in elements {
                if let Err(err) = Box::pin(self.walk(element, path_segment, parent)).await {
                    tracing::warn!(error = %err, "array element insertion failed, skipping");
                }
            }
            return Ok(());
        };

        let child_type = infer_type_name(first_map, path_segment, &mut self.synthetic_counter);

        for element in elements {
            let Some(map) = element.as_object() else { continue };
            let child_id = match Box::pin(self.insert_entity(&child_type, map)).await {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(r#type = %child_type, error = %err, "child entity insertion failed, skipping");
                    continue;
                }
            };

            if let Some((parent_type, parent_id)) = parent
                && parent_type != child_type
            {
                let def = self
                    .junction_defs
                    .entry(JunctionDef::canonical(parent_type, &child_type).name.clone())
                    .or_insert_with(|| JunctionDef::canonical(parent_type, &child_type))
                    .clone();
                let pair = if def.left_type == parent_type {
                    (parent_id.clone(), child_id)
                } else {
                    (child_id, parent_id.clone())
                };
                self.junction_pairs.entry(def.name.clone()).or_default().insert(pair);
            }
        }

        Ok(())
    }
}

/// Run the full C6 pipeline: walk `payload` materialising entity rows
/// (phase A), then insert every collected junction pair (phase B).
///
/// `downgraded_tables` names tables whose DDL fell back to the minimal
/// `(id, data_json)` shape (`spec.md` §7) — rows for those types are
/// inserted as a single `data_json` blob instead of their inferred columns.
///
/// # Errors
///
/// Returns [`DbError`] only for failures that abort the whole run (a chunk
/// store failure, or a JSON serialisation failure on a row that has no
/// sensible degraded form). Per-row and per-field failures are logged and
/// skipped, not propagated (`spec.md` §7).
pub async fn insert_payload(
    conn: &libsql::Connection,
    chunk_store: &ChunkStore,
    chunking_config: &ChunkingConfig,
    descriptor: Option<&ParsedDescriptor>,
    downgraded_tables: &HashSet<String>,
    payload: &Value,
) -> Result<InsertOutput, DbError> {
    let mut inserter = Inserter {
        conn,
        chunk_store,
        chunking_config,
        descriptor,
        downgraded_tables,
        memo: HashMap::new(),
        junction_defs: HashMap::new(),
        junction_pairs: HashMap::new(),
        table_row_attempts: BTreeMap::new(),
        synthetic_counter: 0,
    };

    inserter.walk(payload, "", None).await?;

    let mut junction_row_counts = BTreeMap::new();
    for (name, pairs) in &inserter.junction_pairs {
        let Some(def) = inserter.junction_defs.get(name) else { continue };
        if pairs.is_empty() {
            continue;
        }
        let mut inserted = 0i64;
        for (left, right) in pairs {
            let sql = format!(
                "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2)",
                def.name, def.left_column, def.right_column
            );
            match conn.execute(&sql, libsql::params![left.to_sql(), right.to_sql()]).await {
                Ok(_) => inserted += 1,
                Err(err) => tracing::warn!(junction = %def.name, error = %err, "junction row insertion failed, skipping"),
            }
        }
        junction_row_counts.insert(name.clone(), inserted);
    }

    Ok(InsertOutput {
        table_row_attempts: inserter.table_row_attempts,
        junction_row_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stage_config::ChunkingConfig;
    use stage_schema::infer;

    async fn setup(payload: &Value) -> (libsql::Connection, ChunkStore) {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        let output = infer(payload, 3);
        crate::ddl::create_tables(&conn, &output.tables, &output.junctions).await.unwrap();
        let chunk_store = ChunkStore::new(conn.clone(), ChunkingConfig::default()).await.unwrap();
        (conn, chunk_store)
    }

    #[tokio::test]
    async fn inserts_single_entity() {
        let payload = json!({
            "target": { "id": "ENSG00000169083", "approvedSymbol": "AR", "biotype": "protein_coding" }
        });
        let (conn, store) = setup(&payload).await;
        let config = ChunkingConfig::default();
        insert_payload(&conn, &store, &config, None, &HashSet::new(), &payload).await.unwrap();

        let mut rows = conn.query("SELECT approved_symbol FROM target", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "AR");
    }

    #[tokio::test]
    async fn inserts_one_to_many_with_junction_rows() {
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
        let (conn, store) = setup(&payload).await;
        let config = ChunkingConfig::default();
        let output = insert_payload(&conn, &store, &config, None, &HashSet::new(), &payload).await.unwrap();

        assert_eq!(output.junction_row_counts.get("disease_target"), Some(&2));

        let mut rows = conn.query("SELECT COUNT(*) FROM disease_target", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 2);

        let mut rows = conn.query("SELECT COUNT(*) FROM disease", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn reinserting_same_object_reuses_surrogate_id() {
        let disease = json!({ "id": "D1", "name": "shared" });
        let payload = json!({
            "target": {
                "id": "T1",
                "name": "AR",
                "diseases": { "rows": [ { "disease": disease.clone() } ] },
                "otherDiseases": { "rows": [ { "disease": disease } ] }
            }
        });
        let (conn, store) = setup(&payload).await;
        let config = ChunkingConfig::default();
        insert_payload(&conn, &store, &config, None, &HashSet::new(), &payload).await.unwrap();

        let mut rows = conn.query("SELECT COUNT(*) FROM disease", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test]
    async fn nested_singleton_without_supplied_id_gets_real_autoincrement_fk() {
        let payload = json!({
            "target": {
                "id": "T1",
                "name": "AR",
                "mostSevere": { "label": "missense_variant", "rank": 3 }
            }
        });
        let (conn, store) = setup(&payload).await;
        let config = ChunkingConfig::default();
        insert_payload(&conn, &store, &config, None, &HashSet::new(), &payload).await.unwrap();

        let mut rows = conn.query("SELECT most_severe_id FROM target", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test]
    async fn oversized_field_is_chunked_and_reads_back_token() {
        let big = "x".repeat(40 * 1024);
        let payload = json!({
            "target": { "id": "T1", "name": "AR", "tags": ["a", "b", big.clone()] }
        });
        let (conn, store) = setup(&payload).await;
        let config = ChunkingConfig::default();
        insert_payload(&conn, &store, &config, None, &HashSet::new(), &payload).await.unwrap();

        let mut rows = conn.query("SELECT tags_json FROM target", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let stored = row.get::<String>(0).unwrap();
        assert!(stored.starts_with("__CHUNKED__:"));
    }
}
