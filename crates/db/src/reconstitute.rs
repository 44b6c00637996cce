//! Chunk-reference reconstitution over query result rows (C7, `spec.md`
//! §4.7 "Reconstitution", §9 "Chunk-reference detection in results").
//!
//! Only text cells are inspected; numeric/NULL cells are never mistaken for
//! a chunk reference. A resolved value is never re-scanned for a nested
//! reference even if the reconstituted text happens to start with the same
//! prefix — the chunk store's own content is opaque past this point.

use serde_json::{Map, Value};
use stage_chunks::ChunkStore;
use stage_core::token::{error_sentinel, not_found_sentinel, parse_token};

use crate::error::DbError;

/// Walk every cell of every row, replacing chunk-reference tokens with
/// their reconstituted value. Returns whether any cell was rewritten.
///
/// # Errors
///
/// Only returns an error if the chunk store itself cannot be reached for a
/// reason other than a missing or corrupt chunk set — those are absorbed
/// into sentinel strings per `spec.md` §7, not propagated.
pub async fn reconstitute_rows(chunk_store: &ChunkStore, rows: &mut [Map<String, Value>]) -> Result<bool, DbError> {
    let mut any_resolved = false;
    for row in rows.iter_mut() {
        for value in row.values_mut() {
            if let Value::String(text) = value
                && let Some(content_id) = parse_token(text)
            {
                *value = resolve_one(chunk_store, content_id).await;
                any_resolved = true;
            }
        }
    }
    Ok(any_resolved)
}

async fn resolve_one(chunk_store: &ChunkStore, content_id: &str) -> Value {
    match chunk_store.retrieve(content_id).await {
        Ok(Some(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Ok(None) => Value::String(not_found_sentinel(content_id)),
        Err(err) => Value::String(error_sentinel(&err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stage_chunks::ContentType;
    use stage_config::ChunkingConfig;

    async fn in_memory_store() -> ChunkStore {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        ChunkStore::new(conn, ChunkingConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn resolves_json_content_and_marks_resolved() {
        let store = in_memory_store().await;
        let token = store.store(r#"{"a":1}"#, ContentType::Json).await.unwrap();

        let mut rows = vec![Map::from_iter([("description".to_string(), Value::String(token))])];
        let resolved = reconstitute_rows(&store, &mut rows).await.unwrap();

        assert!(resolved);
        assert_eq!(rows[0]["description"], json!({"a": 1}));
    }

    #[tokio::test]
    async fn falls_back_to_raw_string_for_non_json_content() {
        let store = in_memory_store().await;
        let token = store.store("plain text, not json", ContentType::Text).await.unwrap();

        let mut rows = vec![Map::from_iter([("body".to_string(), Value::String(token))])];
        reconstitute_rows(&store, &mut rows).await.unwrap();

        assert_eq!(rows[0]["body"], json!("plain text, not json"));
    }

    #[tokio::test]
    async fn leaves_non_token_text_and_numeric_cells_untouched() {
        let store = in_memory_store().await;
        let mut rows = vec![Map::from_iter([
            ("name".to_string(), Value::String("AR".to_string())),
            ("count".to_string(), json!(5)),
            ("nothing".to_string(), Value::Null),
        ])];
        let resolved = reconstitute_rows(&store, &mut rows).await.unwrap();
        assert!(!resolved);
        assert_eq!(rows[0]["name"], json!("AR"));
    }

    #[tokio::test]
    async fn missing_content_id_yields_sentinel() {
        let store = in_memory_store().await;
        let mut rows = vec![Map::from_iter([(
            "description".to_string(),
            Value::String("__CHUNKED__:chunk_doesnotexist".to_string()),
        )])];
        reconstitute_rows(&store, &mut rows).await.unwrap();
        assert_eq!(rows[0]["description"], json!("[CHUNKED_CONTENT_NOT_FOUND:chunk_doesnotexist]"));
    }
}
