//! `StagingService`: the facade implementing the six external operations
//! (`spec.md` §6) over one compartment connection.

use std::collections::HashSet;

use serde_json::{Map, Value};
use stage_chunks::ChunkStore;
use stage_config::ChunkingConfig;
use stage_schema::{ParsedDescriptor, infer};

use crate::error::DbError;
use crate::response::{
    ColumnSummary, DatabaseSummary, IntrospectResponse, PaginationInfo, QueryFailure, QueryResponse, SchemaInfo, SchemaSummary,
    StageResponse, TableColumnsResponse,
};
use crate::{ddl, gate, insert, introspect, reconstitute};

/// Everything one staging compartment needs to serve `spec.md` §6's six
/// operations. Owns the connection exclusively for the duration of any one
/// call — `spec.md` §5's single-writer, serialized-execution model.
pub struct StagingService {
    conn: libsql::Connection,
    chunk_store: ChunkStore,
    chunking_config: ChunkingConfig,
    descriptor: Option<ParsedDescriptor>,
}

impl StagingService {
    /// Open a compartment over `conn`, creating the chunk store's system
    /// tables if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the chunk store's own `CREATE TABLE` fails.
    pub async fn new(conn: libsql::Connection, chunking_config: ChunkingConfig, descriptor: Option<ParsedDescriptor>) -> Result<Self, DbError> {
        let chunk_store = ChunkStore::new(conn.clone(), chunking_config.clone()).await?;
        Ok(Self {
            conn,
            chunk_store,
            chunking_config,
            descriptor,
        })
    }

    /// `stage(payload)` (`spec.md` §6.1): infer schema, create tables,
    /// insert rows, summarise the result.
    ///
    /// # Errors
    ///
    /// Never returns `Err` — staging failures are caught and reported as
    /// `StageResponse { success: false, .. }` per `spec.md` §7. The `Result`
    /// wrapper exists only for the unexpected case where even building the
    /// failure response itself cannot proceed (JSON serialisation of the
    /// payload's own top-level shape).
    pub async fn stage(&self, payload: &Value) -> Result<StageResponse, DbError> {
        let unwrapped = unwrap_top_level_data(payload);
        let pagination = extract_pagination(unwrapped);

        let inference = infer(unwrapped, self.chunking_config.sample_rows);

        let downgraded: HashSet<String> = match ddl::create_tables(&self.conn, &inference.tables, &inference.junctions).await {
            Ok(d) => d.into_iter().collect(),
            Err(err) => {
                return Ok(StageResponse {
                    success: false,
                    message: format!("staging failed: {err}"),
                    schemas: Map::new(),
                    table_count: 0,
                    total_rows: 0,
                    pagination: None,
                });
            }
        };

        let insert_output = match insert::insert_payload(
            &self.conn,
            &self.chunk_store,
            &self.chunking_config,
            self.descriptor.as_ref(),
            &downgraded,
            unwrapped,
        )
        .await
        {
            Ok(output) => output,
            Err(err) => {
                return Ok(StageResponse {
                    success: false,
                    message: format!("staging failed: {err}"),
                    schemas: Map::new(),
                    table_count: 0,
                    total_rows: 0,
                    pagination: None,
                });
            }
        };

        let mut table_names: Vec<String> = inference.tables.iter().map(|t| t.name.clone()).collect();
        table_names.extend(inference.junctions.iter().map(|j| j.name.clone()));

        let mut schemas = Map::new();
        let mut total_rows = 0i64;
        for name in &table_names {
            let summary = self.schema_summary(name).await.unwrap_or_else(|err| {
                tracing::warn!(table = %name, error = %err, "failed to summarise table after insertion");
                SchemaSummary {
                    columns: Vec::new(),
                    row_count: 0,
                    sample_data: Vec::new(),
                }
            });
            total_rows += summary.row_count;
            schemas.insert(name.clone(), serde_json::to_value(summary).unwrap_or(Value::Null));
        }

        let message = format!(
            "staged {} table(s), {} junction row set(s)",
            insert_output.table_row_attempts.len(),
            insert_output.junction_row_counts.len()
        );

        Ok(StageResponse {
            success: true,
            message,
            schemas,
            table_count: table_names.len(),
            total_rows,
            pagination,
        })
    }

    async fn schema_summary(&self, table: &str) -> Result<SchemaSummary, DbError> {
        let columns = introspect::columns_for_table(&self.conn, table)
            .await?
            .into_iter()
            .map(|c| ColumnSummary {
                name: c.name,
                data_type: c.data_type,
            })
            .collect();
        let row_count = introspect::row_count(&self.conn, table).await?;
        let sample_data = introspect::sample_rows(&self.conn, table, self.chunking_config.sample_rows).await?;
        Ok(SchemaSummary { columns, row_count, sample_data })
    }

    /// `query(sql)` (`spec.md` §6.2): validate, execute, reconstitute chunk
    /// references in the result rows.
    pub async fn query(&self, sql: &str) -> Result<Result<QueryResponse, QueryFailure>, DbError> {
        let query_type = match gate::validate(sql) {
            Ok(t) => t,
            Err(err) => {
                return Ok(Err(QueryFailure {
                    success: false,
                    error: err.to_string(),
                    query: sql.to_string(),
                }));
            }
        };

        let (column_names, mut rows) = match gate::execute_query(&self.conn, sql).await {
            Ok(r) => r,
            Err(err) => {
                return Ok(Err(QueryFailure {
                    success: false,
                    error: err.to_string(),
                    query: sql.to_string(),
                }));
            }
        };

        let chunked_content_resolved = reconstitute::reconstitute_rows(&self.chunk_store, &mut rows).await?;

        Ok(Ok(QueryResponse {
            success: true,
            row_count: rows.len(),
            results: rows,
            column_names,
            query_type: query_type.as_str().to_string(),
            chunked_content_resolved,
        }))
    }

    /// `introspect()` (`spec.md` §6.3).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] only if enumerating `sqlite_master` itself fails.
    pub async fn introspect(&self) -> Result<IntrospectResponse, DbError> {
        let tables = introspect::introspect_database(&self.conn, self.chunking_config.sample_rows).await?;
        let total_tables = tables.len();

        let mut table_map = Map::new();
        for table in tables {
            let name = table.name.clone();
            table_map.insert(name, serde_json::to_value(table).unwrap_or(Value::Null));
        }

        Ok(IntrospectResponse {
            success: true,
            schema_info: SchemaInfo {
                database_summary: DatabaseSummary { total_tables },
                tables: table_map,
            },
        })
    }

    /// `table_columns(name)` (`spec.md` §6.4).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LibSql`] if `table` does not exist.
    pub async fn table_columns(&self, table: &str) -> Result<TableColumnsResponse, DbError> {
        let columns = introspect::columns_for_table(&self.conn, table).await?;
        Ok(TableColumnsResponse {
            success: true,
            table: table.to_string(),
            columns,
        })
    }

    /// `chunking_stats()` (`spec.md` §6.5).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if either aggregate query against the chunk
    /// store's system tables fails.
    pub async fn chunking_stats(&self) -> Result<stage_chunks::ChunkingStats, DbError> {
        Ok(stage_chunks::stats::compute(&self.conn).await?)
    }

    /// `delete_all()` (`spec.md` §6.6): tear down every user and system
    /// table/view in the compartment.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LibSql`] if enumerating or dropping an object
    /// fails.
    pub async fn delete_all(&self) -> Result<(), DbError> {
        let mut rows = self
            .conn
            .query("SELECT type, name FROM sqlite_master WHERE type IN ('view', 'table')", ())
            .await?;
        let mut views = Vec::new();
        let mut tables = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind: String = row.get(0)?;
            let name: String = row.get(1)?;
            if kind == "view" {
                views.push(name);
            } else {
                tables.push(name);
            }
        }

        for view in views {
            self.conn.execute_batch(&format!("DROP VIEW IF EXISTS {view}")).await?;
        }
        for table in tables {
            self.conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}")).await?;
        }

        Ok(())
    }
}

/// If the payload's only top-level key is `data`, unwrap it once
/// (`spec.md` §6.1 "If the payload embeds a single top-level `data` key").
fn unwrap_top_level_data(payload: &Value) -> &Value {
    if let Value::Object(map) = payload
        && map.len() == 1
        && let Some(inner) = map.get("data")
    {
        return inner;
    }
    payload
}

/// Depth-first search for the first `pageInfo` object anywhere in the
/// payload, lifting its fields into a [`PaginationInfo`] when
/// `hasNextPage` is `true` (`spec.md` §6 "Pagination contract").
fn extract_pagination(value: &Value) -> Option<PaginationInfo> {
    let page_info = find_page_info(value)?;
    let has_next_page = page_info.get("hasNextPage").and_then(Value::as_bool).unwrap_or(false);
    if !has_next_page {
        return None;
    }
    Some(PaginationInfo {
        has_next_page,
        has_previous_page: page_info.get("hasPreviousPage").and_then(Value::as_bool).unwrap_or(false),
        current_count: page_info.get("currentCount").and_then(Value::as_i64).unwrap_or(0),
        total_count: page_info.get("totalCount").and_then(Value::as_i64),
        end_cursor: page_info.get("endCursor").and_then(Value::as_str).map(str::to_string),
        start_cursor: page_info.get("startCursor").and_then(Value::as_str).map(str::to_string),
        suggestion: page_info.get("suggestion").and_then(Value::as_str).map(str::to_string),
    })
}

fn find_page_info(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(page_info)) = map.get("pageInfo") {
                return Some(page_info);
            }
            map.values().find_map(find_page_info)
        }
        Value::Array(items) => items.iter().find_map(find_page_info),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn service() -> StagingService {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        StagingService::new(conn, ChunkingConfig::default(), None).await.unwrap()
    }

    #[tokio::test]
    async fn stages_single_entity_payload_with_top_level_data_unwrap() {
        let svc = service().await;
        let payload = json!({
            "data": {
                "target": { "id": "ENSG00000169083", "approvedSymbol": "AR", "biotype": "protein_coding" }
            }
        });
        let response = svc.stage(&payload).await.unwrap();
        assert!(response.success);
        assert_eq!(response.table_count, 1);
        assert_eq!(response.total_rows, 1);
        assert!(response.schemas.contains_key("target"));
    }

    #[tokio::test]
    async fn query_rejects_disallowed_statement() {
        let svc = service().await;
        let outcome = svc.query("DROP TABLE foo").await.unwrap();
        let failure = outcome.unwrap_err();
        assert!(!failure.success);
        assert!(failure.error.to_ascii_uppercase().contains("NOT ALLOWED") || failure.error.len() > 0);
    }

    #[tokio::test]
    async fn query_returns_staged_rows() {
        let svc = service().await;
        let payload = json!({ "target": { "id": "T1", "approvedSymbol": "AR" } });
        svc.stage(&payload).await.unwrap();

        let outcome = svc.query("SELECT approved_symbol FROM target").await.unwrap();
        let response = outcome.unwrap();
        assert_eq!(response.row_count, 1);
        assert_eq!(response.results[0]["approved_symbol"], json!("AR"));
    }

    #[tokio::test]
    async fn introspect_lists_staged_tables() {
        let svc = service().await;
        let payload = json!({
            "target": {
                "id": "T1",
                "approvedSymbol": "AR",
                "associatedDiseases": { "rows": [ { "disease": { "id": "D1", "name": "a" } } ] }
            }
        });
        svc.stage(&payload).await.unwrap();

        let response = svc.introspect().await.unwrap();
        assert!(response.schema_info.tables.contains_key("target"));
        assert!(response.schema_info.tables.contains_key("disease"));
        assert!(response.schema_info.tables.contains_key("disease_target"));
    }

    #[tokio::test]
    async fn pagination_is_lifted_when_has_next_page_true() {
        let svc = service().await;
        let payload = json!({
            "targets": {
                "rows": [ { "id": "T1", "name": "AR" } ],
                "pageInfo": {
                    "hasNextPage": true,
                    "hasPreviousPage": false,
                    "endCursor": "abc",
                    "totalCount": 100
                }
            }
        });
        let response = svc.stage(&payload).await.unwrap();
        let pagination = response.pagination.expect("pagination should be present");
        assert!(pagination.has_next_page);
        assert_eq!(pagination.total_count, Some(100));
    }

    #[tokio::test]
    async fn pagination_is_omitted_when_has_next_page_false() {
        let svc = service().await;
        let payload = json!({
            "targets": {
                "rows": [ { "id": "T1", "name": "AR" } ],
                "pageInfo": { "hasNextPage": false }
            }
        });
        let response = svc.stage(&payload).await.unwrap();
        assert!(response.pagination.is_none());
    }

    #[tokio::test]
    async fn delete_all_removes_staged_tables() {
        let svc = service().await;
        let payload = json!({ "target": { "id": "T1", "approvedSymbol": "AR" } });
        svc.stage(&payload).await.unwrap();
        svc.delete_all().await.unwrap();

        let response = svc.introspect().await.unwrap();
        assert_eq!(response.schema_info.database_summary.total_tables, 0);
    }
}
