//! JSON-shaped response types for the six external operations (`spec.md`
//! §6 "External Interfaces"). These are the only types the enclosing
//! collaborator is expected to serialise and hand back to its own caller.

use serde::Serialize;
use serde_json::{Map, Value};

/// Response to `stage(payload)` (`spec.md` §6.1).
#[derive(Debug, Clone, Serialize)]
pub struct StageResponse {
    pub success: bool,
    pub message: String,
    pub schemas: Map<String, Value>,
    pub table_count: usize,
    pub total_rows: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

/// Per-table entry in [`StageResponse::schemas`].
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub columns: Vec<ColumnSummary>,
    pub row_count: i64,
    pub sample_data: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Lifted from a graph-query payload's page-info child when `hasNextPage`
/// is true (`spec.md` §6 "Pagination contract").
#[derive(Debug, Clone, Serialize)]
pub struct PaginationInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub current_count: i64,
    pub total_count: Option<i64>,
    pub end_cursor: Option<String>,
    pub start_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Response to `query(sql)` (`spec.md` §6.2) on success.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub results: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub column_names: Vec<String>,
    pub query_type: String,
    pub chunked_content_resolved: bool,
}

/// Response to `query(sql)` on rejection or execution failure.
#[derive(Debug, Clone, Serialize)]
pub struct QueryFailure {
    pub success: bool,
    pub error: String,
    pub query: String,
}

/// Response to `introspect()` (`spec.md` §6.3).
#[derive(Debug, Clone, Serialize)]
pub struct IntrospectResponse {
    pub success: bool,
    pub schema_info: SchemaInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaInfo {
    pub database_summary: DatabaseSummary,
    pub tables: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSummary {
    pub total_tables: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyHint>,
    pub indexes: Vec<IndexInfo>,
    pub sample_data: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyHint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyHint {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
}

/// Response to `table_columns(name)` (`spec.md` §6.4).
#[derive(Debug, Clone, Serialize)]
pub struct TableColumnsResponse {
    pub success: bool,
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}
