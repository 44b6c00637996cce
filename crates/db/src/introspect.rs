//! Metadata introspector (C8, `spec.md` §4.8): best-effort summary of every
//! table/view in the compartment — storage kind, row count, column
//! metadata, foreign-key hints, indexes, and a handful of sample rows.
//!
//! Failure on any one table is isolated: the table is reported with its
//! available fields only, and the run continues (`spec.md` §4.8 "Every
//! result is best-effort").

use serde_json::{Map, Value};

use crate::error::DbError;
use crate::helpers::row_to_object;
use crate::response::{ColumnInfo, ForeignKeyHint, IndexInfo, TableInfo};

/// `_id`-suffixed columns are treated as hinting at a foreign key to the
/// entity type named by stripping the suffix (`spec.md` §4.8 "foreign-key
/// hints (where present)") — the engine never declares real `FOREIGN KEY`
/// constraints (§4.5), so this is inferred from naming convention alone.
fn foreign_key_hint(column_name: &str, known_tables: &[String]) -> Option<ForeignKeyHint> {
    let referenced = column_name.strip_suffix("_id")?;
    if referenced.is_empty() || !known_tables.iter().any(|t| t == referenced) {
        return None;
    }
    Some(ForeignKeyHint {
        column: column_name.to_string(),
        references_table: referenced.to_string(),
        references_column: "id".to_string(),
    })
}

async fn list_user_objects(conn: &libsql::Connection) -> Result<Vec<(String, String)>, DbError> {
    let mut rows = conn
        .query(
            "SELECT name, type FROM sqlite_master
             WHERE type IN ('table', 'view')
               AND name NOT LIKE 'sqlite_%'
               AND name NOT IN ('chunk_metadata', 'content_chunks')
             ORDER BY name",
            (),
        )
        .await?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push((row.get::<String>(0)?, row.get::<String>(1)?));
    }
    Ok(out)
}

async fn table_columns(conn: &libsql::Connection, table: &str, known_tables: &[String]) -> Result<Vec<ColumnInfo>, DbError> {
    let sql = format!("PRAGMA table_info({table})");
    let mut rows = conn.query(&sql, ()).await?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next().await? {
        let name: String = row.get(1)?;
        let declared_type: String = row.get(2)?;
        let not_null: i64 = row.get(3)?;
        let default_value: Option<String> = row.get(4).ok();
        let pk: i64 = row.get(5)?;
        columns.push(ColumnInfo {
            foreign_key: foreign_key_hint(&name, known_tables),
            name,
            data_type: declared_type,
            not_null: not_null != 0,
            default_value,
            primary_key: pk != 0,
        });
    }
    Ok(columns)
}

async fn table_indexes(conn: &libsql::Connection, table: &str) -> Result<Vec<IndexInfo>, DbError> {
    let sql = format!("PRAGMA index_list({table})");
    let mut rows = conn.query(&sql, ()).await?;
    let mut indexes = Vec::new();
    while let Some(row) = rows.next().await? {
        let name: String = row.get(1)?;
        let unique: i64 = row.get(2)?;
        indexes.push(IndexInfo { name, unique: unique != 0 });
    }
    Ok(indexes)
}

pub(crate) async fn row_count(conn: &libsql::Connection, table: &str) -> Result<i64, DbError> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let mut rows = conn.query(&sql, ()).await?;
    let row = rows.next().await?.ok_or_else(|| DbError::StagingFailure(format!("COUNT(*) on {table} returned no row")))?;
    Ok(row.get::<i64>(0)?)
}

pub(crate) async fn sample_rows(conn: &libsql::Connection, table: &str, limit: usize) -> Result<Vec<Map<String, Value>>, DbError> {
    let sql = format!("SELECT * FROM {table} LIMIT {limit}");
    let mut rows = conn.query(&sql, ()).await?;
    let column_names: Vec<String> = (0..rows.column_count()).map(|i| rows.column_name(i as i32).unwrap_or("").to_string()).collect();
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(row_to_object(&row, &column_names)?);
    }
    Ok(out)
}

/// Build the full per-table introspection summary for every user table and
/// view in the compartment.
///
/// # Errors
///
/// Only returns an error if enumerating `sqlite_master` itself fails; any
/// failure while introspecting one table is logged and that table is
/// reported with whatever partial information was gathered.
pub async fn introspect_database(conn: &libsql::Connection, sample_size: usize) -> Result<Vec<TableInfo>, DbError> {
    let objects = list_user_objects(conn).await?;
    let known_tables: Vec<String> = objects.iter().map(|(name, _)| name.clone()).collect();

    let mut tables = Vec::new();
    for (name, kind) in &objects {
        let columns = match table_columns(conn, name, &known_tables).await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(table = %name, error = %err, "failed to read table_info, reporting without columns");
                Vec::new()
            }
        };
        let indexes = table_indexes(conn, name).await.unwrap_or_else(|err| {
            tracing::warn!(table = %name, error = %err, "failed to read index_list, reporting without indexes");
            Vec::new()
        });
        let count = row_count(conn, name).await.unwrap_or_else(|err| {
            tracing::warn!(table = %name, error = %err, "failed to count rows");
            0
        });
        let samples = sample_rows(conn, name, sample_size).await.unwrap_or_else(|err| {
            tracing::warn!(table = %name, error = %err, "failed to read sample rows");
            Vec::new()
        });

        let foreign_keys = columns.iter().filter_map(|c| c.foreign_key.clone()).collect();

        tables.push(TableInfo {
            name: name.clone(),
            kind: kind.clone(),
            row_count: count,
            columns,
            foreign_keys,
            indexes,
            sample_data: samples,
        });
    }

    Ok(tables)
}

/// Column metadata for a single named table, used by the standalone
/// `table_columns` external operation (`spec.md` §6.4).
///
/// # Errors
///
/// Returns [`DbError::LibSql`] if `table` does not exist or `PRAGMA
/// table_info` otherwise fails.
pub async fn columns_for_table(conn: &libsql::Connection, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
    let known_tables: Vec<String> = list_user_objects(conn).await?.into_iter().map(|(name, _)| name).collect();
    table_columns(conn, table, &known_tables).await
}
