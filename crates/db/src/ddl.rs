//! DDL emission for inferred table and junction definitions (§3 "Table",
//! "Junction Table"; §4.5 phase 2/3).

use stage_schema::{JunctionDef, TableDef};

use crate::error::DbError;

/// Minimal fallback row shape used when a table's own `CREATE TABLE`
/// statement fails after identifier sanitation (`spec.md` §7 local
/// recovery).
const FALLBACK_DDL_TEMPLATE: &str = "CREATE TABLE IF NOT EXISTS {name} (id INTEGER PRIMARY KEY AUTOINCREMENT, data_json TEXT)";

fn table_create_sql(table: &TableDef) -> String {
    let id_clause = if table.id_is_caller_supplied {
        format!("id {} PRIMARY KEY", table.id_column_type.as_sql())
    } else {
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()
    };
    let mut columns = vec![id_clause];
    for column in &table.columns {
        columns.push(format!("{} {}", column.name, column.column_type.as_sql()));
    }
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table.name, columns.join(", "))
}

fn junction_create_sql(junction: &JunctionDef) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, {} TEXT, {} TEXT)",
        junction.name, junction.left_column, junction.right_column
    )
}

/// Create every entity table and junction table, falling back to a minimal
/// `(id, data_json)` shape for any table whose own DDL fails (§7).
///
/// Returns the names of tables that were created with the minimal fallback
/// shape instead of their inferred shape, so the insertion engine can avoid
/// inserting columns that no longer exist.
///
/// # Errors
///
/// Returns [`DbError::LibSql`] only if even the fallback DDL fails for some
/// table — at that point the staging run cannot proceed for that table.
pub async fn create_tables(
    conn: &libsql::Connection,
    tables: &[TableDef],
    junctions: &[JunctionDef],
) -> Result<Vec<String>, DbError> {
    let mut downgraded = Vec::new();

    for table in tables {
        let sql = table_create_sql(table);
        if let Err(err) = conn.execute_batch(&sql).await {
            tracing::warn!(table = %table.name, error = %err, "table DDL failed, falling back to minimal shape");
            let fallback = FALLBACK_DDL_TEMPLATE.replace("{name}", &table.name);
            conn.execute_batch(&fallback).await?;
            downgraded.push(table.name.clone());
        }
    }

    for junction in junctions {
        let sql = junction_create_sql(junction);
        if let Err(err) = conn.execute_batch(&sql).await {
            tracing::warn!(junction = %junction.name, error = %err, "junction table DDL failed, skipping");
        }
    }

    Ok(downgraded)
}
