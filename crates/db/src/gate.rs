//! Analytic SQL gate (C7, `spec.md` §4.7): an allow-list validator admitting
//! only read-only analytic dialect, plus the thin execution wrapper that
//! turns returned rows into ordered JSON objects.
//!
//! The `regex` crate has no lookaround support, so the "non-temp" qualifier
//! on `drop table`/`create table`/`insert into` is resolved by capturing the
//! optional `temp`/`temporary` token in a capture group and checking its
//! presence in Rust, rather than a negative lookahead.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::DbError;
use crate::helpers::row_to_object;

const ALLOWED_STARTS: &[&str] = &[
    "select",
    "with",
    "pragma",
    "explain",
    "create temporary table",
    "create temp table",
    "create view",
    "create temporary view",
    "create temp view",
    "drop view",
    "drop temporary table",
    "drop temp table",
];

static DROP_TABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bdrop\s+(temp(?:orary)?\s+)?table\b").unwrap());
static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bcreate\s+(temp(?:orary)?\s+)?table\b").unwrap());
static INSERT_INTO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\binsert\s+into\s+(temp(?:orary)?\s+)?").unwrap());
static DELETE_FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bdelete\s+from\b").unwrap());
static UPDATE_SET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bupdate\b.*\bset\b").unwrap());
static ALTER_TABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\balter\s+table\b").unwrap());
static ATTACH_DB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\battach\s+database\b").unwrap());
static DETACH_DB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bdetach\s+database\b").unwrap());

/// The label attached to a validated statement for response metadata
/// (`spec.md` §4.7 "Query-type label").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Cte,
    Pragma,
    Explain,
    CreateTemp,
    Select,
}

impl QueryType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cte => "cte",
            Self::Pragma => "pragma",
            Self::Explain => "explain",
            Self::CreateTemp => "create_temp",
            Self::Select => "select",
        }
    }
}

fn matches_allowed_start(lower: &str) -> bool {
    ALLOWED_STARTS.iter().any(|kw| {
        lower
            .strip_prefix(kw)
            .is_some_and(|rest| rest.is_empty() || !rest.chars().next().is_some_and(|c| c.is_alphanumeric()))
    })
}

/// Find the first blocked pattern in `lower`, if any, returning a
/// human-readable reason naming it.
fn blocked_pattern(lower: &str) -> Option<String> {
    if let Some(caps) = DROP_TABLE.captures(lower)
        && caps.get(1).is_none()
    {
        return Some("DROP TABLE on a non-temporary table".to_string());
    }
    if DELETE_FROM.is_match(lower) {
        return Some("DELETE FROM".to_string());
    }
    if UPDATE_SET.is_match(lower) {
        return Some("UPDATE ... SET".to_string());
    }
    if let Some(caps) = INSERT_INTO.captures(lower)
        && caps.get(1).is_none()
    {
        return Some("INSERT INTO a non-temporary table".to_string());
    }
    if ALTER_TABLE.is_match(lower) {
        return Some("ALTER TABLE".to_string());
    }
    if let Some(caps) = CREATE_TABLE.captures(lower)
        && caps.get(1).is_none()
    {
        return Some("CREATE TABLE on a non-temporary table".to_string());
    }
    if ATTACH_DB.is_match(lower) {
        return Some("ATTACH DATABASE".to_string());
    }
    if DETACH_DB.is_match(lower) {
        return Some("DETACH DATABASE".to_string());
    }
    None
}

fn query_type_label(lower: &str) -> QueryType {
    if lower.starts_with("with") {
        QueryType::Cte
    } else if lower.starts_with("pragma") {
        QueryType::Pragma
    } else if lower.starts_with("explain") {
        QueryType::Explain
    } else if lower.starts_with("create") {
        QueryType::CreateTemp
    } else {
        QueryType::Select
    }
}

/// Validate `sql` against the analytic allow-list (`spec.md` §4.7).
///
/// # Errors
///
/// Returns [`DbError::OperationNotAllowed`] if the statement's first token
/// isn't one of the admitted analytic forms, or if it matches one of the
/// blocked write patterns anywhere in the text (guards against write
/// statements smuggled in behind an allowed prefix, e.g. via a CTE).
pub fn validate(sql: &str) -> Result<QueryType, DbError> {
    let trimmed = sql.trim();
    let lower = trimmed.to_ascii_lowercase();

    if !matches_allowed_start(&lower) {
        return Err(DbError::OperationNotAllowed {
            reason: "statement does not begin with an admitted analytic form".to_string(),
        });
    }

    if let Some(reason) = blocked_pattern(&lower) {
        return Err(DbError::OperationNotAllowed { reason });
    }

    Ok(query_type_label(&lower))
}

/// Execute an already-validated statement, returning column names in
/// declaration order and each row as an ordered JSON object.
///
/// # Errors
///
/// Returns [`DbError::LibSql`] if the embedded engine rejects the statement
/// at execution time (e.g. a referenced table does not exist).
pub async fn execute_query(conn: &libsql::Connection, sql: &str) -> Result<(Vec<String>, Vec<Map<String, Value>>), DbError> {
    let mut rows = conn.query(sql, ()).await?;
    let column_names: Vec<String> = (0..rows.column_count()).map(|i| rows.column_name(i as i32).unwrap_or("").to_string()).collect();

    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(row_to_object(&row, &column_names)?);
    }
    Ok((column_names, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_select() {
        assert_eq!(validate("SELECT * FROM target").unwrap().as_str(), "select");
    }

    #[test]
    fn accepts_cte() {
        assert_eq!(validate("WITH x AS (SELECT 1) SELECT * FROM x").unwrap().as_str(), "cte");
    }

    #[test]
    fn accepts_create_temp_view() {
        assert_eq!(validate("CREATE TEMP VIEW v AS SELECT 1").unwrap().as_str(), "create_temp");
    }

    #[test]
    fn rejects_drop_table() {
        let err = validate("DROP TABLE foo").unwrap_err();
        assert!(matches!(err, DbError::OperationNotAllowed { .. }));
    }

    #[test]
    fn accepts_drop_temp_table() {
        validate("DROP TEMPORARY TABLE foo").unwrap();
    }

    #[test]
    fn rejects_update() {
        let err = validate("UPDATE target SET approved_symbol='x'").unwrap_err();
        let DbError::OperationNotAllowed { reason } = err else { panic!("wrong variant") };
        assert!(reason.to_ascii_uppercase().contains("UPDATE"));
    }

    #[test]
    fn rejects_delete() {
        validate("DELETE FROM target").unwrap_err();
    }

    #[test]
    fn rejects_write_smuggled_behind_cte() {
        validate("WITH x AS (SELECT 1) DELETE FROM target").unwrap_err();
    }

    #[test]
    fn rejects_insert() {
        validate("INSERT INTO target (id) VALUES (1)").unwrap_err();
    }

    #[test]
    fn rejects_attach_database() {
        validate("ATTACH DATABASE 'x.db' AS x").unwrap_err();
    }

    #[test]
    fn validation_is_idempotent() {
        for sql in ["SELECT 1", "DROP TABLE foo", "PRAGMA table_info(target)"] {
            let first = validate(sql);
            let second = validate(sql);
            assert_eq!(first.is_ok(), second.is_ok());
        }
    }
}
