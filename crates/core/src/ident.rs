//! Safe SQL identifier normalisation for inferred table and column names.
//!
//! Both [`normalise_table`] and [`normalise_column`] are total: they never
//! fail, and always return a string matching `^[a-z_][a-z0-9_]*$` that is
//! not a reserved SQL word. Both are idempotent on already-normalised input.

use std::sync::LazyLock;

/// Reserved SQL words that may not be used bare as a table or column name.
///
/// Read-only after initialisation; shared process-wide.
static RESERVED_WORDS: LazyLock<std::collections::HashSet<&'static str>> = LazyLock::new(|| {
    [
        "table",
        "index",
        "view",
        "column",
        "primary",
        "key",
        "foreign",
        "constraint",
        "order",
        "group",
        "select",
        "from",
        "where",
        "insert",
        "update",
        "delete",
        "create",
        "drop",
        "alter",
        "join",
        "inner",
        "outer",
        "left",
        "right",
        "union",
        "all",
        "distinct",
        "having",
        "limit",
        "offset",
        "as",
        "on",
    ]
    .into_iter()
    .collect()
});

/// Domain-specific synonyms collapsed to a canonical snake_case form before
/// the reserved-word check runs. Keys and values are already lowercase.
static SYNONYMS: LazyLock<std::collections::HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        [
            ("compoundid", "compound_id"),
            ("chemblid", "chembl_id"),
            ("ensemblid", "ensembl_id"),
            ("efoid", "efo_id"),
        ]
        .into_iter()
        .collect()
    });

/// Normalise a candidate table name into a safe SQL identifier.
#[must_use]
pub fn normalise_table(name: &str) -> String {
    normalise(name, false, "table_", "_tbl")
}

/// Normalise a candidate column name into a safe SQL identifier.
///
/// Unlike [`normalise_table`], camelCase segments are split into snake_case
/// before sanitisation (`approvedSymbol` → `approved_symbol`).
#[must_use]
pub fn normalise_column(name: &str) -> String {
    normalise(name, true, "col_", "_col")
}

fn normalise(name: &str, camel_to_snake: bool, digit_prefix: &str, collision_suffix: &str) -> String {
    let lower = if camel_to_snake {
        camel_case_to_snake(name)
    } else {
        name.to_lowercase()
    };

    let mut sanitised = String::with_capacity(lower.len());
    for ch in lower.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            sanitised.push(ch);
        } else {
            sanitised.push('_');
        }
    }

    let collapsed = collapse_underscores(&sanitised);
    let trimmed = collapsed.trim_matches('_');

    let mut result = if trimmed.is_empty() {
        String::new()
    } else {
        trimmed.to_string()
    };

    if let Some(synonym) = SYNONYMS.get(result.as_str()) {
        result = (*synonym).to_string();
    }

    if result.is_empty() || result.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        result = format!("{digit_prefix}{result}");
    }

    if RESERVED_WORDS.contains(result.as_str()) {
        result.push_str(collision_suffix);
    }

    result
}

fn camel_case_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if ch.is_uppercase() && prev_lower_or_digit {
            out.push('_');
        }
        prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        for lowered in ch.to_lowercase() {
            out.push(lowered);
        }
    }
    out
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_underscore = false;
    for ch in s.chars() {
        if ch == '_' {
            if !last_was_underscore {
                out.push(ch);
            }
            last_was_underscore = true;
        } else {
            out.push(ch);
            last_was_underscore = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("target", "target")]
    #[case("Target Name", "target_name")]
    #[case("123abc", "table_123abc")]
    #[case("", "table_")]
    #[case("select", "select_tbl")]
    #[case("__weird__name__", "weird_name")]
    fn normalises_tables(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalise_table(input), expected);
    }

    #[rstest]
    #[case("approvedSymbol", "approved_symbol")]
    #[case("order", "order_col")]
    #[case("compoundId", "compound_id")]
    #[case("id", "id")]
    fn normalises_columns(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalise_column(input), expected);
    }

    #[test]
    fn idempotent_on_normalised_input() {
        let once = normalise_column("approvedSymbol");
        let twice = normalise_column(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn never_panics_on_arbitrary_input() {
        for input in ["", "   ", "🎉🎉🎉", "a".repeat(5000).as_str(), "\0\0\0"] {
            let table = normalise_table(input);
            let column = normalise_column(input);
            assert!(!table.is_empty());
            assert!(!column.is_empty());
        }
    }
}
