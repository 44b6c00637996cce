//! The chunk-reference token format (`spec.md` §4.3, §6).
//!
//! A literal prefix followed by an opaque content identifier. Stored in
//! place of an oversized field value; recognised by the SQL gate's
//! reconstitution pass (C7) on the way out.

/// Literal prefix marking a chunk-reference token.
pub const CHUNK_TOKEN_PREFIX: &str = "__CHUNKED__:";

/// Build a chunk-reference token for the given content id.
#[must_use]
pub fn format_token(content_id: &str) -> String {
    format!("{CHUNK_TOKEN_PREFIX}{content_id}")
}

/// Check whether a text value is a chunk-reference token, and if so, return
/// the content id it carries.
///
/// Only matches the exact prefix — callers must not recurse on a resolved
/// value even if it happens to start with the same prefix (`spec.md` §9).
#[must_use]
pub fn parse_token(value: &str) -> Option<&str> {
    value.strip_prefix(CHUNK_TOKEN_PREFIX)
}

/// Sentinel placed in a result cell when chunk metadata is missing.
#[must_use]
pub fn not_found_sentinel(content_id: &str) -> String {
    format!("[CHUNKED_CONTENT_NOT_FOUND:{content_id}]")
}

/// Sentinel placed in a result cell when chunk retrieval fails for a reason
/// other than missing metadata (e.g. a corrupt chunk set).
#[must_use]
pub fn error_sentinel(detail: &str) -> String {
    format!("[CHUNKED_CONTENT_ERROR:{detail}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_token() {
        let token = format_token("chunk_abc123");
        assert_eq!(parse_token(&token), Some("chunk_abc123"));
    }

    #[test]
    fn rejects_non_token_text() {
        assert_eq!(parse_token("just a normal string"), None);
        assert_eq!(parse_token("__CHUNKED__"), None);
    }

    #[test]
    fn does_not_match_mid_string() {
        assert_eq!(parse_token("prefix __CHUNKED__:abc"), None);
    }
}
