//! Schema descriptor parser (C4).
//!
//! Parses a small, line-oriented type-graph description — brace-delimited
//! type blocks, one field per line — into [`ParsedDescriptor`]. The parser
//! is informative only: a supplied descriptor refines chunking and
//! relationship cardinality, but absence (or a parse error) degrades
//! behaviour to pure structural inference (C5).
//!
//! Grammar, roughly:
//!
//! ```text
//! type Target {
//!   id: ID!
//!   approvedSymbol: String
//!   associatedDiseases(first: Int): [Disease]
//!   description: String @chunk(always, threshold = 1024)
//! }
//!
//! enum Biotype { PROTEIN_CODING LNCRNA }
//! input TargetFilter { symbol: String }
//! ```
//!
//! `enum`/`input` blocks, introspection types (`__Type`, `__Schema`, ...),
//! and connection/edge wrapper types (`TargetConnection`, `TargetEdge`) are
//! recognised and skipped — they never contribute fields or relationships.

use std::collections::BTreeMap;

use stage_chunks::ChunkPolicy;

use crate::error::SchemaError;
use crate::model::{Cardinality, ChunkRule, ExtractionRule, FieldDescriptor, ParsedDescriptor, Relationship, TypeDescriptor};

const SCALAR_TYPES: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

/// Parse a textual type-graph description into a [`ParsedDescriptor`].
///
/// # Errors
///
/// Returns [`SchemaError`] on an unterminated block or a field line that
/// cannot be split into a name and a type expression. Callers should treat
/// any error as "no descriptor supplied" and fall back to pure structural
/// inference rather than aborting staging.
pub fn parse(source: &str) -> Result<ParsedDescriptor, SchemaError> {
    let mut descriptor = ParsedDescriptor::default();
    let mut lines = source.lines().enumerate().peekable();

    while let Some((line_no, raw_line)) = lines.next() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((kind, name)) = block_header(line) else {
            continue;
        };

        let mut body = Vec::new();
        let mut closed = false;
        for (_, raw_body_line) in lines.by_ref() {
            let body_line = strip_comment(raw_body_line).trim().to_string();
            if body_line == "}" {
                closed = true;
                break;
            }
            if !body_line.is_empty() {
                body.push(body_line);
            }
        }
        if !closed {
            return Err(SchemaError::UnterminatedBlock {
                type_name: name.clone(),
                line: line_no + 1,
            });
        }

        if kind != BlockKind::Type || should_skip_type(&name) {
            continue;
        }

        let mut type_descriptor = TypeDescriptor::default();
        for (offset, field_line) in body.iter().enumerate() {
            parse_field_line(
                &name,
                field_line,
                line_no + offset + 2,
                &mut type_descriptor,
                &mut descriptor,
            )?;
        }
        descriptor.types.insert(name, type_descriptor);
    }

    Ok(descriptor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Type,
    Enum,
    Input,
}

fn block_header(line: &str) -> Option<(BlockKind, String)> {
    let line = line.strip_suffix('{')?.trim();
    let (kind_word, rest) = line.split_once(char::is_whitespace)?;
    let kind = match kind_word {
        "type" => BlockKind::Type,
        "enum" => BlockKind::Enum,
        "input" => BlockKind::Input,
        _ => return None,
    };
    let name = rest.split_whitespace().next()?.to_string();
    Some((kind, name))
}

/// Skip introspection types, connection/edge wrappers, and scalar-wrapper
/// or enum-like names — only genuine domain types contribute fields.
fn should_skip_type(name: &str) -> bool {
    name.starts_with("__") || name.ends_with("Connection") || name.ends_with("Edge") || SCALAR_TYPES.contains(&name)
}

fn strip_comment(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Find the byte offset of the first `:` that is not nested inside a
/// `(...)` argument list, e.g. `associatedDiseases(first: Int): [Disease]`
/// must split after the closing paren, not at the arg's own colon.
fn top_level_colon(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ':' if depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

fn parse_field_line(
    type_name: &str,
    line: &str,
    line_no: usize,
    type_descriptor: &mut TypeDescriptor,
    descriptor: &mut ParsedDescriptor,
) -> Result<(), SchemaError> {
    let (head, annotations) = match line.split_once('@') {
        Some((h, rest)) => (h.trim(), format!("@{rest}")),
        None => (line, String::new()),
    };
    let annotations: Vec<&str> = annotations
        .split('@')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let Some(split_at) = top_level_colon(head) else {
        return Err(SchemaError::MalformedFieldLine {
            line: line_no,
            text: line.to_string(),
        });
    };
    let (name_part, type_expr) = (&head[..split_at], &head[split_at + 1..]);

    let field_name = name_part.split('(').next().unwrap_or(name_part).trim().to_string();
    if field_name.is_empty() {
        return Err(SchemaError::MalformedFieldLine {
            line: line_no,
            text: line.to_string(),
        });
    }

    let type_expr = type_expr.trim();
    let is_list = type_expr.starts_with('[') && type_expr.ends_with(']');
    let inner = if is_list { &type_expr[1..type_expr.len() - 1] } else { type_expr };
    let is_nullable = !inner.ends_with('!');
    let base_type = inner.trim_end_matches('!').trim().to_string();

    type_descriptor.fields.insert(
        field_name.clone(),
        FieldDescriptor {
            base_type: base_type.clone(),
            is_list,
            is_nullable,
        },
    );

    if !SCALAR_TYPES.contains(&base_type.as_str()) && !should_skip_type(&base_type) {
        descriptor.relationships.push(Relationship {
            from_type: type_name.to_string(),
            to_type: base_type,
            field_name: field_name.clone(),
            cardinality: if is_list { Cardinality::OneToMany } else { Cardinality::OneToOne },
        });
    }

    for annotation in annotations {
        parse_annotation(type_name, &field_name, annotation, line_no, descriptor)?;
    }

    Ok(())
}

fn parse_annotation(
    type_name: &str,
    field_name: &str,
    annotation: &str,
    line_no: usize,
    descriptor: &mut ParsedDescriptor,
) -> Result<(), SchemaError> {
    if let Some(rest) = annotation.strip_prefix("from(") {
        let source_path = rest.trim_end_matches(')').trim().to_string();
        descriptor.extraction_rules.push(ExtractionRule {
            type_name: type_name.to_string(),
            field_name: field_name.to_string(),
            source_path,
        });
        return Ok(());
    }

    let Some(rest) = annotation.strip_prefix("chunk(") else {
        return Ok(());
    };
    let rest = rest.trim_end_matches(')');
    let args: Vec<&str> = rest.split(',').map(str::trim).collect();
    let Some(&priority) = args.first() else {
        return Err(SchemaError::UnknownChunkRule {
            line: line_no,
            rule: annotation.to_string(),
        });
    };

    let threshold_bytes = args
        .iter()
        .skip(1)
        .find_map(|arg| arg.split_once('=').map(|(_, v)| v.trim()))
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(32 * 1024);

    let policy = match priority {
        "never" => ChunkPolicy::Never,
        "always" => ChunkPolicy::Always { threshold_bytes },
        "size-based" => ChunkPolicy::SizeBased { threshold_bytes },
        other => {
            return Err(SchemaError::UnknownChunkRule {
                line: line_no,
                rule: other.to_string(),
            });
        }
    };

    descriptor
        .chunk_rules
        .insert((type_name.to_string(), field_name.to_string()), ChunkRule { policy });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_type_block() {
        let source = "type Target {\n  id: ID!\n  approvedSymbol: String\n}\n";
        let parsed = parse(source).unwrap();
        let target = parsed.types.get("Target").unwrap();
        assert_eq!(target.fields.len(), 2);
        assert!(!target.fields["id"].is_nullable);
        assert!(target.fields["approvedSymbol"].is_nullable);
    }

    #[test]
    fn records_list_relationship_as_one_to_many() {
        let source = "type Target {\n  id: ID!\n  diseases: [Disease]\n}\n";
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.relationships.len(), 1);
        let rel = &parsed.relationships[0];
        assert_eq!(rel.from_type, "Target");
        assert_eq!(rel.to_type, "Disease");
        assert_eq!(rel.cardinality, Cardinality::OneToMany);
    }

    #[test]
    fn records_singleton_relationship_as_one_to_one() {
        let source = "type Association {\n  target: Target\n}\n";
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.relationships[0].cardinality, Cardinality::OneToOne);
    }

    #[test]
    fn skips_introspection_enum_and_input_blocks() {
        let source = "type __Schema {\n  types: [__Type]\n}\nenum Biotype {\n  PROTEIN_CODING\n}\ninput TargetFilter {\n  symbol: String\n}\ntype Target {\n  id: ID!\n}\n";
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.types.len(), 1);
        assert!(parsed.types.contains_key("Target"));
    }

    #[test]
    fn skips_connection_and_edge_wrapper_types() {
        let source = "type TargetConnection {\n  edges: [TargetEdge]\n}\ntype TargetEdge {\n  node: Target\n}\ntype Target {\n  id: ID!\n}\n";
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.types.len(), 1);
    }

    #[test]
    fn parses_chunk_annotation_with_threshold() {
        let source = "type Target {\n  description: String @chunk(always, threshold=1024)\n}\n";
        let parsed = parse(source).unwrap();
        let policy = parsed.chunk_rule_for("Target", "description").unwrap();
        assert_eq!(policy, ChunkPolicy::Always { threshold_bytes: 1024 });
    }

    #[test]
    fn parses_never_chunk_annotation_without_threshold() {
        let source = "type Target {\n  id: ID! @chunk(never)\n}\n";
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.chunk_rule_for("Target", "id"), Some(ChunkPolicy::Never));
    }

    #[test]
    fn rejects_malformed_field_line() {
        let source = "type Target {\n  this line has no colon\n}\n";
        let result = parse(source);
        assert!(matches!(result, Err(SchemaError::MalformedFieldLine { .. })));
    }

    #[test]
    fn rejects_unterminated_block() {
        let source = "type Target {\n  id: ID!\n";
        let result = parse(source);
        assert!(matches!(result, Err(SchemaError::UnterminatedBlock { .. })));
    }

    #[test]
    fn handles_field_arguments_containing_a_colon() {
        let source = "type Target {\n  associatedDiseases(first: Int): [Disease]\n}\n";
        let parsed = parse(source).unwrap();
        let target = parsed.types.get("Target").unwrap();
        let field = target.fields.get("associatedDiseases").unwrap();
        assert_eq!(field.base_type, "Disease");
        assert!(field.is_list);
        assert_eq!(parsed.relationships[0].to_type, "Disease");
    }

    #[test]
    fn ignores_trailing_line_comments() {
        let source = "type Target {\n  id: ID! // surrogate-ish but declared\n}\n";
        let parsed = parse(source).unwrap();
        assert!(parsed.types.contains_key("Target"));
    }
}
