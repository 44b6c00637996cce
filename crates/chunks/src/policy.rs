//! Per-field chunking policy, optionally supplied by a schema descriptor (C4).
//!
//! Absent a descriptor, every field falls back to the default size-based
//! threshold from [`stage_config::ChunkingConfig`].

/// Priority with which a field's chunking behaviour overrides the default
/// threshold (`spec.md` §4.3 "Schema-aware chunking").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Bypass chunking regardless of size.
    Never,
    /// Chunk whenever size exceeds a field-specific threshold lower than
    /// the default.
    Always { threshold_bytes: u64 },
    /// Chunk if size exceeds a field-specific threshold.
    SizeBased { threshold_bytes: u64 },
}

impl ChunkPolicy {
    /// Whether a value of the given byte length should be chunked under
    /// this policy. For [`Self::SizeBased`]/[`Self::Always`] the threshold
    /// to compare against is already embedded in the variant — see
    /// [`effective_policy`], which folds in the engine-wide default.
    #[must_use]
    pub fn should_chunk(self, len_bytes: u64) -> bool {
        match self {
            Self::Never => false,
            Self::Always { threshold_bytes } | Self::SizeBased { threshold_bytes } => {
                len_bytes > threshold_bytes
            }
        }
    }
}

/// A per-field rule extracted from a schema descriptor (C4), keyed by
/// `(type_name, field_name)` in the caller's map.
#[derive(Debug, Clone)]
pub struct FieldChunkRule {
    pub type_name: String,
    pub field_name: String,
    pub policy: ChunkPolicy,
}

/// Resolve the effective policy for a field: identifier-carrying fields are
/// universally pinned to [`ChunkPolicy::Never`] regardless of any descriptor
/// rule (`spec.md` §4.3); otherwise the descriptor rule applies if present,
/// else the default size-based threshold.
#[must_use]
pub fn effective_policy(
    is_identifier_field: bool,
    descriptor_rule: Option<ChunkPolicy>,
    default_threshold_bytes: u64,
) -> ChunkPolicy {
    if is_identifier_field {
        return ChunkPolicy::Never;
    }
    descriptor_rule.unwrap_or(ChunkPolicy::SizeBased {
        threshold_bytes: default_threshold_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_bypasses_regardless_of_size() {
        assert!(!ChunkPolicy::Never.should_chunk(1_000_000));
    }

    #[test]
    fn always_uses_its_own_threshold() {
        let policy = ChunkPolicy::Always { threshold_bytes: 10 };
        assert!(policy.should_chunk(11));
        assert!(!policy.should_chunk(10));
    }

    #[test]
    fn size_based_uses_its_own_threshold() {
        let policy = ChunkPolicy::SizeBased { threshold_bytes: 500 };
        assert!(policy.should_chunk(501));
        assert!(!policy.should_chunk(500));
    }

    #[test]
    fn identifier_fields_are_always_pinned_to_never() {
        let resolved = effective_policy(true, Some(ChunkPolicy::Always { threshold_bytes: 1 }), 32 * 1024);
        assert_eq!(resolved, ChunkPolicy::Never);
    }

    #[test]
    fn absent_descriptor_rule_falls_back_to_default_threshold() {
        let resolved = effective_policy(false, None, 32 * 1024);
        assert_eq!(
            resolved,
            ChunkPolicy::SizeBased {
                threshold_bytes: 32 * 1024
            }
        );
    }
}
