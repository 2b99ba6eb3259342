//! Ambient engine configuration.
//!
//! Knobs threaded into the pipeline builder that are implementation
//! concerns rather than AST concerns — there is no `postgres.conf` here,
//! so this is a plain struct rather than a GUC registration, but it plays
//! the same role a GUC table plays for query planning: a small set of
//! behavior switches the builder consults while compiling, kept separate
//! from anything the AST itself expresses.

/// Configuration accepted by [`crate::pipeline::PipelineBuilder`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Skip wrapping an `OR` fan-out's `Concat` stage in a `Distinct` when
    /// the caller already knows the disjuncts can never overlap. Off by
    /// default: `Distinct`'s reference-counted dedup is needed for
    /// correctness in the general case, and the builder makes no attempt
    /// at overlap analysis of its own — this only matters for an embedder
    /// that has already established disjointness out of band and wants to
    /// skip the extra hop.
    pub skip_distinct_for_disjoint_or: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            skip_distinct_for_disjoint_or: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keeps_distinct_stage() {
        assert!(!EngineConfig::default().skip_distinct_for_disjoint_or);
    }
}
