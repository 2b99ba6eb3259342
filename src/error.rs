//! Error types for the engine.
//!
//! All errors the engine can produce are represented by [`EngineError`].
//! Errors are propagated via `Result<T, EngineError>` wherever a collaborator
//! can reasonably reject something (pipeline build, first push); true
//! invariant breaches panic instead — see `assert_invariant!` below.
//!
//! # Error Classification
//!
//! - **Configuration** — AST references something that doesn't exist, or
//!   asks for an unsupported shape. Reported at pipeline-build time.
//! - **Schema** — a row violates the primary-key contract. Reported at
//!   first-push time.
//! - **Invariant** — an upstream collaborator broke the push protocol
//!   (e.g. a `child` change whose parent isn't present). These are bugs,
//!   not data errors, and are raised as panics rather than `Result`s, so
//!   they can never be silently swallowed.
//!
//! There is no retry policy here: retry is the replication layer's
//! responsibility, not this crate's.

use std::fmt;

/// Primary error type for the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    // ── Configuration errors — fail at pipeline-build time ───────────────
    /// The AST references a table the resolver doesn't know about.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The AST references a column the named table's schema doesn't have.
    #[error("unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: String, column: String },

    /// An aggregate kind was requested in a position that doesn't support
    /// it (e.g. `min`/`max`/`array` without a `groupBy`).
    #[error("unsupported aggregate `{aggregate}` in {position} position")]
    UnsupportedAggregate { aggregate: String, position: String },

    /// A `LIKE`/`ILIKE` pattern ends with a dangling `\` escape.
    #[error("LIKE pattern ends with a dangling escape: {0:?}")]
    DanglingLikeEscape(String),

    /// A Join was constructed with the same operator as both parent and
    /// child input.
    #[error("join cannot use the same operator as both parent and child")]
    JoinSelfReference,

    /// A condition's operator and literal shape don't match (e.g. `IN`
    /// with a single literal instead of a list).
    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    // ── Schema errors — fail at first-push time or Source registration ──
    /// A row is missing one of its schema's declared primary-key columns.
    #[error("row missing primary-key column `{0}`")]
    MissingPrimaryKeyColumn(String),

    /// A row has a null value in a primary-key column.
    #[error("primary-key column `{0}` is null")]
    NullPrimaryKeyColumn(String),

    /// A schema declares a column named `_0_version`, reserved by the
    /// replication protocol.
    #[error("column name `{0}` is reserved by the replication protocol")]
    ReservedColumnName(String),

    /// A table/schema is named `_zero`, reserved by the replication
    /// protocol.
    #[error("schema name `{0}` is reserved by the replication protocol")]
    ReservedSchemaName(String),
}

/// Classification used only to decide how a caller should react; the
/// engine itself never branches on this beyond surfacing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Configuration,
    Schema,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErrorKind::Configuration => write!(f, "CONFIGURATION"),
            EngineErrorKind::Schema => write!(f, "SCHEMA"),
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            EngineError::UnknownTable(_)
            | EngineError::UnknownColumn { .. }
            | EngineError::UnsupportedAggregate { .. }
            | EngineError::DanglingLikeEscape(_)
            | EngineError::JoinSelfReference
            | EngineError::MalformedCondition(_) => EngineErrorKind::Configuration,

            EngineError::MissingPrimaryKeyColumn(_)
            | EngineError::NullPrimaryKeyColumn(_)
            | EngineError::ReservedColumnName(_)
            | EngineError::ReservedSchemaName(_) => EngineErrorKind::Schema,
        }
    }
}

/// Panics with a message identifying the violated invariant. Used instead
/// of an `Err` return at the handful of call sites where the condition can
/// only be false if an upstream collaborator broke the push protocol.
#[macro_export]
macro_rules! assert_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            panic!("invariant violation: {}", format!($($arg)+));
        }
    };
}
