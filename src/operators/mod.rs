//! Operators: the dataflow graph nodes that transform `Change` streams
//! while maintaining per-operator state.
//!
//! All operators share one contract (the "Operator base contract"):
//! `fetch`/`cleanup` pull a `NodeStream`,
//! `set_output`/`destroy` manage the single downstream consumer, and
//! `schema` describes the rows/relationships produced. Receiving pushes
//! from upstream is modeled as implementing [`crate::output::Output`]
//! rather than as a trait method here, since an operator with more than
//! one logical input (Join) needs to distinguish which input pushed —
//! see `join.rs`.

pub mod concat;
pub mod distinct;
pub mod filter;
pub mod full_aggregate;
pub mod group_by;
pub mod join;

use std::cell::RefCell;
use std::rc::Rc;

use crate::model::{FetchRequest, NodeSchema, NodeStream};

/// Shared-ownership handle to any operator, used both as "my input" and
/// (via trait-object coercion to `dyn Output`) as "my upstream's output".
pub type OperatorRef = Rc<RefCell<dyn Operator>>;

pub trait Operator {
    /// Schema of the rows (and nested relationship schemas) this operator
    /// produces.
    fn schema(&self) -> &NodeSchema;

    /// Pull-based initial materialization, constrained by an optional
    /// equality predicate.
    fn fetch(&mut self, request: &FetchRequest) -> NodeStream;

    /// Same yield sequence as `fetch`, but signals the caller will never
    /// re-subscribe on this constraint — downstream operators release any
    /// per-constraint state they were holding.
    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream;

    /// Attach the single downstream consumer. Operators with more than one
    /// logical output would violate the single-output invariant; fan-out
    /// is expressed explicitly via [`concat::Concat`] plus a broadcaster,
    /// never by calling this twice with different consumers.
    fn set_output(&mut self, output: crate::output::OutputRef);

    /// Recursively tear down this operator and its inputs, discarding
    /// per-operator storage.
    fn destroy(&mut self);
}

pub fn operator_ref(op: impl Operator + 'static) -> OperatorRef {
    Rc::new(RefCell::new(op))
}
