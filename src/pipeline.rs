//! Pipeline builder: compiles a normalized AST into a connected graph of
//! operators rooted at a resolved Source.
//!
//! The restricted AST in `ast.rs` has no field describing a relationship
//! join — arbitrary joins-in-WHERE are explicitly out of scope — so
//! `build` only ever implements one fixed procedure (table → filter tree
//! → groupBy-or-aggregate). Composing a
//! [`crate::operators::join::JoinOperator`] across two already-built
//! pipelines is a separate, explicit operation ([`join_pipelines`]) for an
//! embedder that wants hierarchical relationship output; it is not
//! something `build` infers from an AST.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::ast::{Ast, Condition, ConjunctionOp};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{FetchRequest, Node, NodeSchema, NodeStream};
use crate::normalize::{fingerprint, normalize};
use crate::operators::concat::ConcatOperator;
use crate::operators::distinct::DistinctOperator;
use crate::operators::filter::FilterOperator;
use crate::operators::full_aggregate::FullAggregateOperator;
use crate::operators::group_by::GroupByOperator;
use crate::operators::join::{self, JoinOperator};
use crate::operators::{Operator, OperatorRef};
use crate::output::{Fanout, OutputRef};
use crate::predicate::compile_predicate;

/// Maps an AST's `table` name to the Source operator it should be
/// compiled against.
pub trait SourceResolver {
    fn resolve(&self, table: &str) -> Result<OperatorRef, EngineError>;
}

/// The obvious `SourceResolver` for an embedder that registers a handful
/// of tables up front rather than resolving them dynamically.
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<String, OperatorRef>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        SourceRegistry {
            sources: HashMap::new(),
        }
    }

    pub fn register(&mut self, table: impl Into<String>, source: OperatorRef) {
        self.sources.insert(table.into(), source);
    }
}

impl SourceResolver for SourceRegistry {
    fn resolve(&self, table: &str) -> Result<OperatorRef, EngineError> {
        self.sources
            .get(table)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTable(table.to_string()))
    }
}

/// A compiled query: the terminal operator of one AST's chain, plus the
/// two entry points a subscriber uses (`fetch` then `subscribe`).
pub struct PipelineHandle {
    terminal: OperatorRef,
}

impl PipelineHandle {
    pub(crate) fn from_operator(terminal: OperatorRef) -> Self {
        PipelineHandle { terminal }
    }

    pub fn schema(&self) -> NodeSchema {
        self.terminal.borrow().schema().clone()
    }

    /// Initial materialization. Call this exactly once, fully drain it,
    /// and only then attach an `Output` — no upstream change may be
    /// delivered in between.
    pub fn fetch(&self) -> Vec<Node> {
        self.terminal.borrow_mut().fetch(&FetchRequest::all()).collect()
    }

    pub fn subscribe(&self, output: OutputRef) {
        self.terminal.borrow_mut().set_output(output);
    }

    /// Mirrors the initial `fetch` with identical constraints, required
    /// once a subscriber detaches for good so that Join/GroupBy storage
    /// entries don't persist indefinitely.
    pub fn cleanup(&self) -> Vec<Node> {
        self.terminal.borrow_mut().cleanup(&FetchRequest::all()).collect()
    }

    pub fn destroy(&self) {
        self.terminal.borrow_mut().destroy();
    }

    pub(crate) fn operator(&self) -> OperatorRef {
        self.terminal.clone()
    }
}

/// Compiles ASTs into [`PipelineHandle`]s, memoizing by fingerprint so
/// that semantically equivalent queries share one compiled graph.
pub struct PipelineBuilder<R: SourceResolver> {
    resolver: R,
    config: EngineConfig,
    cache: HashMap<u64, Weak<PipelineHandle>>,
}

impl<R: SourceResolver> PipelineBuilder<R> {
    pub fn new(resolver: R, config: EngineConfig) -> Self {
        PipelineBuilder {
            resolver,
            config,
            cache: HashMap::new(),
        }
    }

    /// Compile `ast`, reusing an already-compiled graph when an
    /// equivalent (normalized) AST was built before and its handle is
    /// still alive. A dead `Weak` entry (every prior subscriber dropped
    /// its handle) is simply overwritten with a freshly compiled graph.
    pub fn build(&mut self, ast: &Ast) -> Result<Rc<PipelineHandle>, EngineError> {
        let normalized = normalize(ast);
        let key = fingerprint(&normalized);
        if let Some(handle) = self.cache.get(&key).and_then(Weak::upgrade) {
            return Ok(handle);
        }
        let terminal = compile(&self.resolver, &normalized, &self.config)?;
        let handle = Rc::new(PipelineHandle::from_operator(terminal));
        self.cache.insert(key, Rc::downgrade(&handle));
        Ok(handle)
    }
}

/// Attaches `child`'s pipeline to `parent`'s under a named relationship,
/// for the hierarchical queries the restricted AST can't express on its
/// own. Not memoized — a Join is always an explicit composition the
/// caller asks for, not something `PipelineBuilder::build` would ever
/// infer from two ASTs' fingerprints.
pub fn join_pipelines(
    parent: &Rc<PipelineHandle>,
    child: &Rc<PipelineHandle>,
    parent_key: impl Into<String>,
    child_key: impl Into<String>,
    relationship_name: impl Into<String>,
) -> Result<Rc<PipelineHandle>, EngineError> {
    let join_operator = JoinOperator::build(parent.operator(), child.operator(), parent_key, child_key, relationship_name)?;
    join::wire(&join_operator);
    Ok(Rc::new(PipelineHandle::from_operator(join_operator)))
}

fn compile<R: SourceResolver>(resolver: &R, ast: &Ast, config: &EngineConfig) -> Result<OperatorRef, EngineError> {
    let mut operator = resolver.resolve(&ast.table)?;

    if let Some(condition) = &ast.r#where {
        operator = build_condition(operator, condition, config)?;
    }

    if !ast.group_by.is_empty() {
        operator = GroupByOperator::build(operator, ast.group_by.clone(), ast.aggregate.clone()) as OperatorRef;
    } else if !ast.aggregate.is_empty() {
        operator = FullAggregateOperator::build(operator, ast.aggregate.clone())? as OperatorRef;
    }

    Ok(operator)
}

/// Recursively compiles one `where` subtree atop `input`: a `Simple`
/// leaf becomes one `FilterOperator`; `AND` becomes a
/// sequential chain of filters; `OR` becomes a fan-out into one branch
/// per disjunct, recombined through `Concat` and (unless configured
/// otherwise) `Distinct`.
fn build_condition(input: OperatorRef, condition: &Condition, config: &EngineConfig) -> Result<OperatorRef, EngineError> {
    match condition {
        Condition::Simple { .. } => {
            let predicate = compile_predicate(condition)?;
            let filter = FilterOperator::new(input.clone(), predicate);
            input.borrow_mut().set_output(filter.clone() as OutputRef);
            Ok(filter as OperatorRef)
        }
        Condition::Conjunction {
            op: ConjunctionOp::And,
            conditions,
        } => {
            let mut current = input;
            for cond in conditions {
                current = build_condition(current, cond, config)?;
            }
            Ok(current)
        }
        Condition::Conjunction {
            op: ConjunctionOp::Or,
            conditions,
        } => {
            let fanout = Rc::new(RefCell::new(Fanout::new()));
            input.borrow_mut().set_output(fanout.clone() as OutputRef);

            let mut branches = Vec::with_capacity(conditions.len());
            for cond in conditions {
                let branch_input: OperatorRef = Rc::new(RefCell::new(FanoutInput::new(input.clone(), fanout.clone())));
                branches.push(build_condition(branch_input, cond, config)?);
            }

            let concat = ConcatOperator::new(branches.clone());
            for branch in &branches {
                branch.borrow_mut().set_output(concat.clone() as OutputRef);
            }

            if config.skip_distinct_for_disjoint_or {
                return Ok(concat as OperatorRef);
            }

            let distinct = DistinctOperator::new(concat.clone() as OperatorRef);
            concat.borrow_mut().set_output(distinct.clone() as OutputRef);
            Ok(distinct as OperatorRef)
        }
    }
}

/// One `OR` branch's view of the shared upstream `input`: reads as
/// normal, but `set_output` redirects into the shared [`Fanout`] instead
/// of claiming `input`'s single-output slot. Lets `build_condition`'s
/// recursion treat every input — real or fanned-out — uniformly.
struct FanoutInput {
    input: OperatorRef,
    fanout: Rc<RefCell<Fanout>>,
    schema: NodeSchema,
}

impl FanoutInput {
    fn new(input: OperatorRef, fanout: Rc<RefCell<Fanout>>) -> Self {
        let schema = input.borrow().schema().clone();
        FanoutInput { input, fanout, schema }
    }
}

impl Operator for FanoutInput {
    fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        self.input.borrow_mut().fetch(request)
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        self.input.borrow_mut().cleanup(request)
    }

    fn set_output(&mut self, output: OutputRef) {
        self.fanout.borrow_mut().attach(output);
    }

    /// Each disjunct branch holds its own `FanoutInput`, so the real
    /// shared input is destroyed once per branch here — harmless, since
    /// every `Operator::destroy` in this crate is idempotent.
    fn destroy(&mut self) {
        self.input.borrow_mut().destroy();
    }
}
