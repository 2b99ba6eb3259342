//! Filter: `ΔI(σP(Q)) = σP(ΔI(Q))` — filtering commutes
//! with differencing, so the incremental rule is simply "apply the
//! predicate to whatever changed." `AND`/`OR` composition of several
//! conditions is not this operator's concern: a conjunction becomes a
//! sequential chain of single-predicate `FilterOperator`s, and a
//! disjunction becomes a fan-out/concat/distinct sub-pipeline, both wired
//! by [`crate::pipeline`]. This type only ever holds one compiled leaf
//! condition.

use std::cell::RefCell;
use std::rc::Rc;

use crate::model::{Change, FetchRequest, NodeSchema, NodeStream};
use crate::operators::{Operator, OperatorRef};
use crate::output::{Output, OutputRef};
use crate::predicate::CompiledPredicate;

pub struct FilterOperator {
    input: OperatorRef,
    predicate: Rc<CompiledPredicate>,
    schema: NodeSchema,
    output: Option<OutputRef>,
}

impl FilterOperator {
    /// Construct a filter atop `input`. Does not wire itself as `input`'s
    /// output — the caller decides whether that's a direct `set_output`
    /// (plain `AND` chain) or an attachment into a shared fan-out
    /// broadcaster (one branch of an `OR`).
    pub fn new(input: OperatorRef, predicate: CompiledPredicate) -> Rc<RefCell<FilterOperator>> {
        let schema = input.borrow().schema().clone();
        Rc::new(RefCell::new(FilterOperator {
            input,
            predicate: Rc::new(predicate),
            schema,
            output: None,
        }))
    }

    fn forward(&mut self, change: Change) {
        if let Some(output) = &self.output {
            output.borrow_mut().push(change);
        }
    }
}

impl Operator for FilterOperator {
    fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        let predicate = self.predicate.clone();
        let upstream = self.input.borrow_mut().fetch(request);
        Box::new(upstream.filter(move |node| predicate.eval(&node.row)))
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        let predicate = self.predicate.clone();
        let upstream = self.input.borrow_mut().cleanup(request);
        Box::new(upstream.filter(move |node| predicate.eval(&node.row)))
    }

    fn set_output(&mut self, output: OutputRef) {
        self.output = Some(output);
    }

    fn destroy(&mut self) {
        self.input.borrow_mut().destroy();
        self.output = None;
    }
}

impl Output for FilterOperator {
    fn push(&mut self, change: Change) {
        match &change {
            Change::Add { node } | Change::Remove { node } => {
                if self.predicate.eval(&node.row) {
                    self.forward(change);
                }
            }
            Change::Child { row, .. } => {
                if self.predicate.eval(row) {
                    self.forward(change);
                }
            }
        }
    }
}
