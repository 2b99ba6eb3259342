//! Concat: union of N inputs, in input order. Used to
//! recombine the branches of an `OR` fan-out before deduplication.
//!
//! Concat never inspects a change's content, so unlike [`super::join`] it
//! needs no per-input sink to tell inputs apart: every input simply
//! attaches the same `ConcatOperator` as its output, and pushes pass
//! straight through.

use std::cell::RefCell;
use std::rc::Rc;

use crate::model::{Change, FetchRequest, NodeSchema, NodeStream};
use crate::operators::{Operator, OperatorRef};
use crate::output::{Output, OutputRef};

pub struct ConcatOperator {
    inputs: Vec<OperatorRef>,
    schema: NodeSchema,
    output: Option<OutputRef>,
}

impl ConcatOperator {
    pub fn new(inputs: Vec<OperatorRef>) -> Rc<RefCell<ConcatOperator>> {
        assert!(!inputs.is_empty(), "Concat requires at least one input");
        let schema = inputs[0].borrow().schema().clone();
        Rc::new(RefCell::new(ConcatOperator {
            inputs,
            schema,
            output: None,
        }))
    }
}

impl Operator for ConcatOperator {
    fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        let streams: Vec<NodeStream> = self
            .inputs
            .iter()
            .map(|input| input.borrow_mut().fetch(request))
            .collect();
        Box::new(streams.into_iter().flatten())
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        let streams: Vec<NodeStream> = self
            .inputs
            .iter()
            .map(|input| input.borrow_mut().cleanup(request))
            .collect();
        Box::new(streams.into_iter().flatten())
    }

    fn set_output(&mut self, output: OutputRef) {
        self.output = Some(output);
    }

    fn destroy(&mut self) {
        for input in &self.inputs {
            input.borrow_mut().destroy();
        }
        self.output = None;
    }
}

impl Output for ConcatOperator {
    fn push(&mut self, change: Change) {
        if let Some(output) = &self.output {
            output.borrow_mut().push(change);
        }
    }
}
