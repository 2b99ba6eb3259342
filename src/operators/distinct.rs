//! Distinct: reference-counted deduplication by primary
//! key. Sits downstream of [`super::concat::ConcatOperator`] to collapse
//! an `OR` fan-out back to one row per key, forwarding an `Add` only on
//! the first occurrence and a `Remove` only once every occurrence has
//! been retracted.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use crate::assert_invariant;
use crate::model::{Change, FetchRequest, NodeSchema, NodeStream, Row};
use crate::operators::{Operator, OperatorRef};
use crate::output::{Output, OutputRef};

pub struct DistinctOperator {
    input: OperatorRef,
    schema: NodeSchema,
    primary_key: Vec<String>,
    /// Key → (last-seen row, live reference count).
    counts: BTreeMap<String, (Row, usize)>,
    output: Option<OutputRef>,
}

impl DistinctOperator {
    pub fn new(input: OperatorRef) -> Rc<RefCell<DistinctOperator>> {
        let schema = input.borrow().schema().clone();
        let primary_key = schema.schema.primary_key.clone();
        Rc::new(RefCell::new(DistinctOperator {
            input,
            schema,
            primary_key,
            counts: BTreeMap::new(),
            output: None,
        }))
    }

    fn forward(&mut self, change: Change) {
        if let Some(output) = &self.output {
            output.borrow_mut().push(change);
        }
    }
}

impl Operator for DistinctOperator {
    fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        let mut seen = HashSet::new();
        let primary_key = self.primary_key.clone();
        let upstream = self.input.borrow_mut().fetch(request);
        Box::new(upstream.filter(move |node| seen.insert(node.pk_encoded(&primary_key))))
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        let mut seen = HashSet::new();
        let primary_key = self.primary_key.clone();
        let upstream = self.input.borrow_mut().cleanup(request);
        Box::new(upstream.filter(move |node| seen.insert(node.pk_encoded(&primary_key))))
    }

    fn set_output(&mut self, output: OutputRef) {
        self.output = Some(output);
    }

    fn destroy(&mut self) {
        self.input.borrow_mut().destroy();
        self.counts.clear();
        self.output = None;
    }
}

impl Output for DistinctOperator {
    fn push(&mut self, change: Change) {
        match &change {
            Change::Add { node } => {
                let key = node.pk_encoded(&self.primary_key);
                let entry = self
                    .counts
                    .entry(key)
                    .or_insert_with(|| (node.row.clone(), 0));
                entry.1 += 1;
                let first_occurrence = entry.1 == 1;
                if first_occurrence {
                    self.forward(change);
                }
            }
            Change::Remove { node } => {
                let key = node.pk_encoded(&self.primary_key);
                let last_occurrence = match self.counts.get_mut(&key) {
                    Some(entry) => {
                        entry.1 = entry.1.saturating_sub(1);
                        entry.1 == 0
                    }
                    None => false,
                };
                if last_occurrence {
                    self.counts.remove(&key);
                    self.forward(change);
                }
            }
            Change::Child { .. } => {
                assert_invariant!(
                    false,
                    "Distinct received a Child change; it only ever follows an OR fan-out over a Source"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSchema, ColumnType, Primitive, Schema};
    use crate::output::RecordingOutput;
    use crate::source::{RowChange, Source};

    fn schema() -> Schema {
        Schema::new(vec![ColumnSchema::new("id", ColumnType::String, false)], vec!["id".into()])
    }

    fn row(id: &str) -> Row {
        let mut r = Row::new();
        r.insert("id".into(), Primitive::String(id.into()));
        r
    }

    fn wire() -> (
        Rc<RefCell<Source>>,
        Rc<RefCell<DistinctOperator>>,
        Rc<RefCell<RecordingOutput>>,
    ) {
        let source = Rc::new(RefCell::new(Source::new("items", schema())));
        let distinct = DistinctOperator::new(source.clone() as OperatorRef);
        source.borrow_mut().set_output(distinct.clone() as OutputRef);
        let recorder = Rc::new(RefCell::new(RecordingOutput::new()));
        distinct.borrow_mut().set_output(recorder.clone() as OutputRef);
        (source, distinct, recorder)
    }

    #[test]
    fn duplicate_adds_forward_only_once() {
        let (_source, distinct, recorder) = wire();
        distinct.borrow_mut().push(Change::Add {
            node: crate::model::Node::new(row("i1")),
        });
        distinct.borrow_mut().push(Change::Add {
            node: crate::model::Node::new(row("i1")),
        });
        assert_eq!(recorder.borrow().changes.len(), 1);
    }

    #[test]
    fn remove_forwards_only_after_last_reference() {
        let (_source, distinct, recorder) = wire();
        distinct.borrow_mut().push(Change::Add {
            node: crate::model::Node::new(row("i1")),
        });
        distinct.borrow_mut().push(Change::Add {
            node: crate::model::Node::new(row("i1")),
        });
        distinct.borrow_mut().push(Change::Remove {
            node: crate::model::Node::new(row("i1")),
        });
        assert_eq!(recorder.borrow().changes.len(), 1);
        distinct.borrow_mut().push(Change::Remove {
            node: crate::model::Node::new(row("i1")),
        });
        assert_eq!(recorder.borrow().changes.len(), 2);
    }

    #[test]
    fn fetch_deduplicates_by_primary_key() {
        let (source, distinct, _recorder) = wire();
        source.borrow_mut().push(RowChange::Add(row("i1"))).unwrap();
        let nodes: Vec<_> = distinct.borrow_mut().fetch(&FetchRequest::all()).collect();
        assert_eq!(nodes.len(), 1);
    }
}
