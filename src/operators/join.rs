//! Join: attaches a `child` input to a `parent` input under a named
//! relationship.
//!
//! A Join has two logical inputs, which breaks the rest of this module's
//! "an operator receives pushes by implementing `Output`" convention —
//! one `Output` impl can't tell which side called it. [`JoinParentSink`]
//! and [`JoinChildSink`] are thin wrappers that close over which side
//! they were attached to and route into [`JoinOperator::push_from_parent`]
//! / [`JoinOperator::push_from_child`] accordingly; the pipeline builder
//! attaches one of each to the parent and child inputs' single-output
//! slots instead of attaching `JoinOperator` itself to either.

use std::cell::RefCell;
use std::rc::Rc;

use crate::assert_invariant;
use crate::error::EngineError;
use crate::model::{Change, FetchRequest, LazyNodeStream, Node, NodeSchema, NodeStream, Primitive, Row};
use crate::operators::{Operator, OperatorRef};
use crate::output::{Output, OutputRef};
use crate::storage::{Storage, StorageValue};

fn pkey_set_prefix(key_value: &Primitive) -> String {
    format!("pKeySet,{},", key_value.encode())
}

fn pkey_set_entry(key_value: &Primitive, parent_pk: &str) -> String {
    format!("{}{},", pkey_set_prefix(key_value), parent_pk)
}

pub struct JoinOperator {
    parent: OperatorRef,
    child: OperatorRef,
    parent_key: String,
    child_key: String,
    relationship_name: String,
    schema: NodeSchema,
    storage: Storage,
    output: Option<OutputRef>,
}

impl JoinOperator {
    pub fn build(
        parent: OperatorRef,
        child: OperatorRef,
        parent_key: impl Into<String>,
        child_key: impl Into<String>,
        relationship_name: impl Into<String>,
    ) -> Result<Rc<RefCell<JoinOperator>>, EngineError> {
        if Rc::ptr_eq(&parent, &child) {
            return Err(EngineError::JoinSelfReference);
        }
        let relationship_name = relationship_name.into();
        let schema = parent
            .borrow()
            .schema()
            .clone()
            .with_relationship(relationship_name.clone(), child.borrow().schema().clone());
        Ok(Rc::new(RefCell::new(JoinOperator {
            parent,
            child,
            parent_key: parent_key.into(),
            child_key: child_key.into(),
            relationship_name,
            schema,
            storage: Storage::new(),
            output: None,
        })))
    }

    fn primary_key(&self) -> Vec<String> {
        self.schema.schema.primary_key.clone()
    }

    fn attach_child_stream(&mut self, node: Node, cleanup_mode: bool) -> Node {
        let key_value = node.pk_value(&self.parent_key).clone();
        let parent_pk = node.pk_encoded(&self.primary_key());
        self.storage.set(pkey_set_entry(&key_value, &parent_pk), StorageValue::Present);

        let child = self.child.clone();
        let child_key = self.child_key.clone();
        let stream = LazyNodeStream::new(move || {
            let request = FetchRequest::constrained(child_key, key_value);
            if cleanup_mode {
                child.borrow_mut().cleanup(&request)
            } else {
                child.borrow_mut().fetch(&request)
            }
        });
        node.with_relationship(self.relationship_name.clone(), stream)
    }

    /// Releases this node's `pKeySet` entry and attaches a child stream,
    /// pulled in cleanup mode only if no sibling parent still shares its
    /// join-key value (sibling-aware teardown).
    fn detach_child_stream(&mut self, node: Node) -> Node {
        let key_value = node.pk_value(&self.parent_key).clone();
        let parent_pk = node.pk_encoded(&self.primary_key());
        let prefix = pkey_set_prefix(&key_value);
        let sibling_remains = self.storage.count_prefix(&prefix) >= 2;
        self.storage.del(&pkey_set_entry(&key_value, &parent_pk));

        let child = self.child.clone();
        let child_key = self.child_key.clone();
        let stream = LazyNodeStream::new(move || {
            let request = FetchRequest::constrained(child_key, key_value);
            if sibling_remains {
                child.borrow_mut().fetch(&request)
            } else {
                child.borrow_mut().cleanup(&request)
            }
        });
        node.with_relationship(self.relationship_name.clone(), stream)
    }

    fn forward(&mut self, change: Change) {
        if let Some(output) = &self.output {
            output.borrow_mut().push(change);
        }
    }

    pub(crate) fn push_from_parent(&mut self, change: Change) {
        match change {
            Change::Add { node } => {
                let node = self.attach_child_stream(node, false);
                self.forward(Change::Add { node });
            }
            Change::Remove { node } => {
                let node = self.detach_child_stream(node);
                self.forward(Change::Remove { node });
            }
            child_change @ Change::Child { .. } => {
                self.forward(child_change);
            }
        }
    }

    pub(crate) fn push_from_child(&mut self, mut change: Change) {
        let child_value = change
            .subject_row()
            .get(&self.child_key)
            .cloned()
            .unwrap_or(Primitive::Null);
        let matching_parent_rows: Vec<Row> = self
            .parent
            .borrow_mut()
            .fetch(&FetchRequest::constrained(self.parent_key.clone(), child_value))
            .map(|node| node.row)
            .collect();

        assert_invariant!(
            !matching_parent_rows.is_empty() || !matches!(&change, Change::Child { .. }),
            "OrphanedChildChange: received a nested child change for relationship `{}` but no parent row matches its join key",
            self.relationship_name
        );

        let len = matching_parent_rows.len();
        for parent_row in matching_parent_rows.iter().take(len.saturating_sub(1)) {
            self.forward(Change::child(
                parent_row.clone(),
                self.relationship_name.clone(),
                change.duplicate(),
            ));
        }
        if let Some(last_row) = matching_parent_rows.into_iter().last() {
            self.forward(Change::child(last_row, self.relationship_name.clone(), change));
        }
    }
}

impl Operator for JoinOperator {
    fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        let nodes: Vec<Node> = self.parent.borrow_mut().fetch(request).collect();
        let attached: Vec<Node> = nodes
            .into_iter()
            .map(|node| self.attach_child_stream(node, false))
            .collect();
        Box::new(attached.into_iter())
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        let nodes: Vec<Node> = self.parent.borrow_mut().cleanup(request).collect();
        let detached: Vec<Node> = nodes.into_iter().map(|node| self.detach_child_stream(node)).collect();
        Box::new(detached.into_iter())
    }

    fn set_output(&mut self, output: OutputRef) {
        self.output = Some(output);
    }

    fn destroy(&mut self) {
        self.parent.borrow_mut().destroy();
        self.child.borrow_mut().destroy();
        self.storage = Storage::new();
        self.output = None;
    }
}

/// Attaches to the parent input's single-output slot; routes pushes into
/// [`JoinOperator::push_from_parent`].
pub struct JoinParentSink(pub Rc<RefCell<JoinOperator>>);

impl Output for JoinParentSink {
    fn push(&mut self, change: Change) {
        self.0.borrow_mut().push_from_parent(change);
    }
}

/// Attaches to the child input's single-output slot; routes pushes into
/// [`JoinOperator::push_from_child`].
pub struct JoinChildSink(pub Rc<RefCell<JoinOperator>>);

impl Output for JoinChildSink {
    fn push(&mut self, change: Change) {
        self.0.borrow_mut().push_from_child(change);
    }
}

/// Wire `join` as both inputs' downstream consumer via the sink wrappers
/// above. Call once, right after [`JoinOperator::build`].
pub fn wire(join: &Rc<RefCell<JoinOperator>>) {
    let parent = join.borrow().parent.clone();
    let child = join.borrow().child.clone();
    parent
        .borrow_mut()
        .set_output(crate::output::output_ref(JoinParentSink(join.clone())));
    child
        .borrow_mut()
        .set_output(crate::output::output_ref(JoinChildSink(join.clone())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSchema, ColumnType, Schema};
    use crate::output::RecordingOutput;
    use crate::source::{RowChange, Source};

    fn parent_schema() -> Schema {
        Schema::new(
            vec![
                ColumnSchema::new("id", ColumnType::String, false),
                ColumnSchema::new("uid", ColumnType::String, false),
            ],
            vec!["id".into()],
        )
    }

    fn child_schema() -> Schema {
        Schema::new(
            vec![
                ColumnSchema::new("id", ColumnType::String, false),
                ColumnSchema::new("uid", ColumnType::String, false),
            ],
            vec!["id".into()],
        )
    }

    fn parent_row(id: &str, uid: &str) -> Row {
        let mut r = Row::new();
        r.insert("id".into(), Primitive::String(id.into()));
        r.insert("uid".into(), Primitive::String(uid.into()));
        r
    }

    fn build_join() -> (Rc<RefCell<Source>>, Rc<RefCell<Source>>, Rc<RefCell<JoinOperator>>) {
        let parent = Rc::new(RefCell::new(Source::new("parents", parent_schema())));
        let child = Rc::new(RefCell::new(Source::new("children", child_schema())));
        let join = JoinOperator::build(
            parent.clone() as OperatorRef,
            child.clone() as OperatorRef,
            "uid",
            "uid",
            "children",
        )
        .unwrap();
        wire(&join);
        (parent, child, join)
    }

    #[test]
    fn rejects_self_reference() {
        let source = Rc::new(RefCell::new(Source::new("s", parent_schema())));
        let err = JoinOperator::build(
            source.clone() as OperatorRef,
            source as OperatorRef,
            "uid",
            "uid",
            "rel",
        )
        .unwrap_err();
        assert_eq!(err, EngineError::JoinSelfReference);
    }

    #[test]
    fn fetch_attaches_matching_children() {
        let (parent, child, join) = build_join();
        parent.borrow_mut().push(RowChange::Add(parent_row("p1", "u1"))).unwrap();
        child.borrow_mut().push(RowChange::Add(parent_row("c1", "u1"))).unwrap();

        let nodes: Vec<_> = join.borrow_mut().fetch(&FetchRequest::all()).collect();
        assert_eq!(nodes.len(), 1);
        let children: Vec<_> = nodes.into_iter().next().unwrap().relationships.remove("children").unwrap().collect();
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn child_add_emits_one_child_change_per_matching_parent() {
        let (parent, child, join) = build_join();
        parent.borrow_mut().push(RowChange::Add(parent_row("i1", "u1"))).unwrap();
        parent.borrow_mut().push(RowChange::Add(parent_row("i2", "u1"))).unwrap();

        let recorder = Rc::new(RefCell::new(RecordingOutput::new()));
        join.borrow_mut().set_output(recorder.clone() as OutputRef);

        child.borrow_mut().push(RowChange::Add(parent_row("c1", "u1"))).unwrap();

        assert_eq!(recorder.borrow().changes.len(), 2);
        for change in &recorder.borrow().changes {
            assert!(matches!(change, Change::Child { .. }));
        }
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn nested_child_change_with_no_matching_parent_is_an_invariant_violation() {
        let (_parent, _child, join) = build_join();
        let orphan_row = parent_row("c1", "u1");
        join.borrow_mut().push_from_child(Change::child(
            orphan_row.clone(),
            "grandchildren",
            Change::Add {
                node: Node::new(orphan_row),
            },
        ));
    }

    #[test]
    fn cleanup_preserves_child_subtree_while_sibling_remains() {
        let (parent, child, join) = build_join();
        parent.borrow_mut().push(RowChange::Add(parent_row("i1", "u1"))).unwrap();
        parent.borrow_mut().push(RowChange::Add(parent_row("i2", "u1"))).unwrap();
        child.borrow_mut().push(RowChange::Add(parent_row("c1", "u1"))).unwrap();

        join.borrow_mut()
            .cleanup(&FetchRequest::constrained("id", Primitive::String("i1".into())))
            .for_each(drop);

        // sibling i2 still references uid=u1, so the child subtree must
        // not have been torn down — a later fetch still sees it.
        let nodes: Vec<_> = join
            .borrow_mut()
            .fetch(&FetchRequest::constrained("id", Primitive::String("i2".into())))
            .collect();
        let children: Vec<_> = nodes.into_iter().next().unwrap().relationships.remove("children").unwrap().collect();
        assert_eq!(children.len(), 1);

        join.borrow_mut()
            .cleanup(&FetchRequest::constrained("id", Primitive::String("i2".into())))
            .for_each(drop);
        // both parents cleaned up now; nothing left to assert on besides
        // absence of a panic during storage bookkeeping.
    }
}
