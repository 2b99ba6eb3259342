//! Source: the entry point for one upstream table.
//!
//! Owns a primary-key index plus lazily-built secondary indexes for
//! columns used as join/constraint keys, and fans pushed row changes out
//! to every attached output in insertion order.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::assert_invariant;
use crate::error::EngineError;
use crate::model::{Change, FetchRequest, Node, NodeSchema, NodeStream, Row, Schema};
use crate::operators::Operator;
use crate::output::OutputRef;

/// One upstream row mutation, as handed in by the replication ingestion
/// path: updates decompose into remove then add before reaching here.
#[derive(Debug, Clone)]
pub enum RowChange {
    Add(Row),
    Remove(Row),
}

/// Reserved by the replication protocol: a column with this name, or a
/// table/schema named [`RESERVED_SCHEMA_NAME`], may never appear in
/// schema metadata handed into this crate.
pub const RESERVED_COLUMN_NAME: &str = "_0_version";
pub const RESERVED_SCHEMA_NAME: &str = "_zero";

fn check_reserved_names(name: &str, schema: &Schema) -> Result<(), EngineError> {
    if name == RESERVED_SCHEMA_NAME {
        return Err(EngineError::ReservedSchemaName(name.to_string()));
    }
    for column in &schema.columns {
        if column.name == RESERVED_COLUMN_NAME {
            return Err(EngineError::ReservedColumnName(column.name.clone()));
        }
    }
    Ok(())
}

fn encode_pk(primary_key: &[String], row: &Row) -> Result<String, EngineError> {
    let mut parts = Vec::with_capacity(primary_key.len());
    for col in primary_key {
        let value = row
            .get(col)
            .ok_or_else(|| EngineError::MissingPrimaryKeyColumn(col.clone()))?;
        if value.is_null() {
            return Err(EngineError::NullPrimaryKeyColumn(col.clone()));
        }
        parts.push(value.encode());
    }
    Ok(crate::model::encode_parts(parts))
}

pub struct Source {
    name: String,
    schema: NodeSchema,
    rows: BTreeMap<String, Row>,
    secondary_indexes: HashMap<String, BTreeMap<String, Vec<String>>>,
    outputs: Vec<OutputRef>,
}

impl Source {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Source {
            name: name.into(),
            schema: NodeSchema::leaf(schema),
            rows: BTreeMap::new(),
            secondary_indexes: HashMap::new(),
            outputs: Vec::new(),
        }
    }

    /// Validates `schema` against the reserved-name constraints before
    /// constructing. The replication ingestion layer is expected to call
    /// this (not [`Source::new`]) when registering a table whose schema
    /// metadata it doesn't already trust.
    pub fn try_new(name: impl Into<String>, schema: Schema) -> Result<Self, EngineError> {
        let name = name.into();
        check_reserved_names(&name, &schema)?;
        Ok(Source::new(name, schema))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    pub fn attach_output(&mut self, output: OutputRef) {
        self.outputs.push(output);
    }

    pub fn detach_output(&mut self, output: &OutputRef) {
        self.outputs.retain(|o| !Rc::ptr_eq(o, output));
    }

    fn ensure_index(&mut self, column: &str) {
        if self.secondary_indexes.contains_key(column) {
            return;
        }
        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (pk, row) in &self.rows {
            if let Some(value) = row.get(column) {
                index.entry(value.encode()).or_default().push(pk.clone());
            }
        }
        self.secondary_indexes.insert(column.to_string(), index);
    }

    fn index_insert(&mut self, pk: &str, row: &Row) {
        for (column, index) in &mut self.secondary_indexes {
            if let Some(value) = row.get(column) {
                index.entry(value.encode()).or_default().push(pk.to_string());
            }
        }
    }

    fn index_remove(&mut self, pk: &str, row: &Row) {
        for (column, index) in &mut self.secondary_indexes {
            if let Some(value) = row.get(column) {
                if let Some(pks) = index.get_mut(&value.encode()) {
                    pks.retain(|p| p != pk);
                }
            }
        }
    }

    fn matching_rows(&mut self, request: &FetchRequest) -> Vec<Row> {
        match &request.constraint {
            None => self.rows.values().cloned().collect(),
            Some(constraint) => {
                self.ensure_index(&constraint.key);
                let encoded = constraint.value.encode();
                self.secondary_indexes
                    .get(&constraint.key)
                    .and_then(|idx| idx.get(&encoded))
                    .map(|pks| pks.iter().filter_map(|pk| self.rows.get(pk)).cloned().collect())
                    .unwrap_or_default()
            }
        }
    }

    pub fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        let rows = self.matching_rows(request);
        Box::new(rows.into_iter().map(Node::new))
    }

    /// Identical to `fetch`; Sources hold no per-constraint state to
    /// release, so cleanup is a plain re-read.
    pub fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        self.fetch(request)
    }

    /// Apply one upstream row mutation and fan the resulting change out to
    /// every attached output, in attachment order.
    pub fn push(&mut self, change: RowChange) -> Result<(), EngineError> {
        match change {
            RowChange::Add(row) => {
                let key = encode_pk(&self.schema.schema.primary_key, &row)?;
                trace!(source = %self.name, pk = %key, "source add");
                assert_invariant!(
                    !self.rows.contains_key(&key),
                    "DuplicateAdd: source `{}` received an add for pk `{key}` without an intervening remove",
                    self.name
                );
                self.index_insert(&key, &row);
                self.rows.insert(key, row.clone());
                self.broadcast(Change::Add { node: Node::new(row) });
            }
            RowChange::Remove(row) => {
                let key = encode_pk(&self.schema.schema.primary_key, &row)?;
                trace!(source = %self.name, pk = %key, "source remove");
                self.rows.remove(&key);
                self.index_remove(&key, &row);
                self.broadcast(Change::Remove { node: Node::new(row) });
            }
        }
        Ok(())
    }

    fn broadcast(&mut self, mut change: Change) {
        let len = self.outputs.len();
        for output in self.outputs.iter().take(len.saturating_sub(1)) {
            output.borrow_mut().push(change.duplicate());
        }
        if let Some(last) = self.outputs.last() {
            last.borrow_mut().push(change);
        }
    }
}

/// A Source is itself an `Operator` input for generic operator wiring — it
/// just happens to support more than one attached output, so `set_output`
/// adds to the list rather than replacing a single slot. It fans out to
/// every attached output.
impl Operator for Source {
    fn schema(&self) -> &NodeSchema {
        self.schema()
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        self.fetch(request)
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        self.cleanup(request)
    }

    fn set_output(&mut self, output: OutputRef) {
        self.attach_output(output);
    }

    fn destroy(&mut self) {
        self.outputs.clear();
    }
}
