//! GroupBy + Aggregate.
//!
//! Group key: a JSON-encoded tuple of the group columns' values, in
//! declared order (`serde_json`, matching the data model's use of the
//! same crate for wire-shaped values elsewhere). Value identity within a
//! group is the member row's primary key, so a group's membership is
//! tracked as an insertion-ordered map from primary key to row —
//! insertion order is what makes `array` preserve its own ordering and
//! `min`/`max` ties resolve to "first-seen" without any extra
//! bookkeeping, since both are recomputed by scanning current members.
//!
//! Emission shape for updates: this operator emits `remove` then `add`
//! rather than an in-place `child` update (either is a valid choice here).
//! A `child` update would still need to carry a full
//! replacement row for the subscriber to apply, so it buys nothing over
//! `remove`+`add` here and keeps this operator's emission path identical
//! to `full_aggregate`'s.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::assert_invariant;
use crate::ast::{AggregateFn, Aggregation};
use crate::model::{Change, ColumnSchema, ColumnType, FetchRequest, Node, NodeSchema, NodeStream, Primitive, Row, Schema};
use crate::operators::{Operator, OperatorRef};
use crate::output::{Output, OutputRef};
use crate::predicate::{as_f64, compare_primitives};

fn primitive_to_json(value: &Primitive) -> serde_json::Value {
    match value {
        Primitive::Null => serde_json::Value::Null,
        Primitive::Bool(b) => serde_json::Value::Bool(*b),
        Primitive::Int(i) => serde_json::Value::from(*i),
        Primitive::Float(f) => serde_json::json!(*f),
        Primitive::String(s) => serde_json::Value::String(s.clone()),
        Primitive::Array(items) => serde_json::Value::Array(items.iter().map(primitive_to_json).collect()),
    }
}

fn group_key(row: &Row, group_columns: &[String]) -> String {
    let values: Vec<serde_json::Value> = group_columns
        .iter()
        .map(|c| primitive_to_json(row.get(c).unwrap_or(&Primitive::Null)))
        .collect();
    serde_json::to_string(&values).expect("a tuple of JSON primitives always serializes")
}

#[derive(Default)]
struct GroupState {
    members: IndexMap<String, Row>,
}

fn sum_field(members: &IndexMap<String, Row>, field: &str) -> f64 {
    members.values().map(|r| r.get(field).map(as_f64).unwrap_or(0.0)).sum()
}

fn min_field(members: &IndexMap<String, Row>, field: &str) -> Primitive {
    members
        .values()
        .filter_map(|r| r.get(field).cloned())
        .fold(None, |acc, v| match acc {
            None => Some(v),
            Some(cur) => {
                if compare_primitives(&v, &cur) == Some(std::cmp::Ordering::Less) {
                    Some(v)
                } else {
                    Some(cur)
                }
            }
        })
        .unwrap_or(Primitive::Null)
}

fn max_field(members: &IndexMap<String, Row>, field: &str) -> Primitive {
    members
        .values()
        .filter_map(|r| r.get(field).cloned())
        .fold(None, |acc, v| match acc {
            None => Some(v),
            Some(cur) => {
                if compare_primitives(&v, &cur) == Some(std::cmp::Ordering::Greater) {
                    Some(v)
                } else {
                    Some(cur)
                }
            }
        })
        .unwrap_or(Primitive::Null)
}

fn compute_row(members: &IndexMap<String, Row>, aggregations: &[Aggregation]) -> Row {
    let mut row = members
        .values()
        .next()
        .cloned()
        .expect("compute_row is only called on a non-empty group");
    for agg in aggregations {
        let field = agg.field.as_deref().unwrap_or_default();
        let value = match agg.aggregate {
            AggregateFn::Count => Primitive::Int(members.len() as i64),
            AggregateFn::Sum => Primitive::Float(sum_field(members, field)),
            AggregateFn::Avg => Primitive::Float(sum_field(members, field) / members.len() as f64),
            AggregateFn::Min => min_field(members, field),
            AggregateFn::Max => max_field(members, field),
            AggregateFn::Array => {
                Primitive::Array(members.values().filter_map(|r| r.get(field)).cloned().collect())
            }
        };
        row.insert(agg.alias.clone(), value);
    }
    row
}

fn output_schema(input_schema: &NodeSchema, aggregations: &[Aggregation]) -> NodeSchema {
    let mut columns = input_schema.schema.columns.clone();
    for agg in aggregations {
        columns.push(ColumnSchema::new(agg.alias.clone(), ColumnType::Any, true));
    }
    NodeSchema::leaf(Schema::new(columns, input_schema.schema.primary_key.clone()))
}

pub struct GroupByOperator {
    input: OperatorRef,
    group_columns: Vec<String>,
    aggregations: Vec<Aggregation>,
    schema: NodeSchema,
    primary_key: Vec<String>,
    groups: IndexMap<String, GroupState>,
    output: Option<OutputRef>,
}

impl GroupByOperator {
    pub fn build(
        input: OperatorRef,
        group_columns: Vec<String>,
        aggregations: Vec<Aggregation>,
    ) -> Rc<RefCell<GroupByOperator>> {
        let input_schema = input.borrow().schema().clone();
        let primary_key = input_schema.schema.primary_key.clone();
        let schema = output_schema(&input_schema, &aggregations);
        Rc::new(RefCell::new(GroupByOperator {
            input,
            group_columns,
            aggregations,
            schema,
            primary_key,
            groups: IndexMap::new(),
            output: None,
        }))
    }

    fn forward(&mut self, change: Change) {
        if let Some(output) = &self.output {
            output.borrow_mut().push(change);
        }
    }

    fn push_add(&mut self, node: Node) {
        let key = group_key(&node.row, &self.group_columns);
        let pk = node.pk_encoded(&self.primary_key);
        let group = self.groups.entry(key).or_default();
        let old_row = (!group.members.is_empty()).then(|| compute_row(&group.members, &self.aggregations));
        group.members.insert(pk, node.row);
        let new_row = compute_row(&group.members, &self.aggregations);

        if let Some(old_row) = old_row {
            self.forward(Change::Remove { node: Node::new(old_row) });
        }
        self.forward(Change::Add { node: Node::new(new_row) });
    }

    fn push_remove(&mut self, node: Node) {
        let key = group_key(&node.row, &self.group_columns);
        let pk = node.pk_encoded(&self.primary_key);

        let Some(group) = self.groups.get_mut(&key) else {
            return;
        };
        let old_row = compute_row(&group.members, &self.aggregations);
        group.members.shift_remove(&pk);

        if group.members.is_empty() {
            self.groups.shift_remove(&key);
            self.forward(Change::Remove { node: Node::new(old_row) });
        } else {
            let new_row = compute_row(&group.members, &self.aggregations);
            self.forward(Change::Remove { node: Node::new(old_row) });
            self.forward(Change::Add { node: Node::new(new_row) });
        }
    }
}

impl Operator for GroupByOperator {
    fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        let mut groups: IndexMap<String, GroupState> = IndexMap::new();
        let group_columns = self.group_columns.clone();
        let primary_key = self.primary_key.clone();
        for node in self.input.borrow_mut().fetch(request) {
            let key = group_key(&node.row, &group_columns);
            let pk = node.pk_encoded(&primary_key);
            groups.entry(key).or_default().members.insert(pk, node.row);
        }
        let aggregations = self.aggregations.clone();
        let rows: Vec<Node> = groups
            .values()
            .map(|g| Node::new(compute_row(&g.members, &aggregations)))
            .collect();
        Box::new(rows.into_iter())
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        self.fetch(request)
    }

    fn set_output(&mut self, output: OutputRef) {
        self.output = Some(output);
    }

    fn destroy(&mut self) {
        self.input.borrow_mut().destroy();
        self.groups.clear();
        self.output = None;
    }
}

impl Output for GroupByOperator {
    fn push(&mut self, change: Change) {
        match change {
            Change::Add { node } => self.push_add(node),
            Change::Remove { node } => self.push_remove(node),
            Change::Child { .. } => {
                assert_invariant!(
                    false,
                    "GroupBy received a Child change; it has no relationships of its own"
                );
            }
        }
    }
}
