//! Full-table aggregate: used when `aggregate` is
//! present without a `groupBy`. Only `count`/`sum`/`avg` make sense over
//! the whole table — `min`/`max`/`array` are rejected at build time
//! rather than silently producing a one-row "group."
//!
//! Emission shape for updates follows the same choice GroupBy makes: this
//! operator always emits `remove` then `add` rather than an in-place
//! `child` update, for the same reason GroupBy does — see
//! `operators::group_by` and `DESIGN.md`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::assert_invariant;
use crate::ast::{AggregateFn, Aggregation};
use crate::error::EngineError;
use crate::model::{Change, ColumnSchema, ColumnType, FetchRequest, Node, NodeSchema, NodeStream, Primitive, Row, Schema};
use crate::operators::{Operator, OperatorRef};
use crate::output::{Output, OutputRef};
use crate::predicate::as_f64;

const AGGREGATE_KEY_COLUMN: &str = "_aggregate_key";
const AGGREGATE_KEY_VALUE: &str = "_all";

#[derive(Default)]
struct AggregateState {
    count: i64,
    sums: HashMap<String, f64>,
}

impl AggregateState {
    fn apply(&mut self, row: &Row, aggregations: &[Aggregation], sign: i64) {
        self.count += sign;
        for agg in aggregations {
            if let Some(field) = &agg.field {
                if matches!(agg.aggregate, AggregateFn::Sum | AggregateFn::Avg) {
                    let value = row.get(field).map(as_f64).unwrap_or(0.0);
                    *self.sums.entry(field.clone()).or_insert(0.0) += value * sign as f64;
                }
            }
        }
    }

    fn to_row(&self, aggregations: &[Aggregation]) -> Row {
        let mut row = Row::new();
        row.insert(
            AGGREGATE_KEY_COLUMN.to_string(),
            Primitive::String(AGGREGATE_KEY_VALUE.to_string()),
        );
        for agg in aggregations {
            let value = match agg.aggregate {
                AggregateFn::Count => Primitive::Int(self.count),
                AggregateFn::Sum => {
                    let field = agg.field.as_deref().unwrap_or_default();
                    Primitive::Float(*self.sums.get(field).unwrap_or(&0.0))
                }
                AggregateFn::Avg => {
                    let field = agg.field.as_deref().unwrap_or_default();
                    if self.count == 0 {
                        Primitive::Null
                    } else {
                        Primitive::Float(self.sums.get(field).unwrap_or(&0.0) / self.count as f64)
                    }
                }
                AggregateFn::Min | AggregateFn::Max | AggregateFn::Array => {
                    unreachable!("rejected at build time")
                }
            };
            row.insert(agg.alias.clone(), value);
        }
        row
    }
}

fn aggregate_over(rows: impl Iterator<Item = Row>, aggregations: &[Aggregation]) -> AggregateState {
    let mut state = AggregateState::default();
    for row in rows {
        state.apply(&row, aggregations, 1);
    }
    state
}

fn output_schema(aggregations: &[Aggregation]) -> NodeSchema {
    let mut columns = vec![ColumnSchema::new(AGGREGATE_KEY_COLUMN, ColumnType::String, false)];
    for agg in aggregations {
        columns.push(ColumnSchema::new(agg.alias.clone(), ColumnType::Any, true));
    }
    NodeSchema::leaf(Schema::new(columns, vec![AGGREGATE_KEY_COLUMN.to_string()]))
}

pub struct FullAggregateOperator {
    input: OperatorRef,
    aggregations: Vec<Aggregation>,
    schema: NodeSchema,
    state: AggregateState,
    output: Option<OutputRef>,
}

impl FullAggregateOperator {
    pub fn build(
        input: OperatorRef,
        aggregations: Vec<Aggregation>,
    ) -> Result<Rc<RefCell<FullAggregateOperator>>, EngineError> {
        for agg in &aggregations {
            if !agg.aggregate.supported_full_table() {
                return Err(EngineError::UnsupportedAggregate {
                    aggregate: agg.aggregate.as_str().to_string(),
                    position: "full-table".to_string(),
                });
            }
        }
        let schema = output_schema(&aggregations);
        Ok(Rc::new(RefCell::new(FullAggregateOperator {
            input,
            aggregations,
            schema,
            state: AggregateState::default(),
            output: None,
        })))
    }

    fn forward(&mut self, change: Change) {
        if let Some(output) = &self.output {
            output.borrow_mut().push(change);
        }
    }
}

impl Operator for FullAggregateOperator {
    fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    fn fetch(&mut self, request: &FetchRequest) -> NodeStream {
        let rows = self
            .input
            .borrow_mut()
            .fetch(request)
            .map(|n| n.row)
            .collect::<Vec<_>>();
        let state = aggregate_over(rows.into_iter(), &self.aggregations);
        if state.count == 0 {
            Box::new(std::iter::empty())
        } else {
            Box::new(std::iter::once(Node::new(state.to_row(&self.aggregations))))
        }
    }

    fn cleanup(&mut self, request: &FetchRequest) -> NodeStream {
        self.fetch(request)
    }

    fn set_output(&mut self, output: OutputRef) {
        self.output = Some(output);
    }

    fn destroy(&mut self) {
        self.input.borrow_mut().destroy();
        self.state = AggregateState::default();
        self.output = None;
    }
}

impl Output for FullAggregateOperator {
    fn push(&mut self, change: Change) {
        match change {
            Change::Add { node } => {
                let was_empty = self.state.count == 0;
                let old_row = (!was_empty).then(|| self.state.to_row(&self.aggregations));
                self.state.apply(&node.row, &self.aggregations, 1);
                if let Some(old_row) = old_row {
                    self.forward(Change::Remove { node: Node::new(old_row) });
                }
                self.forward(Change::Add {
                    node: Node::new(self.state.to_row(&self.aggregations)),
                });
            }
            Change::Remove { node } => {
                assert_invariant!(self.state.count > 0, "aggregate remove with no prior members");
                let old_row = self.state.to_row(&self.aggregations);
                self.state.apply(&node.row, &self.aggregations, -1);
                self.forward(Change::Remove { node: Node::new(old_row) });
                if self.state.count > 0 {
                    self.forward(Change::Add {
                        node: Node::new(self.state.to_row(&self.aggregations)),
                    });
                }
            }
            Change::Child { .. } => {
                assert_invariant!(
                    false,
                    "FullAggregate received a Child change; it has no relationships of its own"
                );
            }
        }
    }
}
