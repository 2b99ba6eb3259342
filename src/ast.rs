//! The query AST: a deliberately restricted `SELECT`-shaped query.
//! Normalization lives in [`crate::normalize`] so that the raw AST type
//! stays free of canonicalization concerns.

use crate::model::Primitive;

/// A `SELECT`-shaped query over a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub table: String,
    pub alias: Option<String>,
    pub select: Vec<(String, String)>,
    pub aggregate: Vec<Aggregation>,
    pub r#where: Option<Condition>,
    pub order_by: Vec<OrderByTerm>,
    pub group_by: Vec<String>,
    pub limit: Option<u64>,
}

impl Ast {
    /// A bare `SELECT * FROM table ORDER BY ...` with nothing else set.
    pub fn scan(table: impl Into<String>, order_by: Vec<OrderByTerm>) -> Self {
        Ast {
            table: table.into(),
            alias: None,
            select: Vec::new(),
            aggregate: Vec::new(),
            r#where: None,
            order_by,
            group_by: Vec::new(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByTerm {
    pub field: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Array,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Array => "array",
        }
    }

    /// Whether this aggregate is supported without a `groupBy`: a
    /// full-table aggregate supports only count/sum/avg.
    pub fn supported_full_table(&self) -> bool {
        matches!(self, AggregateFn::Count | AggregateFn::Sum | AggregateFn::Avg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub aggregate: AggregateFn,
    pub field: Option<String>,
    pub alias: String,
}

/// Comparison/membership operators allowed in a `Simple` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Like,
    NotLike,
    ILike,
    NotILike,
}

impl SimpleOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleOp::Eq => "=",
            SimpleOp::Ne => "!=",
            SimpleOp::Lt => "<",
            SimpleOp::Gt => ">",
            SimpleOp::Le => "<=",
            SimpleOp::Ge => ">=",
            SimpleOp::In => "IN",
            SimpleOp::NotIn => "NOT IN",
            SimpleOp::Like => "LIKE",
            SimpleOp::NotLike => "NOT LIKE",
            SimpleOp::ILike => "ILIKE",
            SimpleOp::NotILike => "NOT ILIKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjunctionOp {
    And,
    Or,
}

impl ConjunctionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConjunctionOp::And => "AND",
            ConjunctionOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Simple {
        field: String,
        op: SimpleOp,
        /// For `IN`/`NOT IN` this is a [`Primitive::Array`]; every other
        /// operator expects a scalar variant.
        value: Primitive,
    },
    Conjunction {
        op: ConjunctionOp,
        conditions: Vec<Condition>,
    },
}

impl Condition {
    pub fn simple(field: impl Into<String>, op: SimpleOp, value: Primitive) -> Self {
        Condition::Simple {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::Conjunction {
            op: ConjunctionOp::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Conjunction {
            op: ConjunctionOp::Or,
            conditions,
        }
    }
}
