//! Deterministic AST canonicalization.
//!
//! `normalize` must be idempotent and map semantically equivalent ASTs to
//! byte-identical canonical forms, so that [`fingerprint`] can be used as a
//! pipeline-dedup key — two subscriptions whose ASTs normalize the same
//! way share one compiled operator graph.

use std::cmp::Ordering;

use crate::ast::{Ast, Condition, ConjunctionOp};
use crate::model::Primitive;
use crate::hash::hash_str;

/// Canonicalize an AST: sort `select`/`aggregate`/`groupBy`, flatten and
/// sort `where`. `orderBy` is left untouched — it is semantically
/// significant.
pub fn normalize(ast: &Ast) -> Ast {
    let mut select = ast.select.clone();
    select.sort_by(|a, b| a.0.cmp(&b.0));

    let mut aggregate = ast.aggregate.clone();
    aggregate.sort_by(|a, b| {
        let field_a = a.field.as_deref().unwrap_or("*");
        let field_b = b.field.as_deref().unwrap_or("*");
        (a.aggregate.as_str(), field_a).cmp(&(b.aggregate.as_str(), field_b))
    });

    let mut group_by = ast.group_by.clone();
    group_by.sort();

    let r#where = ast.r#where.as_ref().and_then(normalize_condition);

    Ast {
        table: ast.table.clone(),
        alias: ast.alias.clone(),
        select,
        aggregate,
        r#where,
        order_by: ast.order_by.clone(),
        group_by,
        limit: ast.limit,
    }
}

/// Recursively flatten and sort one `where` subtree. Returns `None` when
/// the subtree reduces to an empty conjunction ("TRUE" — vacuously absent).
fn normalize_condition(cond: &Condition) -> Option<Condition> {
    match cond {
        Condition::Simple { .. } => Some(cond.clone()),
        Condition::Conjunction { op, conditions } => {
            let mut flattened = Vec::with_capacity(conditions.len());
            for child in conditions {
                let Some(normalized_child) = normalize_condition(child) else {
                    continue;
                };
                match normalized_child {
                    Condition::Conjunction {
                        op: child_op,
                        conditions: child_conditions,
                    } if child_op == *op => {
                        // Same operator as parent: inline rather than nest.
                        flattened.extend(child_conditions);
                    }
                    other => flattened.push(other),
                }
            }

            match flattened.len() {
                0 => None,
                1 => flattened.pop(),
                _ => {
                    flattened.sort_by(compare_conditions);
                    Some(Condition::Conjunction {
                        op: *op,
                        conditions: flattened,
                    })
                }
            }
        }
    }
}

fn condition_rank(cond: &Condition) -> u8 {
    match cond {
        Condition::Simple { .. } => 0,
        Condition::Conjunction { .. } => 1,
    }
}

fn stringify_value(value: &Primitive) -> String {
    value.encode()
}

/// Total order over already-flattened conditions: simple conditions sort
/// before conjunctions; within a kind, compare field/op/value or
/// op/members (shorter, matching prefixes sort first).
fn compare_conditions(a: &Condition, b: &Condition) -> Ordering {
    let rank = condition_rank(a).cmp(&condition_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (
            Condition::Simple {
                field: f1,
                op: op1,
                value: v1,
            },
            Condition::Simple {
                field: f2,
                op: op2,
                value: v2,
            },
        ) => f1
            .cmp(f2)
            .then_with(|| op1.as_str().cmp(op2.as_str()))
            .then_with(|| stringify_value(v1).cmp(&stringify_value(v2))),

        (
            Condition::Conjunction {
                op: op1,
                conditions: c1,
            },
            Condition::Conjunction {
                op: op2,
                conditions: c2,
            },
        ) => op1.as_str().cmp(op2.as_str()).then_with(|| {
            c1.iter()
                .zip(c2.iter())
                .map(|(x, y)| compare_conditions(x, y))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or_else(|| c1.len().cmp(&c2.len()))
        }),

        _ => unreachable!("rank check above already separated Simple from Conjunction"),
    }
}

/// Conjunction helper exposed for operator compilation, where AND's
/// associativity/commutativity means it's convenient to treat its operand
/// list as ordered by this same rule even outside normalization proper.
pub fn conjunction_op_of(cond: &Condition) -> Option<ConjunctionOp> {
    match cond {
        Condition::Conjunction { op, .. } => Some(*op),
        Condition::Simple { .. } => None,
    }
}

/// Stable 64-bit fingerprint of a normalized AST, used as the pipeline
/// builder's dedup-cache key.
pub fn fingerprint(ast: &Ast) -> u64 {
    let canonical = normalize(ast);
    hash_str(&format!("{canonical:?}"))
}
