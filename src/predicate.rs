//! Compiled predicates for [`crate::operators::filter`].
//!
//! A predicate is compiled from exactly one `Condition::Simple` leaf; `AND`
//! and `OR` are not compiled into one predicate at all — the pipeline
//! builder composes them structurally instead (a sequential chain of
//! Filters for `AND`, a fan-out/concat/distinct sub-pipeline for `OR`).

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use crate::ast::{Condition, SimpleOp};
use crate::error::EngineError;
use crate::model::{Primitive, Row};

/// A condition compiled once at build time and evaluated per row
/// thereafter.
pub struct CompiledPredicate {
    field: String,
    kind: PredicateKind,
}

enum PredicateKind {
    Cmp(SimpleOp, Primitive),
    In(Vec<Primitive>),
    NotIn(Vec<Primitive>),
    Matches { regex: Regex, negate: bool },
    EqualsFold {
        value: String,
        case_insensitive: bool,
        negate: bool,
    },
}

impl CompiledPredicate {
    pub fn eval(&self, row: &Row) -> bool {
        let value = row.get(&self.field).unwrap_or(&Primitive::Null);
        self.kind.eval(value)
    }
}

impl PredicateKind {
    fn eval(&self, value: &Primitive) -> bool {
        match self {
            PredicateKind::Cmp(op, literal) => eval_cmp(*op, value, literal),
            PredicateKind::In(items) => items.contains(value),
            PredicateKind::NotIn(items) => !items.contains(value),
            PredicateKind::Matches { regex, negate } => {
                let matched = regex.is_match(&value.to_string());
                matched != *negate
            }
            PredicateKind::EqualsFold {
                value: literal,
                case_insensitive,
                negate,
            } => {
                let text = value.to_string();
                let matched = if *case_insensitive {
                    text.eq_ignore_ascii_case(literal)
                } else {
                    text == *literal
                };
                matched != *negate
            }
        }
    }
}

fn eval_cmp(op: SimpleOp, value: &Primitive, literal: &Primitive) -> bool {
    match op {
        SimpleOp::Eq => value == literal,
        SimpleOp::Ne => value != literal,
        SimpleOp::Lt => compare_primitives(value, literal) == Some(Ordering::Less),
        SimpleOp::Gt => compare_primitives(value, literal) == Some(Ordering::Greater),
        SimpleOp::Le => matches!(
            compare_primitives(value, literal),
            Some(Ordering::Less | Ordering::Equal)
        ),
        SimpleOp::Ge => matches!(
            compare_primitives(value, literal),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        _ => unreachable!("non-comparison op routed through eval_cmp"),
    }
}

/// `Null` only orders equal to `Null`; it is never less than or greater
/// than any other value, matching SQL's "unknown" rather than treating
/// missing values as sortable. Shared with `operators::group_by`'s
/// `min`/`max` aggregates, which face the same ordering question.
pub(crate) fn compare_primitives(a: &Primitive, b: &Primitive) -> Option<Ordering> {
    match (a, b) {
        (Primitive::Null, Primitive::Null) => Some(Ordering::Equal),
        (Primitive::Null, _) | (_, Primitive::Null) => None,
        (Primitive::Bool(x), Primitive::Bool(y)) => x.partial_cmp(y),
        (Primitive::Int(x), Primitive::Int(y)) => x.partial_cmp(y),
        (Primitive::Float(x), Primitive::Float(y)) => x.partial_cmp(y),
        (Primitive::Int(x), Primitive::Float(y)) => (*x as f64).partial_cmp(y),
        (Primitive::Float(x), Primitive::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Primitive::String(x), Primitive::String(y)) => x.partial_cmp(y),
        _ => None,
    }
}

/// Numeric coercion used by `sum`/`avg` aggregates (`operators::group_by`,
/// `operators::full_aggregate`); non-numeric values contribute zero rather
/// than panicking, since the AST layer doesn't type-check aggregate fields
/// ahead of time.
pub(crate) fn as_f64(value: &Primitive) -> f64 {
    match value {
        Primitive::Int(i) => *i as f64,
        Primitive::Float(f) => *f,
        _ => 0.0,
    }
}

/// Compile a single `Condition::Simple` leaf. Called only by the pipeline
/// builder's recursion, which is responsible for never handing a
/// `Conjunction` to this function directly.
pub fn compile_predicate(condition: &Condition) -> Result<CompiledPredicate, EngineError> {
    let Condition::Simple { field, op, value } = condition else {
        panic!("compile_predicate called on a non-Simple condition");
    };

    let kind = match op {
        SimpleOp::Eq | SimpleOp::Ne | SimpleOp::Lt | SimpleOp::Gt | SimpleOp::Le | SimpleOp::Ge => {
            let literal = literal_value(op, value)?;
            PredicateKind::Cmp(*op, literal)
        }
        SimpleOp::In => PredicateKind::In(list_value(op, value)?),
        SimpleOp::NotIn => PredicateKind::NotIn(list_value(op, value)?),
        SimpleOp::Like => compile_like(&literal_string(op, value)?, false, false)?,
        SimpleOp::NotLike => compile_like(&literal_string(op, value)?, false, true)?,
        SimpleOp::ILike => compile_like(&literal_string(op, value)?, true, false)?,
        SimpleOp::NotILike => compile_like(&literal_string(op, value)?, true, true)?,
    };

    Ok(CompiledPredicate {
        field: field.clone(),
        kind,
    })
}

fn literal_value(op: &SimpleOp, value: &Primitive) -> Result<Primitive, EngineError> {
    match value {
        Primitive::Array(_) => Err(EngineError::MalformedCondition(format!(
            "operator {} expects a single literal, not a list",
            op.as_str()
        ))),
        other => Ok(other.clone()),
    }
}

fn list_value(op: &SimpleOp, value: &Primitive) -> Result<Vec<Primitive>, EngineError> {
    match value {
        Primitive::Array(items) => Ok(items.clone()),
        _ => Err(EngineError::MalformedCondition(format!(
            "operator {} expects a list, not a single literal",
            op.as_str()
        ))),
    }
}

fn literal_string(op: &SimpleOp, value: &Primitive) -> Result<String, EngineError> {
    match literal_value(op, value)? {
        Primitive::String(s) => Ok(s),
        other => Err(EngineError::MalformedCondition(format!(
            "operator {} expects a string pattern, got {other}",
            op.as_str()
        ))),
    }
}

enum LikeToken {
    Literal(char),
    AnyChar,
    AnySeq,
}

fn tokenize_like(pattern: &str) -> Result<Vec<LikeToken>, EngineError> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => tokens.push(LikeToken::AnySeq),
            '_' => tokens.push(LikeToken::AnyChar),
            '\\' => match chars.next() {
                Some(escaped) => tokens.push(LikeToken::Literal(escaped)),
                None => return Err(EngineError::DanglingLikeEscape(pattern.to_string())),
            },
            other => tokens.push(LikeToken::Literal(other)),
        }
    }
    Ok(tokens)
}

/// Translate one `LIKE`/`ILIKE` pattern into a [`PredicateKind`]. A pattern
/// with no `%`/`_` wildcards degrades to plain string equality rather than
/// a regex.
fn compile_like(pattern: &str, case_insensitive: bool, negate: bool) -> Result<PredicateKind, EngineError> {
    let tokens = tokenize_like(pattern)?;
    let has_wildcard = tokens
        .iter()
        .any(|t| matches!(t, LikeToken::AnyChar | LikeToken::AnySeq));

    if !has_wildcard {
        let literal: String = tokens
            .into_iter()
            .map(|t| match t {
                LikeToken::Literal(c) => c,
                LikeToken::AnyChar | LikeToken::AnySeq => unreachable!("checked above"),
            })
            .collect();
        return Ok(PredicateKind::EqualsFold {
            value: literal,
            case_insensitive,
            negate,
        });
    }

    let mut regex_str = String::from("^");
    for token in tokens {
        match token {
            LikeToken::AnySeq => regex_str.push_str(".*"),
            LikeToken::AnyChar => regex_str.push('.'),
            LikeToken::Literal(c) => regex_str.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex_str.push('$');

    let regex = RegexBuilder::new(&regex_str)
        .case_insensitive(case_insensitive)
        .build()
        .expect("a fully-escaped, anchored LIKE translation is always a valid regex");

    Ok(PredicateKind::Matches { regex, negate })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(field: &str, value: Primitive) -> Row {
        let mut r = Row::new();
        r.insert(field.to_string(), value);
        r
    }

    #[test]
    fn equality_and_inequality() {
        let pred = compile_predicate(&Condition::simple("age", SimpleOp::Eq, Primitive::Int(30))).unwrap();
        assert!(pred.eval(&row("age", Primitive::Int(30))));
        assert!(!pred.eval(&row("age", Primitive::Int(31))));
    }

    #[test]
    fn ordering_comparisons() {
        let pred = compile_predicate(&Condition::simple("age", SimpleOp::Ge, Primitive::Int(18))).unwrap();
        assert!(pred.eval(&row("age", Primitive::Int(18))));
        assert!(pred.eval(&row("age", Primitive::Int(40))));
        assert!(!pred.eval(&row("age", Primitive::Int(17))));
    }

    #[test]
    fn cross_numeric_comparison() {
        let pred = compile_predicate(&Condition::simple("score", SimpleOp::Lt, Primitive::Float(10.5))).unwrap();
        assert!(pred.eval(&row("score", Primitive::Int(10))));
        assert!(!pred.eval(&row("score", Primitive::Int(11))));
    }

    #[test]
    fn in_and_not_in() {
        let cond = Condition::simple(
            "status",
            SimpleOp::In,
            Primitive::Array(vec![
                Primitive::String("open".into()),
                Primitive::String("pending".into()),
            ]),
        );
        let pred = compile_predicate(&cond).unwrap();
        assert!(pred.eval(&row("status", Primitive::String("open".into()))));
        assert!(!pred.eval(&row("status", Primitive::String("closed".into()))));
    }

    #[test]
    fn like_with_wildcards_compiles_to_regex() {
        let pred =
            compile_predicate(&Condition::simple("name", SimpleOp::Like, Primitive::String("J%n".into())))
                .unwrap();
        assert!(pred.eval(&row("name", Primitive::String("Jordan".into()))));
        assert!(!pred.eval(&row("name", Primitive::String("Jordans".into()))));
    }

    #[test]
    fn ilike_is_case_insensitive() {
        let pred =
            compile_predicate(&Condition::simple("name", SimpleOp::ILike, Primitive::String("j%n".into())))
                .unwrap();
        assert!(pred.eval(&row("name", Primitive::String("JORDAN".into()))));
    }

    #[test]
    fn like_without_wildcards_degrades_to_equality() {
        let pred =
            compile_predicate(&Condition::simple("name", SimpleOp::Like, Primitive::String("Jordan".into())))
                .unwrap();
        assert!(pred.eval(&row("name", Primitive::String("Jordan".into()))));
        assert!(!pred.eval(&row("name", Primitive::String("Jordans".into()))));
    }

    #[test]
    fn like_escape_handles_literal_percent() {
        let pred = compile_predicate(&Condition::simple(
            "discount",
            SimpleOp::Like,
            Primitive::String("50\\%".into()),
        ))
        .unwrap();
        assert!(pred.eval(&row("discount", Primitive::String("50%".into()))));
        assert!(!pred.eval(&row("discount", Primitive::String("50x".into()))));
    }

    #[test]
    fn dangling_escape_is_a_configuration_error() {
        let err = compile_predicate(&Condition::simple(
            "name",
            SimpleOp::Like,
            Primitive::String("abc\\".into()),
        ))
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::EngineErrorKind::Configuration);
    }

    #[test]
    fn not_like_negates() {
        let pred = compile_predicate(&Condition::simple(
            "name",
            SimpleOp::NotLike,
            Primitive::String("J%".into()),
        ))
        .unwrap();
        assert!(!pred.eval(&row("name", Primitive::String("Jordan".into()))));
        assert!(pred.eval(&row("name", Primitive::String("Amara".into()))));
    }

    #[test]
    fn null_never_matches_ordering_comparisons() {
        let pred = compile_predicate(&Condition::simple("age", SimpleOp::Gt, Primitive::Int(0))).unwrap();
        assert!(!pred.eval(&row("age", Primitive::Null)));
    }
}
