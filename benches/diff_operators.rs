//! Benchmarks for the in-memory differential operators.
//!
//! These measure the cost of pushing changes through each operator kind
//! and of cold `fetch` materialization — no database or replication
//! stream is involved.
//!
//! Run with: `cargo bench --bench diff_operators`

use std::cell::RefCell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ivm_engine::ast::{AggregateFn, Aggregation, Condition, SimpleOp};
use ivm_engine::model::{ColumnSchema, ColumnType, FetchRequest, Primitive, Row, Schema};
use ivm_engine::operators::distinct::DistinctOperator;
use ivm_engine::operators::filter::FilterOperator;
use ivm_engine::operators::full_aggregate::FullAggregateOperator;
use ivm_engine::operators::group_by::GroupByOperator;
use ivm_engine::operators::join::JoinOperator;
use ivm_engine::operators::OperatorRef;
use ivm_engine::output::OutputRef;
use ivm_engine::predicate::compile_predicate;
use ivm_engine::source::{RowChange, Source};

fn items_schema() -> Schema {
    Schema::new(
        vec![
            ColumnSchema::new("id", ColumnType::String, false),
            ColumnSchema::new("group", ColumnType::String, false),
            ColumnSchema::new("amount", ColumnType::Int, false),
        ],
        vec!["id".into()],
    )
}

fn item_row(id: usize, group: usize, amount: i64) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), Primitive::String(format!("i{id}")));
    row.insert("group".into(), Primitive::String(format!("g{group}")));
    row.insert("amount".into(), Primitive::Int(amount));
    row
}

fn filled_source(n: usize, groups: usize) -> Rc<RefCell<Source>> {
    let source = Rc::new(RefCell::new(Source::new("items", items_schema())));
    for i in 0..n {
        source
            .borrow_mut()
            .push(RowChange::Add(item_row(i, i % groups, (i % 100) as i64)))
            .unwrap();
    }
    source
}

fn bench_filter_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_fetch");
    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let source = filled_source(size, 10);
            let predicate =
                compile_predicate(&Condition::simple("group", SimpleOp::Eq, Primitive::String("g1".into())))
                    .unwrap();
            let filter = FilterOperator::new(source as OperatorRef, predicate);
            b.iter(|| {
                let count = filter.borrow_mut().fetch(&FetchRequest::all()).count();
                black_box(count);
            });
        });
    }
    group.finish();
}

fn bench_filter_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_push");
    group.bench_function("single_push", |b| {
        let source = Rc::new(RefCell::new(Source::new("items", items_schema())));
        let predicate = compile_predicate(&Condition::simple("amount", SimpleOp::Gt, Primitive::Int(50))).unwrap();
        let filter = FilterOperator::new(source.clone() as OperatorRef, predicate);
        source.borrow_mut().set_output(filter.clone() as OutputRef);
        let mut i = 0usize;
        b.iter(|| {
            source
                .borrow_mut()
                .push(RowChange::Add(item_row(i, i % 10, (i % 100) as i64)))
                .unwrap();
            i += 1;
        });
    });
    group.finish();
}

fn bench_group_by_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by_fetch");
    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let source = filled_source(size, 25);
            let group_by = GroupByOperator::build(
                source as OperatorRef,
                vec!["group".into()],
                vec![
                    Aggregation {
                        aggregate: AggregateFn::Count,
                        field: None,
                        alias: "count".into(),
                    },
                    Aggregation {
                        aggregate: AggregateFn::Sum,
                        field: Some("amount".into()),
                        alias: "total".into(),
                    },
                ],
            );
            b.iter(|| {
                let count = group_by.borrow_mut().fetch(&FetchRequest::all()).count();
                black_box(count);
            });
        });
    }
    group.finish();
}

fn bench_full_aggregate_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_aggregate_push");
    group.bench_function("running_total", |b| {
        let source = Rc::new(RefCell::new(Source::new("items", items_schema())));
        let agg = FullAggregateOperator::build(
            source.clone() as OperatorRef,
            vec![Aggregation {
                aggregate: AggregateFn::Sum,
                field: Some("amount".into()),
                alias: "total".into(),
            }],
        )
        .unwrap();
        source.borrow_mut().set_output(agg.clone() as OutputRef);
        let mut i = 0usize;
        b.iter(|| {
            source
                .borrow_mut()
                .push(RowChange::Add(item_row(i, 0, (i % 100) as i64)))
                .unwrap();
            i += 1;
        });
    });
    group.finish();
}

fn bench_distinct_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("distinct_push");
    group.bench_function("duplicate_heavy", |b| {
        let source = Rc::new(RefCell::new(Source::new("items", items_schema())));
        let distinct = DistinctOperator::new(source.clone() as OperatorRef);
        source.borrow_mut().set_output(distinct.clone() as OutputRef);
        let mut i = 0usize;
        b.iter(|| {
            let row = item_row(i % 50, 0, 0);
            source.borrow_mut().push(RowChange::Add(row)).unwrap();
            i += 1;
        });
    });
    group.finish();
}

fn parent_child_schema() -> (Schema, Schema) {
    let parent = Schema::new(
        vec![
            ColumnSchema::new("id", ColumnType::String, false),
            ColumnSchema::new("uid", ColumnType::String, false),
        ],
        vec!["id".into()],
    );
    let child = parent.clone();
    (parent, child)
}

fn bench_join_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_fetch");
    for size in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let (parent_schema, child_schema) = parent_child_schema();
            let parent = Rc::new(RefCell::new(Source::new("parents", parent_schema)));
            let child = Rc::new(RefCell::new(Source::new("children", child_schema)));
            for i in 0..size {
                let mut p = Row::new();
                p.insert("id".into(), Primitive::String(format!("p{i}")));
                p.insert("uid".into(), Primitive::String(format!("u{}", i % 20)));
                parent.borrow_mut().push(RowChange::Add(p)).unwrap();

                let mut ch = Row::new();
                ch.insert("id".into(), Primitive::String(format!("c{i}")));
                ch.insert("uid".into(), Primitive::String(format!("u{}", i % 20)));
                child.borrow_mut().push(RowChange::Add(ch)).unwrap();
            }
            let join =
                JoinOperator::build(parent as OperatorRef, child as OperatorRef, "uid", "uid", "children").unwrap();
            b.iter(|| {
                let mut total_children = 0usize;
                for mut node in join.borrow_mut().fetch(&FetchRequest::all()) {
                    if let Some(children) = node.relationships.shift_remove("children") {
                        total_children += children.count();
                    }
                }
                black_box(total_children);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_filter_fetch,
    bench_filter_push,
    bench_group_by_fetch,
    bench_full_aggregate_push,
    bench_distinct_push,
    bench_join_fetch
);
criterion_main!(benches);
