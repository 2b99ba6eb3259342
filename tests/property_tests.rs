//! Property-based coverage of core engine invariants: normalize
//! idempotence, net-zero-change fetch stability, storage round trips, and
//! the Join child-key relationship invariant.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use ivm_engine::ast::{Ast, Condition, SimpleOp};
use ivm_engine::config::EngineConfig;
use ivm_engine::model::{ColumnSchema, ColumnType, Primitive, Row, Schema};
use ivm_engine::normalize::normalize;
use ivm_engine::operators::OperatorRef;
use ivm_engine::pipeline::{join_pipelines, PipelineBuilder, SourceRegistry};
use ivm_engine::source::{RowChange, Source};
use ivm_engine::storage::{Storage, StorageValue};

fn field_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())]
}

fn condition_strategy() -> impl Strategy<Value = Condition> {
    let leaf = (field_strategy(), any::<i16>())
        .prop_map(|(field, v)| Condition::simple(field, SimpleOp::Eq, Primitive::Int(v as i64)));

    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 1..4).prop_map(Condition::and),
            proptest::collection::vec(inner, 1..4).prop_map(Condition::or),
        ]
    })
}

proptest! {
    #[test]
    fn normalize_is_idempotent(condition in condition_strategy()) {
        let mut ast = Ast::scan("t", vec![]);
        ast.r#where = Some(condition);

        let once = normalize(&ast);
        let twice = normalize(&once);
        prop_assert_eq!(once, twice);
    }
}

fn items_schema() -> Schema {
    Schema::new(vec![ColumnSchema::new("id", ColumnType::String, false)], vec!["id".into()])
}

fn item_row(id: &str) -> Row {
    let mut r = Row::new();
    r.insert("id".into(), Primitive::String(id.into()));
    r
}

fn fetch_ids(source: &Rc<RefCell<Source>>) -> Vec<String> {
    let mut ids: Vec<String> = source
        .borrow_mut()
        .fetch(&ivm_engine::model::FetchRequest::all())
        .map(|n| n.row.get("id").unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

proptest! {
    #[test]
    fn net_zero_changes_preserve_fetch(transient_ids in proptest::collection::vec(0u8..20, 0..20)) {
        let source = Rc::new(RefCell::new(Source::new("items", items_schema())));
        source.borrow_mut().push(RowChange::Add(item_row("base"))).unwrap();
        let before = fetch_ids(&source);

        for id in &transient_ids {
            let row = item_row(&format!("t{id}"));
            source.borrow_mut().push(RowChange::Add(row.clone())).unwrap();
            source.borrow_mut().push(RowChange::Remove(row)).unwrap();
        }

        let after = fetch_ids(&source);
        prop_assert_eq!(before, after);
    }
}

proptest! {
    #[test]
    fn storage_round_trip_leaves_storage_empty(keys in proptest::collection::vec("[a-z]{1,6}", 0..12)) {
        let mut storage = Storage::new();
        for key in &keys {
            storage.set(key.clone(), StorageValue::Present);
        }
        for key in &keys {
            storage.del(key);
        }
        prop_assert!(storage.is_empty());
    }
}

fn uid_schema() -> Schema {
    Schema::new(
        vec![
            ColumnSchema::new("id", ColumnType::String, false),
            ColumnSchema::new("uid", ColumnType::String, false),
        ],
        vec!["id".into()],
    )
}

fn uid_row(id: String, uid: usize) -> Row {
    let mut r = Row::new();
    r.insert("id".into(), Primitive::String(id));
    r.insert("uid".into(), Primitive::String(format!("u{uid}")));
    r
}

proptest! {
    #[test]
    fn join_relationship_matches_child_key_invariant(
        parent_groups in proptest::collection::vec(0usize..4, 1..8),
        child_groups in proptest::collection::vec(0usize..4, 0..10),
    ) {
        let parent_source = Rc::new(RefCell::new(Source::new("parents", uid_schema())));
        let child_source = Rc::new(RefCell::new(Source::new("children", uid_schema())));

        for (i, group) in parent_groups.iter().enumerate() {
            parent_source
                .borrow_mut()
                .push(RowChange::Add(uid_row(format!("p{i}"), *group)))
                .unwrap();
        }
        for (i, group) in child_groups.iter().enumerate() {
            child_source
                .borrow_mut()
                .push(RowChange::Add(uid_row(format!("c{i}"), *group)))
                .unwrap();
        }

        let mut parent_registry = SourceRegistry::new();
        parent_registry.register("parents", parent_source as OperatorRef);
        let mut child_registry = SourceRegistry::new();
        child_registry.register("children", child_source as OperatorRef);

        let mut parent_builder = PipelineBuilder::new(parent_registry, EngineConfig::default());
        let mut child_builder = PipelineBuilder::new(child_registry, EngineConfig::default());
        let parent_handle = parent_builder.build(&Ast::scan("parents", vec![])).unwrap();
        let child_handle = child_builder.build(&Ast::scan("children", vec![])).unwrap();
        let joined = join_pipelines(&parent_handle, &child_handle, "uid", "uid", "children").unwrap();

        for mut node in joined.fetch() {
            let parent_uid = node.row.get("uid").unwrap().clone();
            let children: Vec<_> = node.relationships.shift_remove("children").unwrap().collect();
            for child in children {
                prop_assert_eq!(child.row.get("uid"), Some(&parent_uid));
            }
        }
    }
}
