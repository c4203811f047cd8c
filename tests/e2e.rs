//! End-to-end scenarios exercising the storage, indexing, and query layers
//! together against a single ledger. See `spec.md` §8's literal scenario
//! list; each test here is named after one of them.

use std::ops::Bound;
use std::sync::Arc;

use flakedb::comparator::Index;
use flakedb::config::ConnectionConfig;
use flakedb::flake::{Flake, Object};
use flakedb::query::{context::ContextEntry, execute, PatternTerm, Query, SelectClause};
use flakedb::schema::PredicateMeta;
use flakedb::serde_codec::{NativeCodec, Serde};
use flakedb::store::mem::MemStore;
use flakedb::store::Store;
use flakedb::Session;

const IRI_PREDICATE: u64 = 1;
const RDF_TYPE_PREDICATE: u64 = 2;
const NAME_PREDICATE: u64 = 10;
const AGE_PREDICATE: u64 = 11;
const FRIEND_PREDICATE: u64 = 12;
const FAVNUMS_PREDICATE: u64 = 13;
const LIST_PREDICATE: u64 = 14;

fn session() -> Session {
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let codec: Arc<dyn Serde> = Arc::new(NativeCodec);
    Session::new(store, codec, ConnectionConfig::new("net"), 1 << 20)
}

fn with_schema(db: flakedb::Db) -> flakedb::Db {
    let schema = db
        .schema()
        .clone()
        .with_predicate("schema/name", PredicateMeta::new(NAME_PREDICATE))
        .with_predicate("schema/age", PredicateMeta::new(AGE_PREDICATE))
        .with_predicate("ex/friend", PredicateMeta::new(FRIEND_PREDICATE).set_ref(true).set_multi(true))
        .with_predicate("ex/favNums", PredicateMeta::new(FAVNUMS_PREDICATE).set_multi(true))
        .with_predicate("ex/list", PredicateMeta::new(LIST_PREDICATE).set_multi(true).set_list(true));
    let mut root = db.root().clone();
    root.schema = schema;
    flakedb::Db::open(db.resolver_arc(), root)
}

fn iri_flake(sid: i64, iri: &str) -> Flake {
    Flake::new(sid, IRI_PREDICATE, Object::Str(iri.to_string()), 0, 0, true)
}

#[test]
fn scenario_1_single_subject_wildcard() {
    let session = session();
    let db = with_schema(session.open("led").unwrap());
    let db = db.with_flakes(vec![
        iri_flake(1, "ex/alice"),
        Flake::new(1, RDF_TYPE_PREDICATE, Object::Str("ex/User".into()), 0, 0, true),
        Flake::new(1, NAME_PREDICATE, Object::Str("Alice".into()), 0, 0, true),
        Flake::new(1, AGE_PREDICATE, Object::Int(42), 0, 0, true),
    ])
    .unwrap();
    session.publish("led", db.clone()).unwrap();

    let query = Query {
        select: vec![SelectClause::Wildcard],
        from: Some(PatternTerm::Iri("ex/alice".into())),
        ..Query::new()
    };
    let result = execute(&db, &query).unwrap();
    let row = &result[0];
    assert_eq!(row["id"], "ex/alice");
    assert_eq!(row["rdf/type"], serde_json::json!(["ex/User"]));
    assert_eq!(row["schema/name"], "Alice");
    assert_eq!(row["schema/age"], 42);
}

#[test]
fn scenario_2_retraction_via_null_drops_the_field() {
    let session = session();
    let db = with_schema(session.open("led").unwrap());
    let db = db.with_flakes(vec![
        iri_flake(1, "ex/alice"),
        Flake::new(1, RDF_TYPE_PREDICATE, Object::Str("ex/User".into()), 0, 0, true),
        Flake::new(1, NAME_PREDICATE, Object::Str("Alice".into()), 0, 0, true),
        Flake::new(1, AGE_PREDICATE, Object::Int(42), 0, 0, true),
    ])
    .unwrap();
    // staging `schema/age: null` retracts the previously-asserted value at
    // the same (s,p,o,dt) group.
    let db = db.with_flakes(vec![Flake::new(1, AGE_PREDICATE, Object::Int(42), 0, 0, false)]).unwrap();

    let query = Query {
        select: vec![SelectClause::Wildcard],
        from: Some(PatternTerm::Iri("ex/alice".into())),
        ..Query::new()
    };
    let result = execute(&db, &query).unwrap();
    let row = &result[0];
    assert_eq!(row["schema/name"], "Alice");
    assert!(row.get("schema/age").is_none());
}

#[test]
fn scenario_3_reverse_context() {
    let session = session();
    let db = with_schema(session.open("led").unwrap());
    let db = db.with_flakes(vec![
        iri_flake(1, "ex/alice"),
        Flake::new(1, NAME_PREDICATE, Object::Str("Alice".into()), 0, 0, true),
        iri_flake(2, "ex/brian"),
        iri_flake(3, "ex/cam"),
        Flake::new(3, FRIEND_PREDICATE, Object::Ref(2), 0, 0, true),
        Flake::new(3, FRIEND_PREDICATE, Object::Ref(1), 0, 0, true),
        Flake::new(2, FRIEND_PREDICATE, Object::Ref(1), 0, 0, true),
    ])
    .unwrap();

    let mut context = std::collections::BTreeMap::new();
    context.insert("friended".to_string(), ContextEntry::new("ex/friend").reverse());
    let query = Query {
        context,
        select: vec![
            SelectClause::Predicate("schema/name".into()),
            SelectClause::Predicate("friended".into()),
        ],
        select_one: true,
        from: Some(PatternTerm::Iri("ex/alice".into())),
        ..Query::new()
    };
    let result = execute(&db, &query).unwrap();
    assert_eq!(result["schema/name"], "Alice");
    let mut friended: Vec<String> = result["friended"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect();
    friended.sort();
    assert_eq!(friended, vec!["ex/brian".to_string(), "ex/cam".to_string()]);
}

#[test]
fn scenario_4_index_slice() {
    let session = session();
    let db = with_schema(session.open("led").unwrap());
    let db = db.with_flakes(vec![
        iri_flake(1, "ex/alice"),
        Flake::new(1, FAVNUMS_PREDICATE, Object::Int(9), 7, 0, true),
        Flake::new(1, FAVNUMS_PREDICATE, Object::Int(42), 7, 0, true),
        Flake::new(1, FAVNUMS_PREDICATE, Object::Int(76), 7, 0, true),
    ])
    .unwrap();

    let lo = Flake::new(1, FAVNUMS_PREDICATE, Object::Int(i64::MIN), 7, i64::MIN, true);
    let hi = Flake::new(1, FAVNUMS_PREDICATE, Object::Int(i64::MAX), 7, i64::MAX, true);
    let all: Vec<i64> = db
        .range(Index::Spot, Bound::Included(lo), Bound::Included(hi))
        .unwrap()
        .map(|r| match r.unwrap().o {
            Object::Int(i) => i,
            _ => panic!("expected int"),
        })
        .collect();
    assert_eq!(all, vec![9, 42, 76]);

    // Exact (s,p,o,dt) match, any `t`: the tail sentinel spans the full
    // range so the real flake's actual (negative) `t` still falls inside.
    let exact_lo = Flake::new(1, FAVNUMS_PREDICATE, Object::Int(42), 7, i64::MIN, true);
    let exact_hi = Flake::new(1, FAVNUMS_PREDICATE, Object::Int(42), 7, i64::MAX, true);
    let one: Vec<i64> = db
        .range(Index::Spot, Bound::Included(exact_lo), Bound::Included(exact_hi))
        .unwrap()
        .map(|r| match r.unwrap().o {
            Object::Int(i) => i,
            _ => panic!("expected int"),
        })
        .collect();
    assert_eq!(one, vec![42]);

    let mismatched_lo = Flake::new(1, FAVNUMS_PREDICATE, Object::Int(42), 8, i64::MIN, true);
    let mismatched_hi = Flake::new(1, FAVNUMS_PREDICATE, Object::Int(42), 8, i64::MAX, true);
    let none: Vec<i64> = db
        .range(Index::Spot, Bound::Included(mismatched_lo), Bound::Included(mismatched_hi))
        .unwrap()
        .map(|r| match r.unwrap().o {
            Object::Int(i) => i,
            _ => panic!("expected int"),
        })
        .collect();
    assert!(none.is_empty());
}

#[test]
fn scenario_5_time_travel_by_block() {
    let session = session();
    let committer = session.committer().clone();

    let db0 = with_schema(session.open("led").unwrap());
    let db1 = db0.with_flakes(vec![iri_flake(1, "ex/alice")]).unwrap();
    session.publish("led", db1.clone()).unwrap();
    let folded_1 = flakedb::fold_novelty(&db1, &committer, &flakedb::IndexConfig::new()).unwrap();
    session.publish("led", folded_1.clone()).unwrap();

    let db2 = folded_1.with_flakes(vec![iri_flake(2, "ex/brian")]).unwrap();
    session.publish("led", db2.clone()).unwrap();
    let folded_2 = flakedb::fold_novelty(&db2, &committer, &flakedb::IndexConfig::new()).unwrap();
    session.publish("led", folded_2.clone()).unwrap();

    assert_eq!(folded_1.block(), 1);
    assert_eq!(folded_2.block(), 2);

    let travelled = folded_2.time_travel(&committer, flakedb::TimePoint::Block(1)).unwrap();
    assert_eq!(travelled.block(), folded_1.block());
    assert_eq!(travelled.t(), folded_1.t());

    let subjects: Vec<i64> = travelled
        .range(Index::Spot, Bound::Unbounded, Bound::Unbounded)
        .unwrap()
        .map(|r| r.unwrap().s)
        .collect();
    assert_eq!(subjects, vec![1]);
}

#[test]
fn scenario_6_list_order_preservation() {
    let session = session();
    let db = with_schema(session.open("led").unwrap());
    let mut meta_for = |idx: i64| {
        let mut m = std::collections::BTreeMap::new();
        m.insert("listIdx".to_string(), Object::Int(idx));
        m
    };
    let db = db.with_flakes(vec![
        iri_flake(1, "L"),
        Flake::new(1, LIST_PREDICATE, Object::Int(42), 0, 0, true).with_meta(meta_for(0)),
        Flake::new(1, LIST_PREDICATE, Object::Int(2), 0, 0, true).with_meta(meta_for(1)),
        Flake::new(1, LIST_PREDICATE, Object::Int(88), 0, 0, true).with_meta(meta_for(2)),
        Flake::new(1, LIST_PREDICATE, Object::Int(1), 0, 0, true).with_meta(meta_for(3)),
    ])
    .unwrap();

    let query = Query {
        select: vec![SelectClause::Wildcard],
        from: Some(PatternTerm::Iri("L".into())),
        ..Query::new()
    };
    let result = execute(&db, &query).unwrap();
    let row = &result[0];
    assert_eq!(row["id"], "L");
    assert_eq!(row["ex/list"], serde_json::json!([42, 2, 88, 1]));
}
