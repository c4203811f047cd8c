//! Ties the `where`-pattern join, context resolution, and per-subject
//! projection together into one entry point. See `spec.md` §4.7.
//!
//! The multi-pattern join always scans `spot` and filters in memory rather
//! than routing each pattern through [`super::plan::choose_index`]: every
//! `(s, p, o, dt)` grouping is equally valid under any of the five
//! comparators, and `spot` needs no extra per-pattern bound construction.
//! `plan::choose_index` documents (and is tested against) the intended
//! index choice for callers that scan a single pattern directly.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

use serde_json::{Map, Value};

use crate::comparator::Index;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::flake::Object;
use crate::schema::Schema;

use super::ast::{PatternTerm, Query, SelectClause, WherePattern};
use super::context::Context;
use super::crawl::{current_state, object_to_json, project_subject, resolve_subject_iri};

#[derive(Clone, Debug, PartialEq)]
pub enum BoundValue {
    Sid(i64),
    Obj(Object, u64),
}

pub type Bindings = BTreeMap<String, BoundValue>;

fn value_to_bound(v: &Value) -> BoundValue {
    match v {
        Value::String(s) => BoundValue::Obj(Object::Str(s.clone()), 0),
        Value::Bool(b) => BoundValue::Obj(Object::Bool(*b), 0),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoundValue::Obj(Object::Int(i), 0),
            None => BoundValue::Obj(Object::Float(n.as_f64().unwrap_or(0.0)), 0),
        },
        other => BoundValue::Obj(Object::Json(other.clone()), 0),
    }
}

fn term_to_binding(db: &Db, term: &PatternTerm, bindings: &Bindings, term_is_ref: bool) -> Result<Option<BoundValue>> {
    match term {
        PatternTerm::Var(name) => Ok(bindings.get(name).cloned()),
        PatternTerm::Sid(sid) => Ok(Some(BoundValue::Sid(*sid))),
        PatternTerm::Iri(iri) => {
            if term_is_ref {
                Ok(Some(BoundValue::Sid(resolve_subject_iri(db, iri)?)))
            } else {
                Ok(Some(BoundValue::Obj(Object::Str(iri.clone()), 0)))
            }
        }
        PatternTerm::Literal(v) => Ok(Some(value_to_bound(v))),
    }
}

/// Joins a sequence of `where` patterns by nested-loop binding propagation:
/// every pattern is matched against the current-state `spot` scan, each
/// surviving flake extends every binding it's compatible with. Requires
/// each pattern's predicate position to be a literal IRI — an unbound
/// predicate variable (`[?s, ?p, ?o]`) isn't supported.
pub fn run_where(db: &Db, ctx: &Context, schema: &Schema, patterns: &[WherePattern]) -> Result<Vec<Bindings>> {
    let mut frontier: Vec<Bindings> = vec![Bindings::new()];
    for pattern in patterns {
        let pred_local = match &pattern.p {
            PatternTerm::Iri(local) => local,
            _ => return Err(Error::InvalidQuery("where pattern predicate must be a bound IRI".into())),
        };
        let pred_iri = ctx.expand(pred_local);
        let meta = schema
            .predicate(&pred_iri)
            .ok_or_else(|| Error::InvalidQuery(format!("unknown predicate {}", pred_iri)))?;
        let pid = meta.id;
        let o_is_ref = meta.ref_;

        let scan = db.range(Index::Spot, Bound::Unbounded, Bound::Unbounded)?;
        let winners = current_state(scan.collect::<Result<Vec<_>>>()?.into_iter());

        let mut next = Vec::new();
        for binding in &frontier {
            let s_term = term_to_binding(db, &pattern.s, binding, true)?;
            let o_term = term_to_binding(db, &pattern.o, binding, o_is_ref)?;

            for flake in &winners {
                if flake.p != pid {
                    continue;
                }
                if let Some(BoundValue::Sid(sid)) = &s_term {
                    if flake.s != *sid {
                        continue;
                    }
                }
                if let Some(bv) = &o_term {
                    let matches = match bv {
                        BoundValue::Sid(sid) => matches!(flake.o, Object::Ref(s) if s == *sid),
                        BoundValue::Obj(obj, dt) => flake.o == *obj && flake.dt == *dt,
                    };
                    if !matches {
                        continue;
                    }
                }
                let mut extended = binding.clone();
                if let PatternTerm::Var(name) = &pattern.s {
                    extended.entry(name.clone()).or_insert(BoundValue::Sid(flake.s));
                }
                if let PatternTerm::Var(name) = &pattern.o {
                    let bv = match &flake.o {
                        Object::Ref(sid) => BoundValue::Sid(*sid),
                        other => BoundValue::Obj(other.clone(), flake.dt),
                    };
                    extended.entry(name.clone()).or_insert(bv);
                }
                next.push(extended);
            }
        }
        frontier = next;
    }
    Ok(frontier)
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .zip(y.as_f64())
            .map(|(x, y)| x.total_cmp(&y))
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

/// Sorts `rows` by the fields named in `order_by`, most-significant key
/// first. A `-`-prefixed field name sorts that key descending.
fn apply_order_by(rows: &mut [Value], order_by: &[String]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in order_by {
            let (field, desc) = match key.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (key.as_str(), false),
            };
            let av = a.get(field).cloned().unwrap_or(Value::Null);
            let bv = b.get(field).cloned().unwrap_or(Value::Null);
            let ord = compare_values(&av, &bv);
            let ord = if desc { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Groups `rows` by the values bound to `group_by`'s fields: those fields
/// keep their scalar value per group, every other field present on any row
/// in the group collects into an array in first-seen order. Groups
/// themselves preserve first-seen order.
fn apply_group_by(rows: Vec<Value>, group_by: &[String]) -> Vec<Value> {
    if group_by.is_empty() {
        return rows;
    }
    let mut groups: Vec<(Vec<Value>, Map<String, Value>)> = Vec::new();
    for row in rows {
        let fields = match row {
            Value::Object(fields) => fields,
            other => {
                let mut m = Map::new();
                m.insert("value".to_string(), other);
                m
            }
        };
        let key: Vec<Value> = group_by
            .iter()
            .map(|k| fields.get(k).cloned().unwrap_or(Value::Null))
            .collect();
        let acc = match groups.iter_mut().find(|(k, _)| k == &key) {
            Some((_, acc)) => acc,
            None => {
                let mut acc = Map::new();
                for (k, v) in group_by.iter().zip(key.iter()) {
                    acc.insert(k.clone(), v.clone());
                }
                groups.push((key, acc));
                &mut groups.last_mut().unwrap().1
            }
        };
        for (k, v) in fields {
            if group_by.contains(&k) {
                continue;
            }
            match acc.entry(k).or_insert_with(|| Value::Array(Vec::new())) {
                Value::Array(arr) => arr.push(v),
                _ => unreachable!("group accumulator fields are always arrays"),
            }
        }
    }
    groups.into_iter().map(|(_, acc)| Value::Object(acc)).collect()
}

fn project_binding_row(db: &Db, ctx: &Context, schema: &Schema, query: &Query, binding: &Bindings, depth: u32) -> Result<Value> {
    let mut row = Map::new();
    let subject_var = binding.values().find_map(|bv| match bv {
        BoundValue::Sid(s) => Some(*s),
        _ => None,
    });
    for clause in &query.select {
        match clause {
            SelectClause::Variable(name) => {
                let value = match binding.get(name) {
                    Some(BoundValue::Sid(sid)) => {
                        let mut seen = HashSet::new();
                        project_subject(db, ctx, schema, *sid, &[SelectClause::Wildcard], depth, &mut seen)?
                    }
                    Some(BoundValue::Obj(obj, _)) => object_to_json(db, obj),
                    None => Value::Null,
                };
                row.insert(name.clone(), value);
            }
            other => {
                // Non-variable clauses project off the first subject-typed
                // binding in the row, mirroring how the `from` path selects
                // against a single fixed subject.
                if let Some(sid) = subject_var {
                    let mut seen = HashSet::new();
                    let nested = project_subject(db, ctx, schema, sid, std::slice::from_ref(other), depth, &mut seen)?;
                    if let Value::Object(fields) = nested {
                        for (k, v) in fields {
                            if k != "id" {
                                row.insert(k, v);
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(Value::Object(row))
}

/// Runs a fully-built [`Query`] against a snapshot and returns its result
/// as a JSON value: an array of rows, or (with `select_one`) a single row
/// (`Value::Null` if nothing matched).
pub fn execute(db: &Db, query: &Query) -> Result<Value> {
    let ctx = Context::from_map(query.context.clone());
    let schema = db.schema();
    let depth = query.depth.unwrap_or(4);

    let mut rows: Vec<Value> = if let Some(from) = &query.from {
        let sid = match from {
            PatternTerm::Sid(sid) => *sid,
            PatternTerm::Iri(iri) => resolve_subject_iri(db, iri)?,
            PatternTerm::Var(_) | PatternTerm::Literal(_) => {
                return Err(Error::InvalidQuery("`from` must name a subject".into()))
            }
        };
        let mut seen = HashSet::new();
        vec![project_subject(db, &ctx, schema, sid, &query.select, depth, &mut seen)?]
    } else if !query.where_.is_empty() {
        let bindings = run_where(db, &ctx, schema, &query.where_)?;
        let mut out = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            out.push(project_binding_row(db, &ctx, schema, query, binding, depth)?);
        }
        out
    } else {
        return Err(Error::InvalidQuery("query needs a `from` or `where` clause".into()));
    };

    if query.distinct {
        let mut seen_json = HashSet::new();
        rows.retain(|v| seen_json.insert(v.to_string()));
    }
    if !query.group_by.is_empty() {
        rows = apply_group_by(rows, &query.group_by);
    }
    apply_order_by(&mut rows, &query.order_by);
    if let Some(offset) = query.offset {
        rows = rows.into_iter().skip(offset).collect();
    }
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    if query.select_one {
        return Ok(rows.into_iter().next().unwrap_or(Value::Null));
    }
    Ok(Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::DbRoot;
    use crate::flake::Flake;
    use crate::query::context::ContextEntry;
    use crate::schema::PredicateMeta;
    use crate::serde_codec::NativeCodec;
    use crate::store::mem::MemStore;
    use std::sync::Arc;

    fn fixture() -> Db {
        let store: Arc<dyn crate::store::Store> = Arc::new(MemStore::new());
        let codec: Arc<dyn crate::serde_codec::Serde> = Arc::new(NativeCodec);
        let resolver = Arc::new(crate::index_tree::resolver::Resolver::new(store, codec, 1 << 20));
        let mut root = DbRoot::genesis("net", "led");
        root.schema = root
            .schema
            .with_predicate("schema/name", PredicateMeta::new(10))
            .with_predicate("ex/friend", PredicateMeta::new(11).set_ref(true).set_multi(true));
        let db = Db::open(resolver, root);
        db.with_flakes(vec![
            Flake::new(1, crate::query::crawl::IRI_PREDICATE, Object::Str("ex/alice".into()), 0, 0, true),
            Flake::new(1, 10, Object::Str("Alice".into()), 0, 0, true),
            Flake::new(1, 11, Object::Ref(2), 0, 0, true),
            Flake::new(2, crate::query::crawl::IRI_PREDICATE, Object::Str("ex/bob".into()), 0, 0, true),
            Flake::new(2, 10, Object::Str("Bob".into()), 0, 0, true),
        ])
        .unwrap()
    }

    #[test]
    fn from_with_wildcard_projects_the_whole_subject() {
        let db = fixture();
        let query = Query {
            from: Some(PatternTerm::Iri("ex/alice".into())),
            select: vec![SelectClause::Wildcard],
            ..Query::new()
        };
        let result = execute(&db, &query).unwrap();
        let row = &result[0];
        assert_eq!(row["schema/name"], Value::String("Alice".into()));
    }

    #[test]
    fn select_one_unwraps_the_single_row() {
        let db = fixture();
        let query = Query {
            from: Some(PatternTerm::Iri("ex/alice".into())),
            select: vec![SelectClause::Predicate("schema/name".into())],
            select_one: true,
            ..Query::new()
        };
        let result = execute(&db, &query).unwrap();
        assert!(result.is_object());
        assert_eq!(result["schema/name"], Value::String("Alice".into()));
    }

    #[test]
    fn reverse_context_entry_finds_the_referencing_subject() {
        let db = fixture();
        let mut context = BTreeMap::new();
        context.insert("friended".to_string(), ContextEntry::new("ex/friend").reverse());
        let query = Query {
            context,
            from: Some(PatternTerm::Iri("ex/bob".into())),
            select: vec![SelectClause::Predicate("friended".into())],
            ..Query::new()
        };
        let result = execute(&db, &query).unwrap();
        let friended = result[0]["friended"].as_array().unwrap();
        assert_eq!(friended.len(), 1);
        assert_eq!(friended[0]["id"], Value::String("ex/alice".into()));
    }

    #[test]
    fn where_join_binds_friend_pairs() {
        let db = fixture();
        let ctx = Context::new();
        let patterns = vec![WherePattern {
            s: PatternTerm::Var("s".into()),
            p: PatternTerm::Iri("ex/friend".into()),
            o: PatternTerm::Var("o".into()),
        }];
        let bindings = run_where(&db, &ctx, db.schema(), &patterns).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].get("s"), Some(&BoundValue::Sid(1)));
        assert_eq!(bindings[0].get("o"), Some(&BoundValue::Sid(2)));
    }

    #[test]
    fn order_by_sorts_rows_ascending_or_descending() {
        let mut rows = vec![
            serde_json::json!({"name": "b", "score": 2}),
            serde_json::json!({"name": "a", "score": 3}),
            serde_json::json!({"name": "c", "score": 1}),
        ];
        apply_order_by(&mut rows, &["score".to_string()]);
        let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);

        apply_order_by(&mut rows, &["-score".to_string()]);
        let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn group_by_collects_non_key_fields_into_arrays_per_group() {
        let rows = vec![
            serde_json::json!({"team": "red", "name": "alice"}),
            serde_json::json!({"team": "red", "name": "bob"}),
            serde_json::json!({"team": "blue", "name": "cam"}),
        ];
        let grouped = apply_group_by(rows, &["team".to_string()]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0]["team"], Value::String("red".into()));
        assert_eq!(grouped[0]["name"], serde_json::json!(["alice", "bob"]));
        assert_eq!(grouped[1]["team"], Value::String("blue".into()));
        assert_eq!(grouped[1]["name"], serde_json::json!(["cam"]));
    }

    #[test]
    fn execute_applies_order_by_over_a_where_join() {
        let store: Arc<dyn crate::store::Store> = Arc::new(MemStore::new());
        let codec: Arc<dyn crate::serde_codec::Serde> = Arc::new(NativeCodec);
        let resolver = Arc::new(crate::index_tree::resolver::Resolver::new(store, codec, 1 << 20));
        let mut root = DbRoot::genesis("net", "led");
        root.schema = root.schema.with_predicate("ex/score", PredicateMeta::new(20));
        let db = Db::open(resolver, root);
        let db = db
            .with_flakes(vec![
                Flake::new(1, 20, Object::Int(3), 0, 0, true),
                Flake::new(2, 20, Object::Int(1), 0, 0, true),
                Flake::new(3, 20, Object::Int(2), 0, 0, true),
            ])
            .unwrap();

        let query = Query {
            where_: vec![WherePattern {
                s: PatternTerm::Var("s".into()),
                p: PatternTerm::Iri("ex/score".into()),
                o: PatternTerm::Var("score".into()),
            }],
            select: vec![SelectClause::Variable("score".into())],
            order_by: vec!["score".to_string()],
            ..Query::new()
        };
        let result = execute(&db, &query).unwrap();
        let scores: Vec<i64> = result.as_array().unwrap().iter().map(|r| r["score"].as_i64().unwrap()).collect();
        assert_eq!(scores, vec![1, 2, 3]);
    }

    #[test]
    fn execute_applies_group_by_over_a_where_join() {
        let store: Arc<dyn crate::store::Store> = Arc::new(MemStore::new());
        let codec: Arc<dyn crate::serde_codec::Serde> = Arc::new(NativeCodec);
        let resolver = Arc::new(crate::index_tree::resolver::Resolver::new(store, codec, 1 << 20));
        let mut root = DbRoot::genesis("net", "led");
        root.schema = root
            .schema
            .with_predicate("ex/team", PredicateMeta::new(21))
            .with_predicate("ex/member", PredicateMeta::new(22));
        let db = Db::open(resolver, root);
        let db = db
            .with_flakes(vec![
                Flake::new(1, 21, Object::Str("red".into()), 0, 0, true),
                Flake::new(1, 22, Object::Str("alice".into()), 0, 0, true),
                Flake::new(2, 21, Object::Str("red".into()), 0, 0, true),
                Flake::new(2, 22, Object::Str("bob".into()), 0, 0, true),
                Flake::new(3, 21, Object::Str("blue".into()), 0, 0, true),
                Flake::new(3, 22, Object::Str("cam".into()), 0, 0, true),
            ])
            .unwrap();

        let query = Query {
            where_: vec![
                WherePattern {
                    s: PatternTerm::Var("s".into()),
                    p: PatternTerm::Iri("ex/team".into()),
                    o: PatternTerm::Var("team".into()),
                },
                WherePattern {
                    s: PatternTerm::Var("s".into()),
                    p: PatternTerm::Iri("ex/member".into()),
                    o: PatternTerm::Var("name".into()),
                },
            ],
            select: vec![SelectClause::Variable("team".into()), SelectClause::Variable("name".into())],
            group_by: vec!["team".to_string()],
            ..Query::new()
        };
        let result = execute(&db, &query).unwrap();
        let groups = result.as_array().unwrap();
        assert_eq!(groups.len(), 2);
        let red = groups.iter().find(|g| g["team"] == "red").unwrap();
        let mut names: Vec<&str> = red["name"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        names.sort();
        assert_eq!(names, vec!["alice", "bob"]);
    }
}
