//! Per-subject projection and graph crawl. See `spec.md` §4.7's `{var:
//! [selection]}` map clause and `@reverse` traversal.
//!
//! Grounded on the teacher's `scans.rs` merge-scan idiom for collapsing a
//! sorted stream into "current state", generalized here from MVCC's single
//! latest-value-per-key rule to this crate's per-`(s,p,o,dt)` group rule.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

use serde_json::{Map, Value};

use crate::comparator::Index;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::flake::{Flake, Object};
use crate::schema::Schema;

use super::ast::SelectClause;
use super::context::Context;

/// Reserved predicate id resolving a subject's declared IRI to/from its
/// internal integer id.
pub const IRI_PREDICATE: u64 = 1;
/// Reserved predicate id for `rdf/type`-style class assertions. Objects on
/// this predicate are plain IRI strings, not subject references.
pub const RDF_TYPE_PREDICATE: u64 = 2;
const RDF_TYPE_KEY: &str = "rdf/type";

/// Collapses a scan already ordered by one of the five comparators down to
/// current state. Within each `(s, p, o, dt)` group the comparator places
/// the most recent qualifying flake first (see [`crate::comparator`]'s
/// recency note), so the first flake seen per group is the one that wins;
/// the group survives only if that flake asserts.
pub fn current_state<I: Iterator<Item = Flake>>(flakes: I) -> Vec<Flake> {
    let mut out = Vec::new();
    let mut last_key: Option<(i64, u64, Object, u64)> = None;
    for f in flakes {
        let key = (f.s, f.p, f.o.clone(), f.dt);
        if last_key.as_ref() != Some(&key) {
            last_key = Some(key);
            if f.op {
                out.push(f);
            }
        }
    }
    out
}

/// A half-open `spot` range covering every flake with subject `sid`,
/// regardless of predicate or object — safe to build without knowing any
/// object's datatype, since `spot` compares `s` before `o`/`dt` and the
/// bound flakes differ from every real flake on `s` alone.
pub fn subject_bounds(sid: i64) -> (Bound<Flake>, Bound<Flake>) {
    let lo = Flake::new(sid, 0, Object::Int(i64::MIN), 0, i64::MIN, true);
    let hi = Flake::new(sid.saturating_add(1), 0, Object::Int(i64::MIN), 0, i64::MIN, true);
    (Bound::Included(lo), Bound::Excluded(hi))
}

fn subject_flakes(db: &Db, sid: i64) -> Result<Vec<Flake>> {
    let (from, to) = subject_bounds(sid);
    let scan = db.range(Index::Spot, from, to)?;
    Ok(current_state(scan.collect::<Result<Vec<_>>>()?.into_iter()))
}

/// Resolves an IRI to its subject id via [`IRI_PREDICATE`]. Scans the whole
/// `post` index and filters in memory rather than constructing a tight
/// bound, since the object side carries a string value whose ordering
/// against a sentinel bound flake isn't safe to assume (cmp_o compares
/// `dt` before value, and `dt` isn't known without reading the schema).
pub fn resolve_subject_iri(db: &Db, iri: &str) -> Result<i64> {
    let scan = db.range(Index::Post, Bound::Unbounded, Bound::Unbounded)?;
    let matches = current_state(
        scan.collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|f| f.p == IRI_PREDICATE),
    );
    matches
        .into_iter()
        .find(|f| matches!(&f.o, Object::Str(s) if s == iri))
        .map(|f| f.s)
        .ok_or_else(|| Error::InvalidQuery(format!("no subject with iri {}", iri)))
}

fn subject_iri(db: &Db, sid: i64) -> Result<Option<String>> {
    let flakes = subject_flakes(db, sid)?;
    Ok(flakes.into_iter().find(|f| f.p == IRI_PREDICATE).and_then(
        |f| match f.o {
            Object::Str(s) => Some(s),
            _ => None,
        },
    ))
}

fn ref_stub(db: &Db, sid: i64) -> Value {
    let mut m = Map::new();
    match subject_iri(db, sid) {
        Ok(Some(iri)) => m.insert("id".into(), Value::String(iri)),
        _ => m.insert("id".into(), Value::from(sid)),
    };
    Value::Object(m)
}

pub(crate) fn object_to_json(db: &Db, obj: &Object) -> Value {
    match obj {
        Object::Int(i) => Value::from(*i),
        Object::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Object::Decimal(s) | Object::Str(s) => Value::String(s.clone()),
        Object::Bool(b) => Value::Bool(*b),
        Object::Bytes(b) => serde_json::to_value(b).unwrap_or(Value::Null),
        Object::Json(v) => v.clone(),
        Object::Ref(sid) => ref_stub(db, *sid),
    }
}

/// Orders a predicate's current-state flakes: by declared `@list` position
/// (carried in `Flake::m["listIdx"]`) when the predicate is a list
/// container, else left in the index's natural value order.
fn order_values(mut flakes: Vec<Flake>, is_list: bool) -> Vec<Flake> {
    if is_list {
        flakes.sort_by_key(|f| match f.m.as_ref().and_then(|m| m.get("listIdx")) {
            Some(Object::Int(i)) => *i,
            _ => i64::MAX,
        });
    }
    flakes
}

fn compact_predicate(ctx: &Context, pid: u64, iri_hint: Option<&str>) -> String {
    match iri_hint {
        Some(iri) => ctx.compact(iri),
        None => format!("p/{}", pid),
    }
}

fn reverse_refs(db: &Db, pid: u64, sid: i64) -> Result<Vec<i64>> {
    let scan = db.range(Index::Opst, Bound::Unbounded, Bound::Unbounded)?;
    let flakes = current_state(scan.collect::<Result<Vec<_>>>()?.into_iter());
    Ok(flakes
        .into_iter()
        .filter(|f| f.p == pid && matches!(&f.o, Object::Ref(s) if *s == sid))
        .map(|f| f.s)
        .collect())
}

fn project_all_predicates(db: &Db, ctx: &Context, schema: &Schema, sid: i64, obj: &mut Map<String, Value>) -> Result<()> {
    let flakes = subject_flakes(db, sid)?;
    let mut by_pred: BTreeMap<u64, Vec<Flake>> = BTreeMap::new();
    for f in flakes {
        if f.p == IRI_PREDICATE {
            continue;
        }
        by_pred.entry(f.p).or_default().push(f);
    }
    for (pid, group) in by_pred {
        if pid == RDF_TYPE_PREDICATE {
            let values: Vec<Value> = group
                .iter()
                .map(|f| match &f.o {
                    Object::Str(s) => Value::String(ctx.compact(s)),
                    other => object_to_json(db, other),
                })
                .collect();
            obj.insert(RDF_TYPE_KEY.to_string(), Value::Array(values));
            continue;
        }
        let iri_hint = schema.iri_for_predicate(pid);
        let key = compact_predicate(ctx, pid, iri_hint);
        let meta = iri_hint.and_then(|iri| schema.predicate(iri));
        let is_list = meta.map(|m| m.list).unwrap_or(false);
        let multi = meta.map(|m| m.multi).unwrap_or(group.len() > 1);
        let ordered = order_values(group, is_list);
        let values: Vec<Value> = ordered.iter().map(|f| object_to_json(db, &f.o)).collect();
        let value = if multi || is_list {
            Value::Array(values)
        } else {
            values.into_iter().next().unwrap_or(Value::Null)
        };
        obj.insert(key, value);
    }
    Ok(())
}

fn project_clause(
    db: &Db,
    ctx: &Context,
    schema: &Schema,
    sid: i64,
    clause: &SelectClause,
    depth: u32,
    seen: &mut HashSet<i64>,
) -> Result<Option<(String, Value)>> {
    match clause {
        SelectClause::Wildcard => Ok(None),
        // Plain `where`-bound variables are projected at the row level by
        // the executor, not per subject; nothing to add here.
        SelectClause::Variable(_) => Ok(None),
        SelectClause::Predicate(local) => {
            let iri = ctx.expand(local);
            let pid = schema
                .predicate(&iri)
                .map(|m| m.id)
                .ok_or_else(|| Error::InvalidQuery(format!("unknown predicate {}", local)))?;
            if ctx.is_reverse(local) {
                let refs = reverse_refs(db, pid, sid)?;
                let arr: Vec<Value> = refs.into_iter().map(|s| ref_stub(db, s)).collect();
                Ok(Some((local.clone(), Value::Array(arr))))
            } else {
                let multi = schema.predicate(&iri).map(|m| m.multi).unwrap_or(false);
                let is_list = ctx.is_list(local);
                let group: Vec<Flake> = subject_flakes(db, sid)?.into_iter().filter(|f| f.p == pid).collect();
                let ordered = order_values(group, is_list);
                let values: Vec<Value> = ordered.iter().map(|f| object_to_json(db, &f.o)).collect();
                let value = if multi || is_list {
                    Value::Array(values)
                } else {
                    values.into_iter().next().unwrap_or(Value::Null)
                };
                Ok(Some((local.clone(), value)))
            }
        }
        SelectClause::Map { var, selection, depth: clause_depth } => {
            let iri = ctx.expand(var);
            let pid = schema
                .predicate(&iri)
                .map(|m| m.id)
                .ok_or_else(|| Error::InvalidQuery(format!("unknown predicate {}", var)))?;
            let next_depth = clause_depth.unwrap_or(depth);
            let targets: Vec<i64> = if ctx.is_reverse(var) {
                reverse_refs(db, pid, sid)?
            } else {
                subject_flakes(db, sid)?
                    .into_iter()
                    .filter(|f| f.p == pid)
                    .filter_map(|f| match f.o {
                        Object::Ref(s) => Some(s),
                        _ => None,
                    })
                    .collect()
            };
            let mut nested = Vec::with_capacity(targets.len());
            for target in targets {
                if next_depth == 0 {
                    nested.push(ref_stub(db, target));
                } else {
                    nested.push(project_subject(db, ctx, schema, target, selection, next_depth - 1, seen)?);
                }
            }
            Ok(Some((var.clone(), Value::Array(nested))))
        }
        SelectClause::Aggregate { func, args } => {
            if func != "count" {
                return Err(Error::InvalidQuery(format!("unsupported aggregate {}", func)));
            }
            let mut total = 0usize;
            for arg in args {
                let iri = ctx.expand(arg);
                let pid = schema.predicate(&iri).map(|m| m.id);
                if let Some(pid) = pid {
                    total += subject_flakes(db, sid)?.into_iter().filter(|f| f.p == pid).count();
                }
            }
            Ok(Some((func.clone(), Value::from(total))))
        }
    }
}

/// Projects `selection` onto subject `sid`, recursing through `Map`
/// clauses up to `depth` hops. `seen` tracks the subjects on the current
/// recursion path so a cycle in the graph yields a reference stub instead
/// of looping forever, independent of the `depth` bound.
pub fn project_subject(
    db: &Db,
    ctx: &Context,
    schema: &Schema,
    sid: i64,
    selection: &[SelectClause],
    depth: u32,
    seen: &mut HashSet<i64>,
) -> Result<Value> {
    if !seen.insert(sid) {
        return Ok(ref_stub(db, sid));
    }
    let mut obj = Map::new();
    let wants_wildcard = selection.iter().any(|c| matches!(c, SelectClause::Wildcard));
    // `id` is only implied by a wildcard selection — an explicit select
    // list (e.g. a `selectOne` naming specific predicates) returns exactly
    // the fields it asked for, per `spec.md` §8's reverse-context scenario.
    if wants_wildcard {
        obj.insert(
            "id".to_string(),
            match subject_iri(db, sid)? {
                Some(iri) => Value::String(iri),
                None => Value::from(sid),
            },
        );
        project_all_predicates(db, ctx, schema, sid, &mut obj)?;
    }
    for clause in selection {
        if let Some((key, value)) = project_clause(db, ctx, schema, sid, clause, depth, seen)? {
            obj.insert(key, value);
        }
    }
    seen.remove(&sid);
    Ok(Value::Object(obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::DbRoot;
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
            .with_predicate("ex/name", PredicateMeta::new(10))
            .with_predicate("ex/friend", PredicateMeta::new(11).set_ref(true).set_multi(true));
        let db = Db::open(resolver, root);
        db.with_flakes(vec![
            Flake::new(1, IRI_PREDICATE, Object::Str("ex/alice".into()), 0, 0, true),
            Flake::new(1, 10, Object::Str("Alice".into()), 0, 0, true),
            Flake::new(1, 11, Object::Ref(2), 0, 0, true),
            Flake::new(2, IRI_PREDICATE, Object::Str("ex/bob".into()), 0, 0, true),
        ])
        .unwrap()
    }

    #[test]
    fn resolve_subject_iri_finds_the_matching_subject() {
        let db = fixture();
        assert_eq!(resolve_subject_iri(&db, "ex/alice").unwrap(), 1);
    }

    #[test]
    fn wildcard_projection_includes_every_asserted_predicate() {
        let db = fixture();
        let ctx = Context::new();
        let mut seen = HashSet::new();
        let value = project_subject(&db, &ctx, db.schema(), 1, &[SelectClause::Wildcard], 0, &mut seen).unwrap();
        assert_eq!(value["id"], Value::String("ex/alice".into()));
        assert_eq!(value["ex/name"], Value::String("Alice".into()));
        assert!(value["ex/friend"].is_array());
    }

    #[test]
    fn retracting_a_value_removes_it_from_current_state() {
        let db = fixture();
        let db = db.with_flakes(vec![Flake::new(1, 10, Object::Str("Alice".into()), 0, 0, false)]).unwrap();
        let ctx = Context::new();
        let mut seen = HashSet::new();
        let value = project_subject(&db, &ctx, db.schema(), 1, &[SelectClause::Wildcard], 0, &mut seen).unwrap();
        assert!(value.get("ex/name").is_none());
    }

    #[test]
    fn cyclic_reference_is_cut_by_the_seen_set() {
        let db = fixture();
        let db = db.with_flakes(vec![Flake::new(2, 11, Object::Ref(1), 0, 0, true)]).unwrap();
        let ctx = Context::new();
        let selection = vec![SelectClause::Map {
            var: "ex/friend".to_string(),
            selection: vec![SelectClause::Map {
                var: "ex/friend".to_string(),
                selection: vec![SelectClause::Wildcard],
                depth: None,
            }],
            depth: Some(5),
        }];
        let mut seen = HashSet::new();
        let value = project_subject(&db, &ctx, db.schema(), 1, &selection, 5, &mut seen).unwrap();
        assert!(value["ex/friend"].is_array());
    }
}
