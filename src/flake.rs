//! The atomic assertion/retraction record, `Flake`, and the tagged object
//! union it carries. See [`crate::comparator`] for the five total orders
//! defined over flakes.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

pub type SubjectId = i64;
pub type PredicateId = u64;
pub type Datatype = u64;
pub type Txn = i64;

/// Tagged union over the value an object position can hold.
///
/// Cross-datatype comparison never coerces: two objects are only compared
/// by value when their `dt` is equal. `Ref` carries the subject id a
/// reference-valued predicate points at; it is what makes a flake eligible
/// for the `opst` index (see [`crate::comparator`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Object {
    Int(i64),
    Float(f64),
    /// Arbitrary-precision decimal, carried as its canonical string form.
    Decimal(String),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Ref(SubjectId),
    Json(serde_json::Value),
}

impl Object {
    pub fn is_ref(&self) -> bool {
        matches!(self, Object::Ref(_))
    }

    fn discriminant(&self) -> u8 {
        match self {
            Object::Int(_) => 0,
            Object::Float(_) => 1,
            Object::Decimal(_) => 2,
            Object::Str(_) => 3,
            Object::Bool(_) => 4,
            Object::Bytes(_) => 5,
            Object::Ref(_) => 6,
            Object::Json(_) => 7,
        }
    }

    /// Best-effort numeric comparison of two decimal strings: parse as
    /// `f64` when possible, otherwise fall back to lexicographic order.
    /// Sufficient for the value orderings this crate needs; it is not a
    /// general-purpose bigdecimal comparator.
    fn cmp_decimal(a: &str, b: &str) -> Ordering {
        match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.total_cmp(&y),
            _ => a.cmp(b),
        }
    }

    fn cmp_json(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
        // Canonical compact encoding gives a deterministic, if arbitrary,
        // total order over otherwise-unordered JSON values.
        let ca = serde_json::to_string(a).unwrap_or_default();
        let cb = serde_json::to_string(b).unwrap_or_default();
        ca.cmp(&cb)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Object {}

impl PartialOrd for Object {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Object {
    fn cmp(&self, other: &Self) -> Ordering {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Decimal(a), Decimal(b)) => Object::cmp_decimal(a, b),
            (Str(a), Str(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Ref(a), Ref(b)) => a.cmp(b),
            (Json(a), Json(b)) => Object::cmp_json(a, b),
            // Mismatched variants only arise if a caller mixes datatypes
            // without the `dt` tag agreeing; fall back to a stable,
            // arbitrary order so Ord's total-order contract still holds.
            (a, b) => a.discriminant().cmp(&b.discriminant()),
        }
    }
}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        match self {
            Object::Int(v) => v.hash(state),
            Object::Float(v) => v.to_bits().hash(state),
            Object::Decimal(v) | Object::Str(v) => v.hash(state),
            Object::Bool(v) => v.hash(state),
            Object::Bytes(v) => v.hash(state),
            Object::Ref(v) => v.hash(state),
            Object::Json(v) => serde_json::to_string(v).unwrap_or_default().hash(state),
        }
    }
}

/// Optional per-flake metadata, e.g. `@list` element index. Kept as a
/// `BTreeMap` so its canonical serialization (used for the final comparator
/// tie-break) is deterministic.
pub type Meta = BTreeMap<String, Object>;

fn canonical_meta(m: &Option<Meta>) -> String {
    match m {
        None => String::new(),
        Some(map) => {
            let mut parts = Vec::with_capacity(map.len());
            for (k, v) in map.iter() {
                parts.push(format!("{}={:?}", k, v));
            }
            parts.join("\u{1}")
        }
    }
}

/// The atomic assertion/retraction. See module docs and `spec.md` §3.1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flake {
    pub s: SubjectId,
    pub p: PredicateId,
    pub o: Object,
    pub dt: Datatype,
    pub t: Txn,
    pub op: bool,
    pub m: Option<Meta>,
}

impl Flake {
    pub fn new(s: SubjectId, p: PredicateId, o: Object, dt: Datatype, t: Txn, op: bool) -> Flake {
        Flake {
            s,
            p,
            o,
            dt,
            t,
            op,
            m: None,
        }
    }

    pub fn with_meta(mut self, m: Meta) -> Flake {
        self.m = Some(m);
        self
    }

    /// `(s, p, o, dt)`, the key that identifies a single assertion group
    /// across its history of versions.
    pub fn group_key(&self) -> (SubjectId, PredicateId, &Object, Datatype) {
        (self.s, self.p, &self.o, self.dt)
    }

    pub(crate) fn canonical_meta(&self) -> String {
        canonical_meta(&self.m)
    }
}

impl PartialEq for Flake {
    fn eq(&self, other: &Self) -> bool {
        self.s == other.s
            && self.p == other.p
            && self.o == other.o
            && self.dt == other.dt
            && self.t == other.t
            && self.op == other.op
            && self.canonical_meta() == other.canonical_meta()
    }
}

impl Eq for Flake {}
