//! The five total orders over [`Flake`] that back the named indexes.
//!
//! Tie-breaking always cascades through the field sequence and ends with
//! `op` (assert before retract) and `m` (canonical metadata serialization)
//! so that the comparator is a strict total order: no two distinct flakes
//! ever compare equal.
//!
//! **Recency direction.** A flake's `t` decreases by one with every
//! transaction (`with_flakes` in [`crate::db`]), so the *oldest* flake in a
//! ledger carries the *largest* (closest-to-zero) `t` and the most recent
//! carries the smallest (most negative). `as_of(db, t*)` keeps flakes with
//! `t >= t*` — straight from the spec's own formula — which only holds
//! together if "recent" means "numerically smaller". This crate's `t`
//! component of every comparator is therefore a plain ascending compare on
//! the raw integer: that ascending order already yields recent-first,
//! which is what the spec's informal "t desc" phrasing is after.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::flake::Flake;

/// Which of the five canonical orderings a node or scan belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Index {
    Spot,
    Psot,
    Post,
    Opst,
    Tspo,
}

impl Index {
    pub const ALL: [Index; 5] = [Index::Spot, Index::Psot, Index::Post, Index::Opst, Index::Tspo];

    pub fn compare(&self, a: &Flake, b: &Flake) -> Ordering {
        match self {
            Index::Spot => cmp_spot(a, b),
            Index::Psot => cmp_psot(a, b),
            Index::Post => cmp_post(a, b),
            Index::Opst => cmp_opst(a, b),
            Index::Tspo => cmp_tspo(a, b),
        }
    }

    /// Whether a flake participates in this index at all. Only `opst`
    /// restricts membership (to reference-valued objects); the other four
    /// index every flake.
    pub fn admits(&self, flake: &Flake) -> bool {
        match self {
            Index::Opst => flake.o.is_ref(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Index::Spot => "spot",
            Index::Psot => "psot",
            Index::Post => "post",
            Index::Opst => "opst",
            Index::Tspo => "tspo",
        }
    }
}

fn cmp_s(a: &Flake, b: &Flake) -> Ordering {
    a.s.cmp(&b.s)
}
fn cmp_p(a: &Flake, b: &Flake) -> Ordering {
    a.p.cmp(&b.p)
}
fn cmp_o(a: &Flake, b: &Flake) -> Ordering {
    a.dt.cmp(&b.dt).then_with(|| a.o.cmp(&b.o))
}
fn cmp_t_recency(a: &Flake, b: &Flake) -> Ordering {
    a.t.cmp(&b.t)
}
fn cmp_op(a: &Flake, b: &Flake) -> Ordering {
    // assert (true) sorts before retract (false) among otherwise-tied
    // flakes; bool's natural order is false < true, so reverse it.
    b.op.cmp(&a.op)
}
fn cmp_tail(a: &Flake, b: &Flake) -> Ordering {
    cmp_t_recency(a, b)
        .then_with(|| cmp_op(a, b))
        .then_with(|| a.canonical_meta().cmp(&b.canonical_meta()))
}

pub fn cmp_spot(a: &Flake, b: &Flake) -> Ordering {
    cmp_s(a, b)
        .then_with(|| cmp_p(a, b))
        .then_with(|| cmp_o(a, b))
        .then_with(|| cmp_tail(a, b))
}

pub fn cmp_psot(a: &Flake, b: &Flake) -> Ordering {
    cmp_p(a, b)
        .then_with(|| cmp_s(a, b))
        .then_with(|| cmp_o(a, b))
        .then_with(|| cmp_tail(a, b))
}

pub fn cmp_post(a: &Flake, b: &Flake) -> Ordering {
    cmp_p(a, b)
        .then_with(|| cmp_o(a, b))
        .then_with(|| cmp_s(a, b))
        .then_with(|| cmp_tail(a, b))
}

pub fn cmp_opst(a: &Flake, b: &Flake) -> Ordering {
    cmp_o(a, b)
        .then_with(|| cmp_p(a, b))
        .then_with(|| cmp_s(a, b))
        .then_with(|| cmp_tail(a, b))
}

pub fn cmp_tspo(a: &Flake, b: &Flake) -> Ordering {
    cmp_t_recency(a, b)
        .then_with(|| cmp_s(a, b))
        .then_with(|| cmp_p(a, b))
        .then_with(|| cmp_o(a, b))
        .then_with(|| cmp_op(a, b))
        .then_with(|| a.canonical_meta().cmp(&b.canonical_meta()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flake::Object;

    fn f(s: i64, p: u64, o: i64, t: i64) -> Flake {
        Flake::new(s, p, Object::Int(o), 1, t, true)
    }

    #[test]
    fn spot_orders_by_subject_then_predicate_then_object() {
        let mut v = vec![f(2, 1, 1, -1), f(1, 2, 1, -1), f(1, 1, 2, -1), f(1, 1, 1, -1)];
        v.sort_by(cmp_spot);
        assert_eq!(
            v.iter().map(|x| (x.s, x.p, x.o.clone())).collect::<Vec<_>>(),
            vec![
                (1, 1, Object::Int(1)),
                (1, 1, Object::Int(2)),
                (1, 2, Object::Int(1)),
                (2, 1, Object::Int(1)),
            ]
        );
    }

    #[test]
    fn recency_is_ascending_numeric_t() {
        // Per module docs: smaller (more negative) t is more recent and
        // must sort first within an otherwise-tied group.
        let recent = f(1, 1, 1, -5);
        let older = f(1, 1, 1, -1);
        assert_eq!(cmp_tail(&recent, &older), Ordering::Less);
    }

    #[test]
    fn assert_sorts_before_retract_at_same_tail() {
        let mut a = f(1, 1, 1, -1);
        let mut b = f(1, 1, 1, -1);
        a.op = true;
        b.op = false;
        assert_eq!(cmp_op(&a, &b), Ordering::Less);
    }

    #[test]
    fn opst_admits_only_reference_objects() {
        let r = Flake::new(1, 1, Object::Ref(9), 0, -1, true);
        let v = Flake::new(1, 1, Object::Int(9), 0, -1, true);
        assert!(Index::Opst.admits(&r));
        assert!(!Index::Opst.admits(&v));
    }
}
