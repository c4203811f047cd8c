//! The immutable database snapshot and its algebra: `with_flakes`,
//! `as_of`, `time_travel`. See `spec.md` §3.4 and §4.6.
//!
//! Grounded on `mvcc.rs`'s copy-on-write snapshot discipline — a `Db` here
//! plays the role of one `MvccRoot`, generalized from a single ordered tree
//! to five index roots plus a novelty overlay and a schema.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::comparator::Index;
use crate::commit::{Committer, DbRoot};
use crate::error::{Error, Result};
use crate::flake::{Datatype, Flake, Object, PredicateId, SubjectId};
use crate::index_tree::node::NodeRef;
use crate::index_tree::resolver::Resolver;
use crate::index_tree::IndexView;
use crate::novelty::Novelty;
use crate::schema::Schema;

/// The content of a transaction, independent of the `t` it gets stamped
/// with: used to recognize a resubmitted commit (see `with_flakes`'s
/// idempotent-commit check).
type TxContent = BTreeSet<(SubjectId, PredicateId, Object, Datatype, bool, String)>;

fn tx_content(flakes: &[Flake]) -> TxContent {
    flakes
        .iter()
        .map(|f| (f.s, f.p, f.o.clone(), f.dt, f.op, f.canonical_meta()))
        .collect()
}

/// Reserved predicate id for the wall-clock time of a transaction, carried
/// on a transaction-metadata flake (negative subject, per `spec.md` §3.1).
/// `resolve_instant` scans for flakes on this predicate to answer
/// ISO-8601 time-travel queries.
pub const TX_TIME_PREDICATE: PredicateId = 0;

/// A target for [`Db::time_travel`].
#[derive(Clone, Debug)]
pub enum TimePoint {
    Block(u64),
    T(i64),
    Instant(DateTime<Utc>),
}

fn bound_ref(b: &Bound<Flake>) -> Bound<&Flake> {
    match b {
        Bound::Unbounded => Bound::Unbounded,
        Bound::Included(f) => Bound::Included(f),
        Bound::Excluded(f) => Bound::Excluded(f),
    }
}

#[derive(Clone)]
pub struct Db {
    resolver: Arc<Resolver>,
    root: DbRoot,
    novelty: Novelty,
    /// Set by `as_of`/`time_travel`: keep only flakes with `t >= t_floor`
    /// (see the recency convention documented on [`crate::comparator`]).
    t_floor: Option<i64>,
    /// Content of the most recently applied transaction (fields other than
    /// `t`), used by `with_flakes` to reject an exact resubmission per
    /// `spec.md` §8's idempotent-commit law.
    last_commit: Option<TxContent>,
}

impl Db {
    pub fn open(resolver: Arc<Resolver>, root: DbRoot) -> Db {
        Db {
            resolver,
            root,
            novelty: Novelty::new(),
            t_floor: None,
            last_commit: None,
        }
    }

    pub fn with_novelty(resolver: Arc<Resolver>, root: DbRoot, novelty: Novelty) -> Db {
        Db {
            resolver,
            root,
            novelty,
            t_floor: None,
            last_commit: None,
        }
    }

    pub fn network(&self) -> &str {
        &self.root.network
    }

    pub fn ledger_id(&self) -> &str {
        &self.root.ledger_id
    }

    pub fn block(&self) -> u64 {
        self.root.block
    }

    pub fn t(&self) -> i64 {
        self.root.t
    }

    pub fn schema(&self) -> &Schema {
        &self.root.schema
    }

    pub fn root(&self) -> &DbRoot {
        &self.root
    }

    pub fn novelty(&self) -> &Novelty {
        &self.novelty
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_arc(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }

    fn root_ref(&self, idx: Index) -> &NodeRef {
        match idx {
            Index::Spot => &self.root.spot,
            Index::Psot => &self.root.psot,
            Index::Post => &self.root.post,
            Index::Opst => &self.root.opst,
            Index::Tspo => &self.root.tspo,
        }
    }

    /// Half-open range scan over one index, merging on-disk nodes with the
    /// novelty overlay and (if this snapshot is `as_of` a past point)
    /// filtering out flakes more recent than the floor.
    pub fn range<'a>(
        &'a self,
        idx: Index,
        from: Bound<Flake>,
        to: Bound<Flake>,
    ) -> Result<Box<dyn Iterator<Item = Result<Flake>> + 'a>> {
        let novelty_slice: Vec<Flake> = self
            .novelty
            .range(idx, bound_ref(&from), bound_ref(&to))
            .cloned()
            .collect();
        let view = IndexView::new(&self.resolver, idx, self.root_ref(idx));
        let merged = view.range(from, to, novelty_slice)?;
        let floor = self.t_floor;
        Ok(Box::new(merged.filter(move |res| match res {
            Ok(flake) => floor.map(|t_star| flake.t >= t_star).unwrap_or(true),
            Err(_) => true,
        })))
    }

    /// Returns a new `Db` with `flakes` applied as one transaction: every
    /// flake is stamped with `t = self.t - 1` (one more negative, i.e. more
    /// recent, than the current counter) and folded into novelty.
    ///
    /// Rejects an exact resubmission of the previous transaction's content
    /// with `Error::InvalidTx`, leaving novelty unchanged (spec.md §8's
    /// idempotent-commit law) — content is compared ignoring `t`, since the
    /// incoming flakes haven't been stamped yet.
    pub fn with_flakes(&self, flakes: Vec<Flake>) -> Result<Db> {
        let content = tx_content(&flakes);
        if self.last_commit.as_ref() == Some(&content) {
            return Err(Error::InvalidTx(
                "identical flake set already committed at the current t".into(),
            ));
        }
        let new_t = self.root.t - 1;
        let mut novelty = self.novelty.clone();
        let mut added = 0u64;
        for mut flake in flakes {
            flake.t = new_t;
            added += 1;
            novelty.insert(flake);
        }
        let mut root = self.root.clone();
        root.t = new_t;
        root.stats.flakes += added;
        Ok(Db {
            resolver: self.resolver.clone(),
            root,
            novelty,
            t_floor: self.t_floor,
            last_commit: Some(content),
        })
    }

    /// Restricts this snapshot to the state as of transaction `t_star`:
    /// flakes with `t < t_star` (more recent than `t_star`) are hidden.
    /// Combining nested `as_of` calls keeps the more restrictive (larger)
    /// floor.
    pub fn as_of(&self, t_star: i64) -> Db {
        let floor = match self.t_floor {
            Some(existing) => existing.max(t_star),
            None => t_star,
        };
        Db {
            t_floor: Some(floor),
            ..self.clone()
        }
    }

    /// Resolves `point` to a `Db` value: a `Block` loads a different
    /// published root outright; `T`/`Instant` apply `as_of` over this same
    /// snapshot, since flakes are never deleted from the index and any
    /// historical point is reconstructible by filtering.
    pub fn time_travel(&self, committer: &Committer, point: TimePoint) -> Result<Db> {
        match point {
            TimePoint::Block(block) => {
                let root = committer.read_root(&self.root.network, &self.root.ledger_id, block)?;
                Ok(Db::open(self.resolver.clone(), root))
            }
            TimePoint::T(t) => Ok(self.as_of(t)),
            TimePoint::Instant(at) => {
                let t = self.resolve_instant(at)?;
                Ok(self.as_of(t))
            }
        }
    }

    /// Scans `tspo` (most recent first, per the recency convention) for the
    /// latest transaction-metadata flake at or before `at`, returning its
    /// `t`. Errors if the ledger has no transaction that old.
    fn resolve_instant(&self, at: DateTime<Utc>) -> Result<i64> {
        let scan = self.range(Index::Tspo, Bound::Unbounded, Bound::Unbounded)?;
        for result in scan {
            let flake = result?;
            if flake.p != TX_TIME_PREDICATE || flake.s >= 0 {
                continue;
            }
            if let Object::Str(rfc3339) = &flake.o {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(rfc3339) {
                    if parsed.with_timezone(&Utc) <= at {
                        return Ok(flake.t);
                    }
                }
            }
        }
        Err(Error::Unavailable(format!(
            "no transaction at or before {}",
            at
        )))
    }
}
