//! Predicate and collection vocabulary carried in a `DB` value. See
//! `spec.md` §3.4's `schema` field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One predicate's declared shape. `ref_` marks a predicate whose objects
/// are subject references (eligible for the `opst` index, per
/// [`crate::comparator::Index::admits`]).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PredicateMeta {
    pub id: u64,
    pub type_: Option<String>,
    pub multi: bool,
    pub ref_: bool,
    pub component: bool,
    pub index: bool,
    pub unique: bool,
    /// `@container: @list` — element order is preserved via a per-flake
    /// position stored in `Flake::m`, rather than the natural value order.
    pub list: bool,
}

impl PredicateMeta {
    pub fn new(id: u64) -> PredicateMeta {
        PredicateMeta {
            id,
            ..PredicateMeta::default()
        }
    }

    pub fn set_ref(mut self, ref_: bool) -> PredicateMeta {
        self.ref_ = ref_;
        self
    }

    pub fn set_multi(mut self, multi: bool) -> PredicateMeta {
        self.multi = multi;
        self
    }

    pub fn set_unique(mut self, unique: bool) -> PredicateMeta {
        self.unique = unique;
        self
    }

    pub fn set_list(mut self, list: bool) -> PredicateMeta {
        self.list = list;
        self
    }
}

/// `predicate-iri → meta`, `collection-iri → id`, kept in a `BTreeMap` so a
/// schema's serialized form is deterministic.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Schema {
    predicates: BTreeMap<String, PredicateMeta>,
    collections: BTreeMap<String, u64>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    pub fn predicate(&self, iri: &str) -> Option<&PredicateMeta> {
        self.predicates.get(iri)
    }

    pub fn collection(&self, iri: &str) -> Option<u64> {
        self.collections.get(iri).copied()
    }

    pub fn with_predicate(mut self, iri: impl Into<String>, meta: PredicateMeta) -> Schema {
        self.predicates.insert(iri.into(), meta);
        self
    }

    pub fn with_collection(mut self, iri: impl Into<String>, id: u64) -> Schema {
        self.collections.insert(iri.into(), id);
        self
    }

    pub fn is_ref_predicate(&self, iri: &str) -> bool {
        self.predicates.get(iri).map(|m| m.ref_).unwrap_or(false)
    }

    /// Reverse lookup from a predicate's numeric id back to its declared
    /// IRI. Linear in the number of declared predicates; schemas are small
    /// enough for this not to matter against the cost of a query's scans.
    pub fn iri_for_predicate(&self, pid: u64) -> Option<&str> {
        self.predicates
            .iter()
            .find(|(_, meta)| meta.id == pid)
            .map(|(iri, _)| iri.as_str())
    }
}
