//! The query AST. See `spec.md` §4.7 and §9's REDESIGN FLAGS: `select`
//! clauses are a tagged variant rather than a single catch-all shape, so a
//! planner can dispatch on them without re-parsing JSON at execution time.

use serde_json::Value;

use super::context::ContextEntry;
use std::collections::BTreeMap;

/// A single projected field of a `select` list.
#[derive(Clone, Debug)]
pub enum SelectClause {
    /// `:*` — every predicate currently asserted on the subject.
    Wildcard,
    /// A bare predicate (local name or full IRI), projected as a scalar or
    /// array depending on the predicate's declared cardinality.
    Predicate(String),
    /// A `where`-bound variable, projected by its current binding.
    Variable(String),
    /// `{var: [selection...]}` — follow `var`'s referenced subject(s) and
    /// recursively project `selection` onto each, down to `depth` hops.
    Map {
        var: String,
        selection: Vec<SelectClause>,
        depth: Option<u32>,
    },
    /// `(count ?x)`-style clause. Only `count` is implemented.
    Aggregate { func: String, args: Vec<String> },
}

/// One position of a `where` triple pattern.
#[derive(Clone, Debug, PartialEq)]
pub enum PatternTerm {
    Var(String),
    Iri(String),
    Sid(i64),
    Literal(Value),
}

impl PatternTerm {
    pub fn is_var(&self) -> bool {
        matches!(self, PatternTerm::Var(_))
    }
}

#[derive(Clone, Debug)]
pub struct WherePattern {
    pub s: PatternTerm,
    pub p: PatternTerm,
    pub o: PatternTerm,
}

/// A complete query: context, projection, and the where-clause patterns (if
/// any) that bind its variables. `filter` expressions are carried as raw
/// strings — this crate resolves index selection and graph crawl, not a
/// general expression language, so filters are applied by the caller over
/// the projected result.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pub context: BTreeMap<String, ContextEntry>,
    pub select: Vec<SelectClause>,
    pub select_one: bool,
    pub distinct: bool,
    pub from: Option<PatternTerm>,
    pub where_: Vec<WherePattern>,
    pub filter: Vec<String>,
    /// Field names to group result rows by. Fields not named here collect
    /// into arrays per group, mirroring SQL-style `group by` over a
    /// projection rather than a relational aggregate.
    pub group_by: Vec<String>,
    /// Field names to sort result rows by, most-significant first. A
    /// leading `-` sorts that field descending.
    pub order_by: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub depth: Option<u32>,
}

impl Query {
    pub fn new() -> Query {
        Query::default()
    }
}
