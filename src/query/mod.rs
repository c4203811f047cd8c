//! The query planner and executor: a JSON-LD-flavored `select`/`where`
//! surface over the flake indexes. See `spec.md` §4.7.

pub mod ast;
pub mod context;
pub mod crawl;
pub mod exec;
pub mod plan;

pub use ast::{PatternTerm, Query, SelectClause, WherePattern};
pub use context::{Context, ContextEntry};
pub use exec::{execute, run_where, BoundValue, Bindings};
