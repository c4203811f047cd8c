//! An immutable, time-travelling, semantic graph database: flakes indexed
//! five ways, folded from an in-memory novelty overlay into a
//! content-addressed, persistent index tree, queried through a JSON-LD
//! flavored `select`/`where` surface. See `spec.md` for the full
//! specification this crate implements.

pub mod comparator;
pub mod commit;
pub mod config;
pub mod db;
pub mod error;
pub mod flake;
pub mod handle;
pub mod index_tree;
pub mod indexer;
pub mod novelty;
pub mod query;
pub mod schema;
pub mod serde_codec;
pub mod session;
pub mod store;
pub mod thread;
mod util;

pub use commit::{BlockBlob, Committer, DbRoot, Garbage};
pub use comparator::Index;
pub use config::{ConnectionConfig, IndexConfig, StoreConfig};
pub use db::{Db, TimePoint};
pub use error::{Error, Result};
pub use flake::{Flake, Object};
pub use indexer::{fold_novelty, Indexer, IndexerEvent};
pub use query::{execute, Query, SelectClause};
pub use schema::{PredicateMeta, Schema};
pub use session::Session;
