//! Commit / root persistence: the shapes and operations that make a
//! database value a first-class, time-addressable artifact. See `spec.md`
//! §4.8.
//!
//! A `DbRoot` is never overwritten once published: each block gets its own
//! key (`util::root_key`), so publication is atomic at the single-key
//! granularity `Store` guarantees — there is no multi-key transaction to
//! coordinate. Grounded on the teacher's `dlog_journal.rs` "append records,
//! then flip the pointer" discipline and `robt_build.rs`'s ordered
//! flush-then-finalize sequence.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::flake::Flake;
use crate::index_tree::node::NodeRef;
use crate::schema::Schema;
use crate::serde_codec::Serde;
use crate::store::Store;
use crate::util;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Stats {
    pub flakes: u64,
    pub size: u64,
    pub indexed: u64,
}

/// The persisted form of a `Db` snapshot: everything needed to reopen a
/// ledger at a given block without replaying its history. Novelty is
/// deliberately absent — it lives only in memory until the indexer folds it
/// in and publishes a root with updated tree roots and `stats.indexed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbRoot {
    pub network: String,
    pub ledger_id: String,
    pub block: u64,
    pub t: i64,
    /// Wall-clock time this root was published, as millis since the epoch.
    /// Caller-supplied (see `Db::with_flakes`'s timestamp threading) rather
    /// than read from the system clock here, so a replayed/forked history
    /// can reproduce the same root bytes.
    pub timestamp: i64,
    /// Root key of the previous published block, `None` only for genesis.
    pub prev_index: Option<String>,
    /// `true` once this ledger has been forked from another; `fork_block`
    /// names the block of the source ledger the fork started from.
    pub fork: bool,
    pub fork_block: Option<u64>,
    pub ecount: BTreeMap<String, i64>,
    pub stats: Stats,
    pub spot: NodeRef,
    pub psot: NodeRef,
    pub post: NodeRef,
    pub opst: NodeRef,
    pub tspo: NodeRef,
    pub schema: Schema,
}

impl DbRoot {
    pub fn genesis(network: &str, ledger_id: &str) -> DbRoot {
        DbRoot {
            network: network.to_string(),
            ledger_id: ledger_id.to_string(),
            block: 0,
            t: 0,
            timestamp: 0,
            prev_index: None,
            fork: false,
            fork_block: None,
            ecount: BTreeMap::new(),
            stats: Stats::default(),
            spot: NodeRef::Empty,
            psot: NodeRef::Empty,
            post: NodeRef::Empty,
            opst: NodeRef::Empty,
            tspo: NodeRef::Empty,
            schema: Schema::new(),
        }
    }

    /// Derives the next block's root skeleton from this one: bumps `block`,
    /// records this root's key as `prev_index`, and carries `fork`/
    /// `fork_block` forward unchanged. Callers still have to overwrite the
    /// index tree refs and stats.
    pub fn next_block(&self, prev_key: String, timestamp: i64) -> DbRoot {
        DbRoot {
            block: self.block + 1,
            timestamp,
            prev_index: Some(prev_key),
            ..self.clone()
        }
    }
}

/// The raw flake set committed in one block, persisted independently of the
/// index trees so a ledger can be replayed or audited without depending on
/// the indexer having run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockBlob {
    pub network: String,
    pub ledger_id: String,
    pub block: u64,
    pub t_start: i64,
    pub t_end: i64,
    pub flakes: Vec<Flake>,
}

/// Node keys superseded by the indexer's fold of a given block, kept around
/// until whatever retention policy the caller applies sweeps them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Garbage {
    pub network: String,
    pub ledger_id: String,
    pub block: u64,
    pub superseded: Vec<String>,
}

#[derive(Clone)]
pub struct Committer {
    store: Arc<dyn Store>,
    codec: Arc<dyn Serde>,
}

impl Committer {
    pub fn new(store: Arc<dyn Store>, codec: Arc<dyn Serde>) -> Committer {
        Committer { store, codec }
    }

    pub fn write_block(&self, blob: &BlockBlob) -> Result<String> {
        let key = util::block_key(&blob.network, &blob.ledger_id, blob.block, None);
        let bytes = self.codec.serialize_block(blob)?;
        self.store.write(&key, &bytes)?;
        Ok(key)
    }

    pub fn read_block(&self, network: &str, ledger_id: &str, block: u64) -> Result<BlockBlob> {
        let key = util::block_key(network, ledger_id, block, None);
        let bytes = self
            .store
            .read(&key)?
            .ok_or_else(|| Error::StorageError(format!("block {} not found", key)))?;
        self.codec.deserialize_block(&bytes)
    }

    pub fn write_garbage(&self, garbage: &Garbage) -> Result<String> {
        let key = util::garbage_key(&garbage.network, &garbage.ledger_id, garbage.block);
        let bytes = self.codec.serialize_garbage(garbage)?;
        self.store.write(&key, &bytes)?;
        Ok(key)
    }

    pub fn read_garbage(&self, network: &str, ledger_id: &str, block: u64) -> Result<Garbage> {
        let key = util::garbage_key(network, ledger_id, block);
        let bytes = self
            .store
            .read(&key)?
            .ok_or_else(|| Error::StorageError(format!("garbage {} not found", key)))?;
        self.codec.deserialize_garbage(&bytes)
    }

    /// Publishes `root` under its block-addressed key. Refuses to overwrite
    /// a block that already has a published root — a republish attempt is
    /// always a caller bug, never a legitimate retry (see `spec.md` §7:
    /// no partial commit is ever published, so there is nothing to retry
    /// over).
    pub fn publish_root(&self, root: &DbRoot) -> Result<String> {
        let key = util::root_key(&root.network, &root.ledger_id, root.block);
        if self.store.exists(&key)? {
            return Err(Error::UnexpectedError(format!(
                "root already published for block {}",
                root.block
            )));
        }
        let bytes = self.codec.serialize_root(root)?;
        self.store.write(&key, &bytes)?;
        info!(target: "commit", "published root {} (t={})", key, root.t);
        Ok(key)
    }

    pub fn read_root(&self, network: &str, ledger_id: &str, block: u64) -> Result<DbRoot> {
        let key = util::root_key(network, ledger_id, block);
        let bytes = self
            .store
            .read(&key)?
            .ok_or_else(|| Error::StorageError(format!("root {} not found", key)))?;
        self.codec.deserialize_root(&bytes)
    }

    /// The most recently published root for a ledger, found by listing its
    /// root keys (zero-padded block numbers, so lexicographic order is
    /// chronological order) and taking the last.
    pub fn latest_root(&self, network: &str, ledger_id: &str) -> Result<Option<DbRoot>> {
        let prefix = format!("{}_{}_root_", network, ledger_id);
        let mut keys = self.store.list(&prefix)?;
        keys.sort();
        match keys.pop() {
            None => Ok(None),
            Some(key) => {
                let bytes = self
                    .store
                    .read(&key)?
                    .ok_or_else(|| Error::StorageError(format!("root {} vanished", key)))?;
                Ok(Some(self.codec.deserialize_root(&bytes)?))
            }
        }
    }
}
