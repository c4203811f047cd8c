//! Background reindex: folds novelty into fresh on-disk nodes for all five
//! indexes and publishes a new root. See `spec.md` §4.9.
//!
//! Grounded on [`crate::thread`]'s gen-server `Thread<Q,R,T>` pattern for
//! the request/reply half, and the teacher's `wal_thread.rs` for the
//! fire-and-forget interval-ticker half.

use std::ops::Bound;
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::comparator::Index;
use crate::commit::{Committer, Garbage};
use crate::config::IndexConfig;
use crate::db::Db;
use crate::error::Result;
use crate::flake::Flake;
use crate::index_tree::build::{build_tree, BuildConfig};
use crate::index_tree::node::NodeRef;
use crate::thread::{Rx, Thread, Writer};

#[derive(Clone, Debug)]
pub enum IndexerEvent {
    Reindexed {
        block: u64,
        t: i64,
        flakes_folded: usize,
    },
    Error {
        cause: String,
    },
}

fn root_ref_mut(root: &mut crate::commit::DbRoot, idx: Index) -> &mut NodeRef {
    match idx {
        Index::Spot => &mut root.spot,
        Index::Psot => &mut root.psot,
        Index::Post => &mut root.post,
        Index::Opst => &mut root.opst,
        Index::Tspo => &mut root.tspo,
    }
}

/// Folds every flake currently visible in `db` (on-disk plus novelty) into
/// fresh leaves/branches for all five indexes and publishes a new root one
/// block ahead. A pure, synchronous operation — [`Indexer`] wraps it in a
/// background thread for callers that want it off the write path.
///
/// Rebuilds each index's entire tree from the merged flake set rather than
/// incrementally patching existing nodes. This makes every previously
/// published node for this ledger's indexes unreachable from the new root;
/// the `Garbage` record only lists the five old top-level root keys, not
/// their full reachable subtree — a complete sweep needs a tree-walking
/// collector this crate doesn't build yet.
pub fn fold_novelty(db: &Db, committer: &Committer, cfg: &IndexConfig) -> Result<Db> {
    if db.novelty().is_empty() {
        return Ok(db.clone());
    }

    let prev_key = crate::util::root_key(db.network(), db.ledger_id(), db.root().block);
    let timestamp = chrono::Utc::now().timestamp_millis();
    let mut new_root = db.root().next_block(prev_key, timestamp);
    let mut superseded = Vec::new();
    let build_cfg = BuildConfig {
        leaf_max_flakes: cfg.leaf_max_flakes,
        branch_fanout: cfg.branch_fanout,
    };
    let folded = db.novelty().len();

    for idx in Index::ALL {
        if let Some(old_key) = root_ref_mut(&mut new_root, idx).key() {
            superseded.push(old_key.to_string());
        }
        let all: Vec<Flake> = db
            .range(idx, Bound::Unbounded, Bound::Unbounded)?
            .collect::<Result<Vec<_>>>()?;
        let (root_ref, _written) = build_tree(
            db.resolver(),
            idx,
            db.network(),
            db.ledger_id(),
            new_root.block,
            new_root.t,
            &all,
            &build_cfg,
        )?;
        *root_ref_mut(&mut new_root, idx) = root_ref;
    }
    new_root.stats.indexed = new_root.stats.flakes;

    if !superseded.is_empty() {
        committer.write_garbage(&Garbage {
            network: new_root.network.clone(),
            ledger_id: new_root.ledger_id.clone(),
            block: new_root.block,
            superseded,
        })?;
    }
    committer.publish_root(&new_root)?;
    info!(
        target: "indexer",
        "folded {} novelty flakes into block {}",
        folded, new_root.block
    );

    Ok(Db::open(db.resolver_arc(), new_root))
}

/// Whether `db`'s novelty has grown enough that a fold should be scheduled
/// even if the interval ticker hasn't fired yet.
pub fn should_fold(db: &Db, cfg: &IndexConfig) -> bool {
    db.novelty().len() >= cfg.reindex_min
}

/// Whether `db`'s novelty has grown so large that writers should block
/// until a fold completes, rather than keep extending novelty unboundedly.
pub fn should_block_writers(db: &Db, cfg: &IndexConfig) -> bool {
    db.novelty().len() >= cfg.reindex_max
}

/// A background gen-server thread that serializes fold requests, so
/// concurrent callers never race to rebuild the same ledger's trees.
pub struct Indexer {
    thread: Thread<Db, IndexerEvent, ()>,
}

impl Indexer {
    pub fn new(committer: Committer, cfg: IndexConfig) -> Indexer {
        let thread = Thread::new(move |rx: Rx<Db, IndexerEvent>| {
            move || -> Result<()> {
                while let Ok((db, reply)) = rx.recv() {
                    let event = match fold_novelty(&db, &committer, &cfg) {
                        Ok(new_db) => IndexerEvent::Reindexed {
                            block: new_db.block(),
                            t: new_db.t(),
                            flakes_folded: db.novelty().len(),
                        },
                        Err(err) => {
                            error!(target: "indexer", "fold failed: {}", err);
                            IndexerEvent::Error { cause: err.to_string() }
                        }
                    };
                    if let Some(tx) = reply {
                        let _ = tx.send(event);
                    }
                }
                Ok(())
            }
        });
        Indexer { thread }
    }

    pub fn writer(&self) -> Writer<Db, IndexerEvent> {
        self.thread.to_writer()
    }

    /// Requests a fold and blocks for its outcome.
    pub fn fold_and_wait(&self, db: Db) -> Result<IndexerEvent> {
        self.thread.request(db)
    }

    /// Requests a fold without waiting for it to complete.
    pub fn notify(&self, db: Db) -> Result<()> {
        self.thread.post(db)
    }

    pub fn close_wait(self) -> Result<()> {
        self.thread.close_wait()
    }
}

/// Posts `current()` to `writer` on a fixed interval, for callers that want
/// periodic folding driven by `reindex-interval` rather than novelty size
/// alone. Runs as a plain detached thread — there is no reply to wait on.
pub fn spawn_interval_ticker<F>(writer: Writer<Db, IndexerEvent>, interval: Duration, mut current: F)
where
    F: FnMut() -> Option<Db> + Send + 'static,
{
    thread::spawn(move || loop {
        thread::sleep(interval);
        match current() {
            Some(db) => {
                if writer.post(db).is_err() {
                    return;
                }
            }
            None => return,
        }
    });
}
