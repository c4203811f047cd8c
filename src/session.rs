//! Per-ledger `Db` snapshot cache and listener dispatch. See `spec.md`
//! §4.10.
//!
//! Grounded on `mvcc.rs`'s "latest value visible to new readers
//! immediately" snapshot-swap discipline for the cache, and
//! [`crate::thread`]'s gen-server pattern for the listener-dispatch
//! background loop — new commits are posted to the dispatcher thread
//! rather than invoking listener callbacks on the publisher's own stack.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commit::{Committer, DbRoot};
use crate::config::ConnectionConfig;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::index_tree::resolver::Resolver;
use crate::serde_codec::Serde;
use crate::store::Store;
use crate::thread::{Rx, Thread};

type Listener = Box<dyn Fn(&Db) + Send + Sync>;

/// Caches the latest `Db` per ledger and dispatches listener callbacks
/// whenever a new one is published.
pub struct Session {
    committer: Committer,
    resolver: Arc<Resolver>,
    cfg: ConnectionConfig,
    cache: Arc<Mutex<HashMap<String, Db>>>,
    listeners: Arc<Mutex<HashMap<String, Vec<Listener>>>>,
    dispatcher: Thread<(String, Db), (), ()>,
}

impl Session {
    pub fn new(
        store: Arc<dyn Store>,
        codec: Arc<dyn Serde>,
        cfg: ConnectionConfig,
        resolver_cache_bytes: usize,
    ) -> Session {
        let resolver = Arc::new(Resolver::new(store.clone(), codec.clone(), resolver_cache_bytes));
        let listeners: Arc<Mutex<HashMap<String, Vec<Listener>>>> = Arc::new(Mutex::new(HashMap::new()));
        let for_dispatcher = listeners.clone();
        let dispatcher = Thread::new(move |rx: Rx<(String, Db), ()>| {
            move || -> Result<()> {
                while let Ok(((ledger_id, db), reply)) = rx.recv() {
                    if let Some(ls) = for_dispatcher.lock().unwrap().get(&ledger_id) {
                        for listener in ls {
                            listener(&db);
                        }
                    }
                    if let Some(tx) = reply {
                        let _ = tx.send(());
                    }
                }
                Ok(())
            }
        });
        Session {
            committer: Committer::new(store, codec),
            resolver,
            cfg,
            cache: Arc::new(Mutex::new(HashMap::new())),
            listeners,
            dispatcher,
        }
    }

    pub fn committer(&self) -> &Committer {
        &self.committer
    }

    /// Returns the cached snapshot for `ledger_id`, loading the latest
    /// published root (or a genesis root, for a ledger never committed to)
    /// on a cache miss.
    pub fn open(&self, ledger_id: &str) -> Result<Db> {
        if let Some(db) = self.cache.lock().unwrap().get(ledger_id) {
            return Ok(db.clone());
        }
        let root = match self.committer.latest_root(&self.cfg.network, ledger_id)? {
            Some(root) => root,
            None => DbRoot::genesis(&self.cfg.network, ledger_id),
        };
        let db = Db::open(self.resolver.clone(), root);
        self.cache
            .lock()
            .unwrap()
            .insert(ledger_id.to_string(), db.clone());
        Ok(db)
    }

    /// Replaces the cached snapshot for `ledger_id` and notifies listeners.
    /// Does not itself persist `db` — callers publish through
    /// [`crate::commit::Committer`] or [`crate::indexer::fold_novelty`]
    /// first.
    pub fn publish(&self, ledger_id: &str, db: Db) -> Result<()> {
        self.cache
            .lock()
            .unwrap()
            .insert(ledger_id.to_string(), db.clone());
        self.dispatcher.post((ledger_id.to_string(), db))
    }

    pub fn on_commit<F>(&self, ledger_id: &str, listener: F)
    where
        F: Fn(&Db) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap()
            .entry(ledger_id.to_string())
            .or_default()
            .push(Box::new(listener));
    }

    /// Installs a one-shot listener that resolves once `ledger_id`'s latest
    /// published block reaches `block`, or rejects with `Error::Timeout` if
    /// `timeout` elapses first. Returns immediately if the cached snapshot
    /// already meets the target.
    pub fn sync_to(&self, ledger_id: &str, block: u64, timeout: Duration) -> Result<Db> {
        if let Some(db) = self.cache.lock().unwrap().get(ledger_id) {
            if db.block() >= block {
                return Ok(db.clone());
            }
        }

        let (tx, rx) = mpsc::sync_channel::<Db>(1);
        let tx = Mutex::new(Some(tx));
        self.on_commit(ledger_id, move |db| {
            if db.block() >= block {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.try_send(db.clone());
                }
            }
        });

        // Re-check after registering: a publish that landed between the
        // first check and the listener's installation would otherwise be
        // missed if it had already finished dispatching.
        if let Some(db) = self.cache.lock().unwrap().get(ledger_id) {
            if db.block() >= block {
                return Ok(db.clone());
            }
        }

        rx.recv_timeout(timeout).map_err(|_| {
            Error::Timeout(format!(
                "ledger {} did not reach block {} within {:?}",
                ledger_id, block, timeout
            ))
        })
    }
}
