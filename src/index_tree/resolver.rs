//! Resolution of unresolved node references through [`Store`] + [`Serde`],
//! memoized in an LRU cache shared across `Db` snapshots of the same
//! ledger. Grounded on the teacher's `spinlock::RWSpinlock` shared-read /
//! exclusive-admission discipline (here expressed with a plain `Mutex`
//! since the cache body is small and admission is not hot enough to merit
//! a spinlock of its own).

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::{Error, Result};
use crate::index_tree::node::{Branch, Leaf, NodeRef, ResolvedNode};
use crate::serde_codec::Serde;
use crate::store::Store;

struct Lru {
    entries: HashMap<String, Arc<ResolvedNode>>,
    recency: VecDeque<String>,
    bytes_used: usize,
    budget_bytes: usize,
}

impl Lru {
    fn new(budget_bytes: usize) -> Lru {
        Lru {
            entries: HashMap::new(),
            recency: VecDeque::new(),
            bytes_used: 0,
            budget_bytes,
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key.to_string());
    }

    fn get(&mut self, key: &str) -> Option<Arc<ResolvedNode>> {
        let hit = self.entries.get(key).cloned();
        if hit.is_some() {
            self.touch(key);
        }
        hit
    }

    fn insert(&mut self, key: String, node: Arc<ResolvedNode>, approx_bytes: usize) {
        if self.entries.contains_key(&key) {
            self.touch(&key);
            return;
        }
        self.entries.insert(key.clone(), node);
        self.bytes_used += approx_bytes;
        self.recency.push_back(key);
        while self.bytes_used > self.budget_bytes {
            match self.recency.pop_front() {
                Some(evict) => {
                    self.entries.remove(&evict);
                    // Byte accounting is approximate: a cleared cache
                    // entry's exact size isn't re-derived, so bytes_used
                    // is decremented by a flat per-entry estimate instead
                    // of tracked per key. This is acceptable slop for an
                    // LRU sizing knob, never for correctness.
                    self.bytes_used = self.bytes_used.saturating_sub(approx_bytes.max(1));
                }
                None => break,
            }
        }
    }
}

/// Resolves node references into parsed [`ResolvedNode`]s, caching the
/// result. Never caches an error: a failed resolve is retried on next
/// access (see `spec.md` §7).
pub struct Resolver {
    store: Arc<dyn Store>,
    codec: Arc<dyn Serde>,
    cache: Mutex<Lru>,
}

impl Resolver {
    pub fn new(store: Arc<dyn Store>, codec: Arc<dyn Serde>, budget_bytes: usize) -> Resolver {
        Resolver {
            store,
            codec,
            cache: Mutex::new(Lru::new(budget_bytes)),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn codec(&self) -> &Arc<dyn Serde> {
        &self.codec
    }

    pub fn resolve(&self, node_ref: &NodeRef) -> Result<Arc<ResolvedNode>> {
        let key = match node_ref {
            NodeRef::Empty => {
                return Err(Error::UnexpectedError(
                    "attempted to resolve the empty node".into(),
                ))
            }
            NodeRef::Key(k) => k.clone(),
        };

        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            trace!(target: "resolver", "cache hit for {}", key);
            return Ok(hit);
        }

        let bytes = self
            .store
            .read(&key)?
            .ok_or_else(|| Error::StorageError(format!("node {} not found", key)))?;
        let node = self.decode(&bytes)?;
        let approx_bytes = bytes.len();
        let node = Arc::new(node);
        self.cache
            .lock()
            .unwrap()
            .insert(key, node.clone(), approx_bytes);
        Ok(node)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ResolvedNode> {
        // Leaves and branches are framed with a one-byte tag so a single
        // decode path can resolve either shape.
        match bytes.first() {
            Some(0) => Ok(ResolvedNode::Leaf(self.codec.deserialize_leaf(&bytes[1..])?)),
            Some(1) => Ok(ResolvedNode::Branch(
                self.codec.deserialize_branch(&bytes[1..])?,
            )),
            _ => Err(Error::Codec("unrecognized node frame tag".into())),
        }
    }

    pub fn encode_leaf(&self, leaf: &Leaf) -> Result<Vec<u8>> {
        let mut out = vec![0u8];
        out.extend(self.codec.serialize_leaf(leaf)?);
        Ok(out)
    }

    pub fn encode_branch(&self, branch: &Branch) -> Result<Vec<u8>> {
        let mut out = vec![1u8];
        out.extend(self.codec.serialize_branch(branch)?);
        Ok(out)
    }
}
