//! Layered configuration: `StoreConfig`, `IndexConfig`, `ConnectionConfig`,
//! all following the teacher's `robt_config::Config` builder idiom —
//! `new(..)` with sane defaults plus chainable `set_*(mut self, ..) -> Self`
//! methods, with tuning constants as associated consts.

use std::path::PathBuf;

/// Where and how the default filesystem `Store` persists blobs.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> StoreConfig {
        StoreConfig { dir: dir.into() }
    }
}

/// Index-tree build and cache tuning.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    pub leaf_max_flakes: usize,
    pub branch_fanout: usize,
    pub resolver_cache_bytes: usize,
    /// Novelty size, in flakes, at which the indexer is expected to start a
    /// fold even if `reindex_interval` hasn't elapsed.
    pub reindex_min: usize,
    /// Novelty size at which writers block on the indexer (backpressure)
    /// rather than keep growing novelty unboundedly.
    pub reindex_max: usize,
    pub reindex_interval_secs: u64,
}

impl IndexConfig {
    pub const LEAF_MAX_FLAKES: usize = 256;
    pub const BRANCH_FANOUT: usize = 32;
    pub const RESOLVER_CACHE_BYTES: usize = 64 * 1024 * 1024;
    pub const REINDEX_MIN: usize = 1_000;
    pub const REINDEX_MAX: usize = 100_000;
    pub const REINDEX_INTERVAL_SECS: u64 = 60;

    pub fn new() -> IndexConfig {
        IndexConfig {
            leaf_max_flakes: Self::LEAF_MAX_FLAKES,
            branch_fanout: Self::BRANCH_FANOUT,
            resolver_cache_bytes: Self::RESOLVER_CACHE_BYTES,
            reindex_min: Self::REINDEX_MIN,
            reindex_max: Self::REINDEX_MAX,
            reindex_interval_secs: Self::REINDEX_INTERVAL_SECS,
        }
    }

    pub fn set_block_bounds(mut self, leaf_max_flakes: usize, branch_fanout: usize) -> IndexConfig {
        self.leaf_max_flakes = leaf_max_flakes;
        self.branch_fanout = branch_fanout;
        self
    }

    pub fn set_resolver_cache_bytes(mut self, bytes: usize) -> IndexConfig {
        self.resolver_cache_bytes = bytes;
        self
    }

    pub fn set_reindex_thresholds(mut self, min: usize, max: usize) -> IndexConfig {
        self.reindex_min = min;
        self.reindex_max = max;
        self
    }

    pub fn set_reindex_interval_secs(mut self, secs: u64) -> IndexConfig {
        self.reindex_interval_secs = secs;
        self
    }
}

impl Default for IndexConfig {
    fn default() -> IndexConfig {
        IndexConfig::new()
    }
}

/// Per-ledger session behavior: how many `Db` snapshots to cache, and how
/// many listener dispatch workers to run.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub network: String,
    pub snapshot_cache_size: usize,
    pub listener_threads: usize,
}

impl ConnectionConfig {
    pub const SNAPSHOT_CACHE_SIZE: usize = 4;
    pub const LISTENER_THREADS: usize = 1;

    pub fn new(network: impl Into<String>) -> ConnectionConfig {
        ConnectionConfig {
            network: network.into(),
            snapshot_cache_size: Self::SNAPSHOT_CACHE_SIZE,
            listener_threads: Self::LISTENER_THREADS,
        }
    }

    pub fn set_snapshot_cache_size(mut self, size: usize) -> ConnectionConfig {
        self.snapshot_cache_size = size;
        self
    }

    pub fn set_listener_threads(mut self, threads: usize) -> ConnectionConfig {
        self.listener_threads = threads;
        self
    }
}
