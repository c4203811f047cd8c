//! The persistent, content-addressed B+-tree-like index: branches holding
//! child summaries, leaves holding flake sets, nodes resolved on demand
//! through [`crate::store::Store`] + [`crate::serde_codec::Serde`] via a
//! shared [`resolver::Resolver`] cache. See `spec.md` §4.4.

pub mod build;
pub mod node;
pub mod resolver;
pub mod scan;

use std::ops::Bound;

use crate::comparator::Index;
use crate::error::Result;
use crate::flake::Flake;
use crate::index_tree::node::NodeRef;
use crate::index_tree::resolver::Resolver;
use crate::index_tree::scan::{DiskCursor, MergeScan};

/// One index's view over a `Db` snapshot: its on-disk root plus the
/// novelty slice it needs merged in. Constructed fresh per range scan by
/// [`crate::db::Db`]; cheap, since it borrows the resolver and root.
pub struct IndexView<'a> {
    resolver: &'a Resolver,
    idx: Index,
    root: &'a NodeRef,
}

impl<'a> IndexView<'a> {
    pub fn new(resolver: &'a Resolver, idx: Index, root: &'a NodeRef) -> IndexView<'a> {
        IndexView { resolver, idx, root }
    }

    /// Half-open range scan `[from, to)` merging the on-disk tree with the
    /// caller-supplied novelty slice (already filtered to this index and
    /// range, already sorted under this index's comparator).
    pub fn range(
        &self,
        from: Bound<Flake>,
        to: Bound<Flake>,
        novelty_slice: Vec<Flake>,
    ) -> Result<MergeScan<'a>> {
        let disk = DiskCursor::new(self.resolver, self.idx, self.root, from, to.clone())?;
        Ok(MergeScan::new(self.idx, disk, novelty_slice))
    }
}

pub use node::{Branch, ChildSummary, Leaf, NodeMeta, ResolvedNode};
