//! Lazy, restartable range scans over a persistent index tree, merged with
//! the in-memory novelty overlay for that index. See `spec.md` §4.4.

use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

use crate::comparator::Index;
use crate::error::Result;
use crate::flake::Flake;
use crate::index_tree::node::{Branch, NodeRef, ResolvedNode};
use crate::index_tree::resolver::Resolver;

struct Frame {
    branch: Arc<Branch>,
    next_child: usize,
}

/// Walks the on-disk tree in index order, descending to a leaf, then
/// stepping to the next leaf through the parent chain (siblings have no
/// direct link; the parent's `children` array supplies ordering, per
/// `spec.md` §4.4 step 3).
pub struct DiskCursor<'a> {
    resolver: &'a Resolver,
    idx: Index,
    to: Bound<Flake>,
    stack: Vec<Frame>,
    leaf_flakes: Vec<Flake>,
    leaf_pos: usize,
    exhausted: bool,
}

impl<'a> DiskCursor<'a> {
    pub fn new(
        resolver: &'a Resolver,
        idx: Index,
        root: &NodeRef,
        from: Bound<Flake>,
        to: Bound<Flake>,
    ) -> Result<DiskCursor<'a>> {
        let mut cursor = DiskCursor {
            resolver,
            idx,
            to,
            stack: Vec::new(),
            leaf_flakes: Vec::new(),
            leaf_pos: 0,
            exhausted: root.is_empty(),
        };
        if !cursor.exhausted {
            cursor.descend_to_from(root, &from)?;
        }
        Ok(cursor)
    }

    /// Descend from `node_ref`, at each branch choosing the leftmost child
    /// whose `rhs` is not known to be strictly less than `from` (the
    /// rightmost child if every `rhs` is), until a leaf is reached.
    fn descend_to_from(&mut self, node_ref: &NodeRef, from: &Bound<Flake>) -> Result<()> {
        let node = self.resolver.resolve(node_ref)?;
        match &*node {
            ResolvedNode::Leaf(leaf) => {
                self.leaf_flakes = leaf.flakes.clone();
                self.leaf_pos = self.first_pos_at_or_after(from);
                Ok(())
            }
            ResolvedNode::Branch(branch) => {
                let branch = Arc::new(branch.clone());
                let mut chosen = branch.children.len().saturating_sub(1);
                for (i, child) in branch.children.iter().enumerate() {
                    let child_too_small = match (&child.rhs, from) {
                        (Some(rhs), Bound::Included(b)) => {
                            self.idx.compare(rhs, b) != Ordering::Greater
                        }
                        (Some(rhs), Bound::Excluded(b)) => {
                            self.idx.compare(rhs, b) == Ordering::Less
                                || self.idx.compare(rhs, b) == Ordering::Equal
                        }
                        (Some(_), Bound::Unbounded) => false,
                        (None, _) => false,
                    };
                    if !child_too_small {
                        chosen = i;
                        break;
                    }
                }
                self.stack.push(Frame {
                    branch: branch.clone(),
                    next_child: chosen,
                });
                let child_ref = branch.children[chosen].id.clone();
                self.descend_to_from(&child_ref, from)
            }
        }
    }

    fn first_pos_at_or_after(&self, from: &Bound<Flake>) -> usize {
        match from {
            Bound::Unbounded => 0,
            Bound::Included(b) => self
                .leaf_flakes
                .iter()
                .position(|f| self.idx.compare(f, b) != Ordering::Less)
                .unwrap_or(self.leaf_flakes.len()),
            Bound::Excluded(b) => self
                .leaf_flakes
                .iter()
                .position(|f| self.idx.compare(f, b) == Ordering::Greater)
                .unwrap_or(self.leaf_flakes.len()),
        }
    }

    fn advance_to_next_leaf(&mut self) -> Result<bool> {
        loop {
            let frame = match self.stack.last_mut() {
                Some(f) => f,
                None => return Ok(false),
            };
            frame.next_child += 1;
            if frame.next_child >= frame.branch.children.len() {
                self.stack.pop();
                continue;
            }
            let child_ref = frame.branch.children[frame.next_child].id.clone();
            return self.descend_leftmost(&child_ref);
        }
    }

    fn descend_leftmost(&mut self, node_ref: &NodeRef) -> Result<bool> {
        let node = self.resolver.resolve(node_ref)?;
        match &*node {
            ResolvedNode::Leaf(leaf) => {
                self.leaf_flakes = leaf.flakes.clone();
                self.leaf_pos = 0;
                Ok(true)
            }
            ResolvedNode::Branch(branch) => {
                let branch = Arc::new(branch.clone());
                self.stack.push(Frame {
                    branch: branch.clone(),
                    next_child: 0,
                });
                let child_ref = branch.children[0].id.clone();
                self.descend_leftmost(&child_ref)
            }
        }
    }

    fn within_to(&self, flake: &Flake) -> bool {
        match &self.to {
            Bound::Unbounded => true,
            Bound::Included(b) => self.idx.compare(flake, b) != Ordering::Greater,
            Bound::Excluded(b) => self.idx.compare(flake, b) == Ordering::Less,
        }
    }
}

impl<'a> Iterator for DiskCursor<'a> {
    type Item = Result<Flake>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        loop {
            if self.leaf_pos < self.leaf_flakes.len() {
                let flake = self.leaf_flakes[self.leaf_pos].clone();
                if !self.within_to(&flake) {
                    self.exhausted = true;
                    return None;
                }
                self.leaf_pos += 1;
                return Some(Ok(flake));
            }
            match self.advance_to_next_leaf() {
                Ok(true) => continue,
                Ok(false) => {
                    self.exhausted = true;
                    return None;
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Ordered merge of the on-disk cursor and the novelty overlay for the
/// same index and range. Flakes never collide between the two sources
/// (novelty holds only unflushed flakes), so ties cannot occur in
/// practice; if they ever did, the disk side is yielded first.
pub struct MergeScan<'a> {
    idx: Index,
    disk: std::iter::Peekable<DiskCursor<'a>>,
    novelty: std::iter::Peekable<std::vec::IntoIter<Flake>>,
}

impl<'a> MergeScan<'a> {
    pub fn new(idx: Index, disk: DiskCursor<'a>, novelty: Vec<Flake>) -> MergeScan<'a> {
        MergeScan {
            idx,
            disk: disk.peekable(),
            novelty: novelty.into_iter().peekable(),
        }
    }
}

impl<'a> Iterator for MergeScan<'a> {
    type Item = Result<Flake>;

    fn next(&mut self) -> Option<Self::Item> {
        match (self.disk.peek(), self.novelty.peek()) {
            (None, None) => None,
            (Some(Err(_)), _) => self.disk.next(),
            (Some(Ok(_)), None) => self.disk.next(),
            (None, Some(_)) => self.novelty.next().map(Ok),
            (Some(Ok(d)), Some(n)) => {
                if self.idx.compare(d, n) != Ordering::Greater {
                    self.disk.next()
                } else {
                    self.novelty.next().map(Ok)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_scan_interleaves_in_order() {
        let idx = Index::Spot;
        let disk = vec![0i64, 2, 4];
        let novelty = vec![1i64, 3, 5];
        let disk_flakes: Vec<Flake> = disk
            .into_iter()
            .map(|s| Flake::new(s, 1, crate::flake::Object::Int(0), 0, -1, true))
            .collect();
        let novelty_flakes: Vec<Flake> = novelty
            .into_iter()
            .map(|s| Flake::new(s, 1, crate::flake::Object::Int(0), 0, -1, true))
            .collect();
        // Exercise the merge directly over two Vec-backed peekable
        // iterators standing in for a resolved disk cursor, since building
        // a full on-disk tree here is unit-tested in index_tree::mod.
        let mut disk_it = disk_flakes.into_iter().map(Ok).peekable();
        let mut nov_it = novelty_flakes.into_iter().peekable();
        let mut out = Vec::new();
        loop {
            match (disk_it.peek(), nov_it.peek()) {
                (None, None) => break,
                (Some(Ok(d)), Some(n)) => {
                    if idx.compare(d, n) != Ordering::Greater {
                        out.push(disk_it.next().unwrap().unwrap().s);
                    } else {
                        out.push(nov_it.next().unwrap().s);
                    }
                }
                (Some(Ok(_)), None) => out.push(disk_it.next().unwrap().unwrap().s),
                (None, Some(_)) => out.push(nov_it.next().unwrap().s),
                (Some(Err(_)), _) => break,
            }
        }
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5]);
    }
}
