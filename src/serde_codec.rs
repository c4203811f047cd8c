//! The `Serde` capability: typed (de)serialization for leaves, branches,
//! roots, garbage, and block blobs. The core is codec-agnostic — it only
//! requires determinism (equal inputs ⇒ byte-equal outputs), needed for
//! content-addressing commits (`spec.md` §4.3) — and ships one concrete
//! implementation, [`NativeCodec`].
//!
//! Grounded on the teacher's `core::Serialize` capability
//! (`encode`/`decode` pair) and the fixed-width-header-then-payload shape
//! of `robt_config.rs`'s meta block; expressed here with `serde_json` over
//! a canonically key-ordered document, which already gives byte-identical
//! output for byte-identical input without a hand-rolled binary format.

use crate::commit::{BlockBlob, DbRoot, Garbage};
use crate::error::Result;
use crate::index_tree::node::{Branch, Leaf};

pub trait Serde: Send + Sync {
    fn serialize_leaf(&self, leaf: &Leaf) -> Result<Vec<u8>>;
    fn deserialize_leaf(&self, bytes: &[u8]) -> Result<Leaf>;

    fn serialize_branch(&self, branch: &Branch) -> Result<Vec<u8>>;
    fn deserialize_branch(&self, bytes: &[u8]) -> Result<Branch>;

    fn serialize_root(&self, root: &DbRoot) -> Result<Vec<u8>>;
    fn deserialize_root(&self, bytes: &[u8]) -> Result<DbRoot>;

    fn serialize_garbage(&self, garbage: &Garbage) -> Result<Vec<u8>>;
    fn deserialize_garbage(&self, bytes: &[u8]) -> Result<Garbage>;

    fn serialize_block(&self, block: &BlockBlob) -> Result<Vec<u8>>;
    fn deserialize_block(&self, bytes: &[u8]) -> Result<BlockBlob>;
}

/// Deterministic JSON codec: every shape this crate persists derives
/// `Serialize`/`Deserialize` over plain structs and `BTreeMap`s, so key
/// order — and therefore byte output — is fixed for a given value.
pub struct NativeCodec;

macro_rules! json_roundtrip {
    ($ser:ident, $de:ident, $ty:ty) => {
        fn $ser(&self, value: &$ty) -> Result<Vec<u8>> {
            Ok(serde_json::to_vec(value)?)
        }
        fn $de(&self, bytes: &[u8]) -> Result<$ty> {
            Ok(serde_json::from_slice(bytes)?)
        }
    };
}

impl Serde for NativeCodec {
    json_roundtrip!(serialize_leaf, deserialize_leaf, Leaf);
    json_roundtrip!(serialize_branch, deserialize_branch, Branch);
    json_roundtrip!(serialize_root, deserialize_root, DbRoot);
    json_roundtrip!(serialize_garbage, deserialize_garbage, Garbage);
    json_roundtrip!(serialize_block, deserialize_block, BlockBlob);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::Index;
    use crate::flake::{Flake, Object};
    use crate::index_tree::node::{ChildSummary, NodeMeta};

    #[test]
    fn leaf_roundtrip_is_deterministic() {
        let codec = NativeCodec;
        let leaf = Leaf {
            summary: ChildSummary::empty(true),
            meta: NodeMeta {
                comparator: Index::Spot,
                network: "net".into(),
                ledger_id: "led".into(),
                block: 1,
                t: -1,
            },
            flakes: vec![Flake::new(1, 1, Object::Int(7), 0, -1, true)],
        };
        let a = codec.serialize_leaf(&leaf).unwrap();
        let b = codec.serialize_leaf(&leaf).unwrap();
        assert_eq!(a, b);
        let back = codec.deserialize_leaf(&a).unwrap();
        assert_eq!(back.flakes.len(), 1);
    }
}
