//! Small filesystem and key-composition helpers shared by the [`crate::store`]
//! and [`crate::commit`] modules.

use std::convert::TryInto;
use std::fs;
use std::io::{self, Read, Seek};
use std::path;

use crate::error::{Error, Result};

pub(crate) fn open_file_r(file: &str) -> Result<fs::File> {
    let p = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    Ok(opts.read(true).open(p)?)
}

pub(crate) fn open_file_w(file: &str, reuse: bool) -> Result<fs::File> {
    let p = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    Ok(match reuse {
        false => {
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent)?;
            }
            opts.write(true).create(true).truncate(true).open(p)?
        }
        true => opts.append(true).create(true).open(p)?,
    })
}

pub(crate) fn read_buffer(fd: &mut fs::File, fpos: u64, n: u64, msg: &str) -> Result<Vec<u8>> {
    fd.seek(io::SeekFrom::Start(fpos))?;
    let mut buf = vec![0u8; n.try_into().unwrap()];
    fd.read_exact(&mut buf).map_err(|err| {
        Error::StorageError(format!("{}: short read ({})", msg, err))
    })?;
    Ok(buf)
}

/// `<network>_<ledger>_root_<block-zero-padded-15>`
pub fn root_key(network: &str, ledger_id: &str, block: u64) -> String {
    format!("{}_{}_root_{:015}", network, ledger_id, block)
}

/// `<network>_<ledger>_<idx>_<uuid>-<l|b>`
pub fn node_key(network: &str, ledger_id: &str, idx: &str, kind: NodeKind) -> String {
    let uuid = uuid::Uuid::new_v4();
    let suffix = match kind {
        NodeKind::Leaf => "l",
        NodeKind::Branch => "b",
    };
    format!("{}_{}_{}_{}-{}", network, ledger_id, idx, uuid, suffix)
}

/// `<network>_<ledger>_block_<block-zero-padded-15>[--v<version>]`
pub fn block_key(network: &str, ledger_id: &str, block: u64, version: Option<u32>) -> String {
    match version {
        None => format!("{}_{}_block_{:015}", network, ledger_id, block),
        Some(v) => format!("{}_{}_block_{:015}--v{}", network, ledger_id, block, v),
    }
}

/// `<network>_<ledger>_garbage_<block>`
pub fn garbage_key(network: &str, ledger_id: &str, block: u64) -> String {
    format!("{}_{}_garbage_{}", network, ledger_id, block)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Branch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_key_is_zero_padded_and_sorts_chronologically() {
        let k1 = root_key("net", "led", 1);
        let k2 = root_key("net", "led", 2);
        let k10 = root_key("net", "led", 10);
        let mut keys = vec![k10.clone(), k2.clone(), k1.clone()];
        keys.sort();
        assert_eq!(keys, vec![k1, k2, k10]);
    }

    #[test]
    fn node_key_is_unique_per_call() {
        let a = node_key("net", "led", "spot", NodeKind::Leaf);
        let b = node_key("net", "led", "spot", NodeKind::Leaf);
        assert_ne!(a, b);
        assert!(a.ends_with("-l"));
    }
}
