//! Filesystem-backed [`Store`], one directory per ledger. Grounded on the
//! teacher's `util::open_file_r`/`open_file_w`/`read_buffer` conventions:
//! plain `std::fs`, no memory-mapping or blob-store crate.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::error::Result;
use crate::store::Store;
use crate::util;

pub struct FsStore {
    root: PathBuf,
    // Serializes rename/delete against concurrent list() to avoid a reader
    // observing a half-renamed directory entry; reads and writes to
    // distinct keys do not contend on this.
    dirlock: Mutex<()>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<FsStore> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(FsStore {
            root,
            dirlock: Mutex::new(()),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl Store for FsStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path(key).exists())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let p = self.path(key);
        if !p.exists() {
            return Ok(None);
        }
        let mut fd = util::open_file_r(p.to_str().unwrap())?;
        let len = fd.metadata()?.len();
        Ok(Some(util::read_buffer(&mut fd, 0, len, "fs store read")?))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let p = self.path(key);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut fd = util::open_file_w(p.to_str().unwrap(), false)?;
        fd.write_all(bytes)?;
        fd.sync_all()?;
        debug!(target: "store ", "wrote {} ({} bytes)", key, bytes.len());
        Ok(key.to_string())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let _guard = self.dirlock.lock().unwrap();
        fs::rename(self.path(old), self.path(new))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.dirlock.lock().unwrap();
        let p = self.path(key);
        if p.exists() {
            fs::remove_file(p)?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let _guard = self.dirlock.lock().unwrap();
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_write_read_delete() {
        let dir = std::env::temp_dir().join(format!("flakedb-fsstore-test-{}", std::process::id()));
        let store = FsStore::new(&dir).unwrap();
        store.write("k1", b"hello").unwrap();
        assert_eq!(store.read("k1").unwrap(), Some(b"hello".to_vec()));
        assert!(store.exists("k1").unwrap());
        store.delete("k1").unwrap();
        assert_eq!(store.read("k1").unwrap(), None);
        let _ = fs::remove_dir_all(Path::new(&dir));
    }

    #[test]
    fn list_filters_by_prefix() {
        let dir = std::env::temp_dir().join(format!("flakedb-fsstore-list-{}", std::process::id()));
        let store = FsStore::new(&dir).unwrap();
        store.write("net_led_root_000000000000001", b"a").unwrap();
        store.write("net_led_root_000000000000002", b"b").unwrap();
        store.write("net_led_garbage_1", b"c").unwrap();
        let roots = store.list("net_led_root_").unwrap();
        assert_eq!(roots.len(), 2);
        let _ = fs::remove_dir_all(Path::new(&dir));
    }
}
