//! In-memory [`Store`], used for tests and embedding without a filesystem.
//! Mirrors the teacher's in-memory/on-disk duality (`llrb` vs `robt`) at
//! the Store layer instead of the index layer.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::store::Store;

#[derive(Default)]
pub struct MemStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }
}

impl Store for MemStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(key))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<String> {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(key.to_string())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let mut blobs = self.blobs.lock().unwrap();
        if let Some(bytes) = blobs.remove(old) {
            blobs.insert(new.to_string(), bytes);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let store = MemStore::new();
        store.write("a", b"1").unwrap();
        store.write("b", b"2").unwrap();
        assert_eq!(store.read("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.list("a").unwrap(), vec!["a".to_string()]);
        store.rename("a", "c").unwrap();
        assert_eq!(store.read("a").unwrap(), None);
        assert_eq!(store.read("c").unwrap(), Some(b"1".to_vec()));
    }
}
