//! The `Store` capability: a key→bytes blob interface with content-addressed
//! keys. The core composes keys per [`crate::util`]'s schema; it makes no
//! atomicity claim across multiple keys (see `spec.md` §4.2) — the commit
//! protocol in [`crate::commit`] assumes single-key writes are durable once
//! acknowledged.

pub mod fs;
pub mod mem;

use crate::error::Result;

/// Capability-style storage interface, modeled as a trait object so a
/// [`crate::session::Connection`] can be configured with either bundled
/// implementation or a caller-supplied one (`storage-*` options in
/// `spec.md` §6) without this crate depending on any particular transport.
pub trait Store: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool>;

    /// `None` when the key is absent; distinct from an empty blob.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Returns the address the blob was written under. For the bundled
    /// stores this is the key itself; a remote store may return a
    /// canonical URL instead.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<String>;

    fn rename(&self, old: &str, new: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
