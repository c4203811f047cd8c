//! JSON-LD-flavored `@context` expansion: local aliases to predicate IRIs,
//! `@reverse` markers, and `@container: @list` markers. See `spec.md` §4.7.

use std::collections::BTreeMap;

/// One context entry: what a local name expands to and how it should be
/// read back off a subject.
#[derive(Clone, Debug)]
pub struct ContextEntry {
    pub iri: String,
    pub reverse: bool,
    pub container_list: bool,
}

impl ContextEntry {
    pub fn new(iri: impl Into<String>) -> ContextEntry {
        ContextEntry {
            iri: iri.into(),
            reverse: false,
            container_list: false,
        }
    }

    pub fn reverse(mut self) -> ContextEntry {
        self.reverse = true;
        self
    }

    pub fn as_list(mut self) -> ContextEntry {
        self.container_list = true;
        self
    }
}

/// A resolved `@context`: local-name ⇄ IRI, in both directions. Expansion
/// falls through to the input unchanged when no alias is declared, so a
/// query may always use full IRIs directly.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: BTreeMap<String, ContextEntry>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn from_map(entries: BTreeMap<String, ContextEntry>) -> Context {
        Context { entries }
    }

    pub fn entry(&self, local: &str) -> Option<&ContextEntry> {
        self.entries.get(local)
    }

    pub fn expand(&self, local: &str) -> String {
        self.entries
            .get(local)
            .map(|e| e.iri.clone())
            .unwrap_or_else(|| local.to_string())
    }

    pub fn is_reverse(&self, local: &str) -> bool {
        self.entries.get(local).map(|e| e.reverse).unwrap_or(false)
    }

    pub fn is_list(&self, local: &str) -> bool {
        self.entries
            .get(local)
            .map(|e| e.container_list)
            .unwrap_or(false)
    }

    /// Compacts a full IRI back to whatever local alias maps to it, if any.
    pub fn compact(&self, iri: &str) -> String {
        self.entries
            .iter()
            .find(|(_, e)| e.iri == iri)
            .map(|(local, _)| local.clone())
            .unwrap_or_else(|| iri.to_string())
    }
}
