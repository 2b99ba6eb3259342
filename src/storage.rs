//! Per-operator scratch storage.
//!
//! A sorted key-value map with prefix scan. Each operator owns one
//! `Storage` instance as private state — there is no cross-operator
//! sharing; storage is private to the operator that owns it.

use std::collections::BTreeMap;

/// A small value an operator tucks away between pushes. Kept as an
/// enumerated set of shapes rather than an arbitrary blob, since the
/// concrete shapes needed by Join's pKeySet bookkeeping and GroupBy's
/// per-group accumulators are few and worth naming.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue {
    /// A presence marker with no payload (Join's pKeySet entries).
    Present,
    Count(i64),
    Bytes(Vec<u8>),
}

/// Sorted key-value scratch store with prefix scan, owned by exactly one
/// operator.
#[derive(Debug, Default)]
pub struct Storage {
    entries: BTreeMap<String, StorageValue>,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            entries: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: StorageValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn del(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&StorageValue> {
        self.entries.get(key)
    }

    /// Iterate all entries whose key starts with `prefix`, in key order.
    pub fn scan<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a StorageValue)> + 'a {
        self.entries
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries whose key starts with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.scan(prefix).count()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
