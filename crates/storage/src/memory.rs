//! In-memory storage.

use crate::Storage;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use core::ops::Bound;
use trellis_core::Value;

/// A [`Storage`] backed by a `BTreeMap`.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    data: BTreeMap<String, Value>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    /// Creates an empty storage behind a trait object.
    pub fn boxed() -> Box<dyn Storage> {
        Box::new(Self::new())
    }

    /// Returns the number of stored entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        tracing::trace!(key, "storage set");
        self.data.insert(String::from(key), value);
    }

    fn del(&mut self, key: &str) {
        tracing::trace!(key, "storage del");
        self.data.remove(key);
    }

    fn scan<'a>(&'a self, prefix: &str) -> Box<dyn Iterator<Item = (String, Value)> + 'a> {
        let prefix = String::from(prefix);
        let start = Bound::Included(prefix.clone());
        Box::new(
            self.data
                .range::<String, _>((start, Bound::Unbounded))
                .take_while(move |(k, _)| k.starts_with(prefix.as_str()))
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_get_set_del() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get("a"), None);
        storage.set("a", Value::from(1));
        assert_eq!(storage.get("a"), Some(Value::from(1)));
        storage.set("a", Value::from(2));
        assert_eq!(storage.get("a"), Some(Value::from(2)));
        storage.del("a");
        assert_eq!(storage.get("a"), None);
        storage.del("a");
        assert!(storage.is_empty());
    }

    #[test]
    fn test_scan_prefix() {
        let mut storage = MemoryStorage::new();
        storage.set("a,", Value::from(1));
        storage.set("a,b,", Value::from(2));
        storage.set("ab,", Value::from(3));
        storage.set("b,", Value::from(4));
        let keys: Vec<_> = storage.scan("a,").map(|(k, _)| k).collect();
        assert_eq!(keys, ["a,", "a,b,"]);
        assert_eq!(storage.scan("c").count(), 0);
        assert_eq!(storage.scan("").count(), 4);
    }
}
