//! Trellis Storage - Operator-local storage for the Trellis IVM engine.
//!
//! Stateful operators (Join, Exists) keep small auxiliary records such as
//! cached relationship sizes and the set of parent keys seen per join value.
//! They do so through the [`Storage`] trait so that a host can back the state
//! with anything that offers ordered get/set/delete and prefix scans.
//!
//! - `Storage`: The ordered key-value contract operators rely on
//! - `MemoryStorage`: A `BTreeMap` backed implementation
//! - `key`: Key encoding that keeps prefixes unambiguous
//!
//! # Example
//!
//! ```rust
//! use trellis_core::Value;
//! use trellis_storage::{key, MemoryStorage, Storage};
//!
//! let mut storage = MemoryStorage::new();
//! storage.set(&key::encode("pKeySet", &[Value::from(1), Value::from("a")]), Value::from(true));
//! storage.set(&key::encode("pKeySet", &[Value::from(1), Value::from("b")]), Value::from(true));
//! storage.set(&key::encode("pKeySet", &[Value::from(10), Value::from("c")]), Value::from(true));
//!
//! let prefix = key::encode("pKeySet", &[Value::from(1)]);
//! assert_eq!(storage.scan(&prefix).count(), 2);
//! ```

#![no_std]

extern crate alloc;

pub mod key;
mod memory;

pub use memory::MemoryStorage;

use alloc::boxed::Box;
use alloc::string::String;
use trellis_core::Value;

/// Ordered key-value storage used by stateful operators.
///
/// Keys are strings; iteration order of [`Storage::scan`] is lexicographic.
pub trait Storage {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: Value);

    /// Deletes `key`. Deleting a missing key is a no-op.
    fn del(&mut self, key: &str);

    /// Iterates over all entries whose key starts with `prefix`, in key order.
    fn scan<'a>(&'a self, prefix: &str) -> Box<dyn Iterator<Item = (String, Value)> + 'a>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        (**self).set(key, value)
    }

    fn del(&mut self, key: &str) {
        (**self).del(key)
    }

    fn scan<'a>(&'a self, prefix: &str) -> Box<dyn Iterator<Item = (String, Value)> + 'a> {
        (**self).scan(prefix)
    }
}
