//! This module provides the storage engines that hold catalog records.
//! The two engines that are implemented are [`KvStore`], a log-structured store written for
//! this crate, and [`SledCatalogEngine`], a wrapper around the [`sled`] database engine.
//!
//! Both engines keep their keys ordered, which lets the identifier allocator find the greatest
//! identifier under a prefix, and both refuse to insert a key that is already present.
//!
//! [`sled`]: https://docs.rs/sled/latest/sled/
use crate::Result;

/// A trait for the functionality of a catalog storage engine.
///
/// Keys are record identifiers and values are serialized records. Implementations must keep
/// keys in lexicographic order and must enforce key uniqueness in [`insert_new`] atomically,
/// since that check is the only thing preventing two concurrent allocators from handing out
/// the same identifier.
///
/// [`insert_new`]: #tymethod.insert_new
pub trait CatalogEngine: Clone + Send + 'static {
    /// Gets the value associated with the given `key`
    ///
    /// Returns `None` if the given `key` does not exist.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// inserts `key` and `value` only if `key` is not already present
    ///
    /// # Errors
    ///
    /// Returns `ShelfError::DuplicateKey` if the given `key` already exists.
    fn insert_new(&self, key: String, value: String) -> Result<()>;

    /// sets a `key` and `value`
    ///
    /// If the given `key` already exists the previous `value` will be overwritten.
    fn set(&self, key: String, value: String) -> Result<()>;

    /// Removes the given `key` (and associated value) from the store
    ///
    /// # Errors
    ///
    /// Returns `ShelfError::KeyNotFound` if the given `key` is not found.
    fn remove(&self, key: &str) -> Result<()>;

    /// returns true if `key` is currently present
    fn contains(&self, key: &str) -> Result<bool>;

    /// returns the lexicographically greatest key that starts with `prefix`
    fn last_key_with_prefix(&self, prefix: &str) -> Result<Option<String>>;

    /// returns every key/value pair whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

mod kvs;
mod sled;

pub use self::kvs::KvStore;
pub use self::sled::SledCatalogEngine;
