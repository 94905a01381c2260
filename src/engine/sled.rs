use sled::{Db, IVec};
use tracing::{debug, warn};

use super::CatalogEngine;
use crate::{Result, ShelfError};

/// A [`CatalogEngine`] backed by the [`sled`] embedded database.
///
/// Uniqueness on insert is enforced with sled's `compare_and_swap`, so it holds across every
/// clone of the engine and every thread using it.
///
/// [`sled`]: https://docs.rs/sled/latest/sled/
#[derive(Clone)]
pub struct SledCatalogEngine(Db);

impl SledCatalogEngine {
    /// wraps an already opened sled database
    pub fn new(db: Db) -> Self {
        SledCatalogEngine(db)
    }
}

impl CatalogEngine for SledCatalogEngine {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.get(key)?.map(ivec_to_string).transpose()
    }

    fn insert_new(&self, key: String, value: String) -> Result<()> {
        let swapped = self
            .0
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value.as_bytes()))?;
        if swapped.is_err() {
            debug!(%key, "sled rejected insert of an existing key");
            return Err(ShelfError::DuplicateKey(key));
        }
        // the record is stored once the swap succeeded; sled retries the flush in the background
        if let Err(e) = self.0.flush() {
            warn!(%key, "inserted record not flushed yet: {}", e);
        }
        Ok(())
    }

    fn set(&self, key: String, value: String) -> Result<()> {
        self.0.insert(key, value.into_bytes())?;
        self.0.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.0.remove(key)?.ok_or(ShelfError::KeyNotFound)?;
        self.0.flush()?;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.0.contains_key(key)?)
    }

    fn last_key_with_prefix(&self, prefix: &str) -> Result<Option<String>> {
        match self.0.scan_prefix(prefix).next_back() {
            Some(entry) => {
                let (key, _) = entry?;
                Ok(Some(ivec_to_string(key)?))
            }
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        self.0
            .scan_prefix(prefix)
            .map(|entry| {
                let (key, value) = entry?;
                Ok((ivec_to_string(key)?, ivec_to_string(value)?))
            })
            .collect()
    }
}

fn ivec_to_string(bytes: IVec) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ShelfError::Internal(format!("stored bytes are not valid UTF-8: {}", e)))
}
