//! In-memory mirror of the processed-file ledger.
//!
//! Holds the composite keys of every file already extracted and saved, so a poll
//! cycle can skip known files without a store read. The ledger stays authoritative:
//! an empty cache only costs extra ledger checks, never reprocessing.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::models::ProcessedKey;

/// Set of processed-file keys
#[derive(Debug, Default)]
pub struct ProcessedFileCache {
    keys: RwLock<HashSet<String>>,
}

impl ProcessedFileCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &ProcessedKey) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key.as_str())
    }

    /// Record a key. Returns true if it was not already present.
    pub fn insert(&self, key: &ProcessedKey) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_str().to_string())
    }

    /// Add raw ledger keys loaded from the store
    pub fn extend<I>(&self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(keys);
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key (the state after a restart with no ledger load)
    pub fn clear(&self) {
        self.keys.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let cache = ProcessedFileCache::new();
        let key = ProcessedKey::new("file1", "2024-01-01T00:00:00Z");

        assert!(!cache.contains(&key));
        assert!(cache.insert(&key));
        assert!(cache.contains(&key));
        assert!(!cache.insert(&key));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_edited_file_is_not_cached() {
        let cache = ProcessedFileCache::new();
        cache.insert(&ProcessedKey::new("file1", "t1"));

        assert!(!cache.contains(&ProcessedKey::new("file1", "t2")));
    }

    #[test]
    fn test_extend_and_clear() {
        let cache = ProcessedFileCache::new();
        cache.extend(vec!["a_1".to_string(), "b_2".to_string(), "a_1".to_string()]);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&ProcessedKey::new("b", "2")));

        cache.clear();
        assert!(cache.is_empty());
    }
}
