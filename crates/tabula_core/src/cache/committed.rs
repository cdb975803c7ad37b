//! Committed row store.

use crate::key::CacheKey;
use std::collections::HashMap;

/// Last known-good row images, keyed by cache key.
///
/// Entries are added when a pending row is promoted after a commit and
/// removed when a delete is promoted or the key is evicted.
#[derive(Debug, Clone)]
pub struct CommittedRows<E> {
    rows: HashMap<CacheKey, E>,
}

impl<E> Default for CommittedRows<E> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<E> CommittedRows<E> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the image stored under `key`.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&E> {
        self.rows.get(key)
    }

    /// Returns true if `key` has a committed image.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Stores or replaces an image.
    pub fn put(&mut self, key: CacheKey, row: E) {
        self.rows.insert(key, row);
    }

    /// Removes an image, returning it.
    pub fn remove(&mut self, key: &CacheKey) -> Option<E> {
        self.rows.remove(key)
    }

    /// Removes every image, returning how many were held.
    pub fn clear(&mut self) -> usize {
        let count = self.rows.len();
        self.rows.clear();
        count
    }

    /// Returns the number of images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no images are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over the committed keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.rows.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let mut rows = CommittedRows::new();
        let key = CacheKey::single(1);

        rows.put(key.clone(), "a");
        rows.put(key.clone(), "b");
        assert_eq!(rows.get(&key), Some(&"b"));
        assert_eq!(rows.len(), 1);

        assert_eq!(rows.remove(&key), Some("b"));
        assert!(!rows.contains(&key));
    }

    #[test]
    fn clear_reports_count() {
        let mut rows = CommittedRows::new();
        rows.put(CacheKey::single(1), ());
        rows.put(CacheKey::single(2), ());
        assert_eq!(rows.clear(), 2);
        assert!(rows.is_empty());
    }
}
