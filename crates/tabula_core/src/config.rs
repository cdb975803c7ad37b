//! Cache configuration.

use std::collections::BTreeSet;

/// How an insert arriving on top of a pending update is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateInsertPolicy {
    /// Assume the earlier update touched no row and turn the entry into an
    /// insert. A genuine conflict surfaces only when the insert is flushed.
    #[default]
    Relaxed,
    /// Reject the insert as a duplicate key.
    Strict,
}

/// Configuration for the row cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether every table is cached regardless of `cached_tables`.
    pub cache_all_tables: bool,

    /// Names of the tables whose calls are intercepted by the cache.
    pub cached_tables: BTreeSet<String>,

    /// Treatment of update followed by insert on the same key.
    pub update_insert_policy: UpdateInsertPolicy,

    /// Whether rows read from the store on a cache miss are retained.
    pub retain_selected_rows: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_all_tables: false,
            cached_tables: BTreeSet::new(),
            update_insert_policy: UpdateInsertPolicy::Relaxed,
            retain_selected_rows: true,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether every table is cached.
    #[must_use]
    pub const fn cache_all_tables(mut self, value: bool) -> Self {
        self.cache_all_tables = value;
        self
    }

    /// Adds a table to the cached set.
    #[must_use]
    pub fn cache_table(mut self, name: impl Into<String>) -> Self {
        self.cached_tables.insert(name.into());
        self
    }

    /// Sets the update-then-insert policy.
    #[must_use]
    pub const fn update_insert_policy(mut self, policy: UpdateInsertPolicy) -> Self {
        self.update_insert_policy = policy;
        self
    }

    /// Sets whether rows read on a miss are retained.
    #[must_use]
    pub const fn retain_selected_rows(mut self, value: bool) -> Self {
        self.retain_selected_rows = value;
        self
    }

    /// Returns true if calls against `table` go through the cache.
    #[must_use]
    pub fn is_cached(&self, table: &str) -> bool {
        self.cache_all_tables || self.cached_tables.contains(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CacheConfig::default();
        assert!(!config.cache_all_tables);
        assert!(config.retain_selected_rows);
        assert_eq!(config.update_insert_policy, UpdateInsertPolicy::Relaxed);
        assert!(!config.is_cached("people"));
    }

    #[test]
    fn builder_pattern() {
        let config = CacheConfig::new()
            .cache_table("people")
            .update_insert_policy(UpdateInsertPolicy::Strict)
            .retain_selected_rows(false);

        assert!(config.is_cached("people"));
        assert!(!config.is_cached("orders"));
        assert!(!config.retain_selected_rows);
        assert_eq!(config.update_insert_policy, UpdateInsertPolicy::Strict);
    }

    #[test]
    fn cache_all_tables_overrides_set() {
        let config = CacheConfig::new().cache_all_tables(true);
        assert!(config.is_cached("anything"));
    }
}
