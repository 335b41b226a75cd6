//! Recent search queries, newest first.

use std::sync::Arc;

use crate::kv_store::{load_list, remove_key, save_json, Durability, KvStore, Tracked};

pub const SEARCH_HISTORY_KEY: &str = "medical-prompt-search-history";
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_MIN_QUERY_LEN: usize = 2;

pub struct SearchHistory {
    store: Arc<dyn KvStore>,
    limit: usize,
    min_query_len: usize,
}

impl SearchHistory {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_limits(store, DEFAULT_HISTORY_LIMIT, DEFAULT_MIN_QUERY_LEN)
    }

    pub fn with_limits(store: Arc<dyn KvStore>, limit: usize, min_query_len: usize) -> Self {
        Self {
            store,
            limit,
            min_query_len,
        }
    }

    pub fn entries(&self) -> Vec<String> {
        load_list(self.store.as_ref(), SEARCH_HISTORY_KEY)
    }

    /// Move `query` to the front of the history.
    ///
    /// Queries are trimmed; ones shorter than the minimum length (in
    /// characters) are ignored and leave the history unchanged.
    pub fn add(&self, query: &str) -> Tracked<Vec<String>> {
        let trimmed = query.trim();
        if trimmed.chars().count() < self.min_query_len {
            return Tracked::persisted(self.entries());
        }

        let mut updated = vec![trimmed.to_string()];
        updated.extend(self.entries().into_iter().filter(|q| q != trimmed));
        updated.truncate(self.limit);

        let durability = save_json(self.store.as_ref(), SEARCH_HISTORY_KEY, &updated);
        Tracked::new(updated, durability)
    }

    pub fn remove(&self, query: &str) -> Tracked<Vec<String>> {
        let mut updated = self.entries();
        updated.retain(|q| q != query);
        let durability = save_json(self.store.as_ref(), SEARCH_HISTORY_KEY, &updated);
        Tracked::new(updated, durability)
    }

    pub fn clear(&self) -> Durability {
        remove_key(self.store.as_ref(), SEARCH_HISTORY_KEY)
    }
}
