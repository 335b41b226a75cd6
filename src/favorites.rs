//! Favorited prompt ids, kept in insertion order.

use std::sync::Arc;
use tracing::debug;

use crate::kv_store::{load_list, save_json, KvStore, Tracked};

pub const FAVORITES_KEY: &str = "favorites";

pub struct FavoritesSet {
    store: Arc<dyn KvStore>,
}

impl FavoritesSet {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn load(&self) -> Vec<String> {
        load_list(self.store.as_ref(), FAVORITES_KEY)
    }

    /// Flip membership of `item_id`. Returns `true` when it is now a favorite.
    ///
    /// Removal drops every occurrence, so a list carrying duplicates is
    /// cleaned up on the way out. An empty id is ignored and reports `false`.
    pub fn toggle(&self, item_id: &str) -> Tracked<bool> {
        if item_id.is_empty() {
            return Tracked::persisted(false);
        }
        let mut favorites = self.load();
        let now_favorite = if favorites.iter().any(|id| id == item_id) {
            favorites.retain(|id| id != item_id);
            false
        } else {
            favorites.push(item_id.to_string());
            true
        };

        debug!(item_id = %item_id, now_favorite, "toggled favorite");
        Tracked::new(
            now_favorite,
            save_json(self.store.as_ref(), FAVORITES_KEY, &favorites),
        )
    }

    pub fn is_favorite(&self, item_id: &str) -> bool {
        self.load().iter().any(|id| id == item_id)
    }

    /// Favorites in first-added order, without duplicates.
    pub fn list_all(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.load()
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.list_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
