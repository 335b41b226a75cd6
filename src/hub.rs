//! One entry point that wires every component onto a shared store.

use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, StorageBackend};
use crate::consent::ConsentRegistry;
use crate::errors::{StoreError, StoreResult};
use crate::favorites::FavoritesSet;
use crate::feedback::FeedbackRecorder;
use crate::gamification::{GamificationTracker, LevelTable};
use crate::guide_progress::GuideProgress;
use crate::highlight::Highlighter;
use crate::kv_store::{KvStore, MemoryKvStore, SledKvStore};
use crate::search_history::SearchHistory;
use crate::usage_tracker::UsageTracker;

pub struct StateHub {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
    level_table: LevelTable,
}

impl StateHub {
    /// Open the store named by `config` and validate the settings.
    pub fn open(config: &AppConfig) -> StoreResult<Self> {
        config.validate()?;
        let store: Arc<dyn KvStore> = match config.storage.backend {
            StorageBackend::Sled => {
                std::fs::create_dir_all(&config.storage.data_dir).map_err(|e| {
                    StoreError::io(
                        format!("create {}", config.storage.data_dir.display()),
                        e,
                    )
                })?;
                Arc::new(SledKvStore::open(&config.storage.data_dir)?)
            }
            StorageBackend::Memory => Arc::new(MemoryKvStore::new()),
        };
        info!(backend = ?config.storage.backend, "state hub ready");
        Self::with_store(store, Arc::new(SystemClock), config.clone())
    }

    /// Session-only hub with default settings.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryKvStore::new()),
            clock: Arc::new(SystemClock),
            config: AppConfig::default(),
            level_table: LevelTable::default(),
        }
    }

    pub fn with_store(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> StoreResult<Self> {
        let level_table = config.gamification.level_table()?;
        Ok(Self {
            store,
            clock,
            config,
            level_table,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn usage(&self) -> UsageTracker {
        UsageTracker::new(self.store(), self.clock())
    }

    pub fn favorites(&self) -> FavoritesSet {
        FavoritesSet::new(self.store())
    }

    pub fn search_history(&self) -> SearchHistory {
        SearchHistory::with_limits(
            self.store(),
            self.config.search.history_limit,
            self.config.search.min_query_len,
        )
    }

    pub fn gamification(&self) -> GamificationTracker {
        GamificationTracker::new(self.store(), self.clock(), self.level_table.clone())
    }

    pub fn feedback(&self) -> FeedbackRecorder {
        FeedbackRecorder::new(self.store(), self.clock())
    }

    pub fn consent(&self) -> ConsentRegistry {
        ConsentRegistry::new(self.store(), self.clock(), self.config.consent.version.clone())
    }

    pub fn guide_progress(&self, guide_id: &str) -> GuideProgress {
        GuideProgress::new(self.store(), guide_id)
    }

    pub fn highlighter(&self) -> Highlighter {
        Highlighter::default()
    }
}
