//! Per-item usage counts, used for the "most used prompts" ranking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::kv_store::{load_list, save_json, KvStore, Tracked};
use crate::lenient;

pub const USAGE_KEY: &str = "usage_records";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub item_id: String,
    #[serde(deserialize_with = "lenient::counter")]
    pub count: u64,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub last_used: DateTime<Utc>,
}

pub struct UsageTracker {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        load_list(self.store.as_ref(), USAGE_KEY)
    }

    /// Count one use of `item_id` and return its new count.
    ///
    /// An empty id is ignored and reports a count of zero.
    pub fn record_use(&self, item_id: &str) -> Tracked<u64> {
        if item_id.is_empty() {
            return Tracked::persisted(0);
        }

        let now = self.clock.now();
        let mut records = self.records();
        let count = match records.iter_mut().find(|r| r.item_id == item_id) {
            Some(record) => {
                record.count = record.count.saturating_add(1);
                record.last_used = now;
                record.count
            }
            None => {
                records.push(UsageRecord {
                    item_id: item_id.to_string(),
                    count: 1,
                    last_used: now,
                });
                1
            }
        };

        debug!(item_id = %item_id, count, "recorded use");
        Tracked::new(count, save_json(self.store.as_ref(), USAGE_KEY, &records))
    }

    /// Records ordered by count, highest first, at most `limit` long.
    ///
    /// Equal counts keep their stored order, which is first-use order.
    pub fn top_used(&self, limit: usize) -> Vec<UsageRecord> {
        let mut records = self.records();
        // sort_by is stable; ties keep collection order
        records.sort_by(|a, b| b.count.cmp(&a.count));
        records.truncate(limit);
        records
    }

    pub fn count(&self, item_id: &str) -> u64 {
        self.records()
            .iter()
            .find(|r| r.item_id == item_id)
            .map(|r| r.count)
            .unwrap_or(0)
    }
}
