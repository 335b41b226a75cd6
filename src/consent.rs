//! Cookie consent with version gating.
//!
//! A stored decision only counts while its version matches the expected
//! one. Bumping the expected version therefore asks everyone again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::kv_store::{load_opt, remove_key, save_json, Durability, KvStore, Tracked};
use crate::lenient;

pub const CONSENT_KEY: &str = "cookie_consent";
pub const DEFAULT_CONSENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentPreferences {
    /// Always stored as `true`.
    pub necessary: bool,
    pub analytics: bool,
    pub marketing: bool,
}

impl ConsentPreferences {
    pub fn accept_all() -> Self {
        Self {
            necessary: true,
            analytics: true,
            marketing: true,
        }
    }

    pub fn necessary_only() -> Self {
        Self {
            necessary: true,
            analytics: false,
            marketing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStatus {
    pub consented: bool,
    pub preferences: ConsentPreferences,
    pub version: String,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub timestamp: DateTime<Utc>,
}

pub struct ConsentRegistry {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    version: String,
}

impl ConsentRegistry {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, version: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            version: version.into(),
        }
    }

    pub fn expected_version(&self) -> &str {
        &self.version
    }

    /// The current decision, or `None` when there is none, it cannot be
    /// read, or it was made under another version.
    pub fn read(&self) -> Option<ConsentStatus> {
        let status: ConsentStatus = load_opt(self.store.as_ref(), CONSENT_KEY)?;
        if status.version != self.version {
            debug!(
                stored = %status.version,
                expected = %self.version,
                "consent version changed, asking again"
            );
            return None;
        }
        Some(status)
    }

    pub fn save(&self, preferences: ConsentPreferences) -> Tracked<ConsentStatus> {
        let status = ConsentStatus {
            consented: true,
            preferences: ConsentPreferences {
                necessary: true,
                ..preferences
            },
            version: self.version.clone(),
            timestamp: self.clock.now(),
        };

        info!(
            analytics = status.preferences.analytics,
            marketing = status.preferences.marketing,
            version = %status.version,
            "saved cookie consent"
        );
        let durability = save_json(self.store.as_ref(), CONSENT_KEY, &status);
        Tracked::new(status, durability)
    }

    pub fn needs_consent(&self) -> bool {
        self.read().is_none()
    }

    pub fn has_analytics_consent(&self) -> bool {
        self.read().is_some_and(|s| s.preferences.analytics)
    }

    pub fn has_marketing_consent(&self) -> bool {
        self.read().is_some_and(|s| s.preferences.marketing)
    }

    pub fn revoke(&self) -> Durability {
        info!("revoked cookie consent");
        remove_key(self.store.as_ref(), CONSENT_KEY)
    }
}
