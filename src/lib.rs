//! Library root for the `medprompt_state` crate
//! Local persistence and scoring for the medical prompt hub

// Core error handling
pub mod errors;

// Storage
pub mod clock;
pub mod kv_store;
pub mod lenient;

// Prompt usage & favorites
pub mod favorites;
pub mod favorites_export;
pub mod usage_tracker;

// Search
pub mod highlight;
pub mod search_history;

// Learning progress
pub mod gamification;
pub mod guide_progress;

// Feedback & consent
pub mod consent;
pub mod feedback;

// Error reporting
pub mod error_tracker;

// Configuration & CLI
pub mod cli;
pub mod config;
pub mod logging;

// Wiring
pub mod hub;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, AppConfig};
pub use errors::{StoreError, StoreResult};
pub use hub::StateHub;
pub use kv_store::{Durability, KvStore, MemoryKvStore, SledKvStore, Tracked};
