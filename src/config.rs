// Runtime configuration for the local state layer.
//
// Layering, lowest to highest precedence: built-in defaults, a TOML file
// (`medprompt.toml` unless a path is given), then `MEDPROMPT_*` environment
// variables with `__` separating nested keys, e.g.
// `MEDPROMPT_CONSENT__VERSION=1.1`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::consent::DEFAULT_CONSENT_VERSION;
use crate::errors::{StoreError, StoreResult};
use crate::gamification::{LevelTable, DEFAULT_THRESHOLDS};
use crate::search_history::{DEFAULT_HISTORY_LIMIT, DEFAULT_MIN_QUERY_LEN};

pub const DEFAULT_CONFIG_FILE: &str = "medprompt.toml";
pub const ENV_PREFIX: &str = "MEDPROMPT_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub consent: ConsentConfig,
    pub gamification: GamificationConfig,
    pub search: SearchConfig,
    pub error_tracking: ErrorTrackingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("medprompt")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    pub version: String,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CONSENT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GamificationConfig {
    pub level_thresholds: Vec<u64>,
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            level_thresholds: DEFAULT_THRESHOLDS.to_vec(),
        }
    }
}

impl GamificationConfig {
    pub fn level_table(&self) -> StoreResult<LevelTable> {
        LevelTable::new(self.level_thresholds.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub history_limit: usize,
    pub min_query_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            min_query_len: DEFAULT_MIN_QUERY_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Log,
    File,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorTrackingConfig {
    pub enabled: bool,
    pub sink: SinkKind,
    pub file_path: Option<PathBuf>,
    pub max_queue: usize,
    pub flush_interval_secs: u64,
}

impl Default for ErrorTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sink: SinkKind::Log,
            file_path: None,
            max_queue: 50,
            flush_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> StoreResult<()> {
        if self.consent.version.trim().is_empty() {
            return Err(StoreError::config("consent.version must not be empty"));
        }
        self.gamification.level_table()?;
        if self.search.history_limit == 0 {
            return Err(StoreError::config("search.history_limit must be at least 1"));
        }
        if self.error_tracking.max_queue == 0 {
            return Err(StoreError::config("error_tracking.max_queue must be at least 1"));
        }
        if self.error_tracking.flush_interval_secs == 0 {
            return Err(StoreError::config(
                "error_tracking.flush_interval_secs must be at least 1",
            ));
        }
        if self.error_tracking.sink == SinkKind::File && self.error_tracking.file_path.is_none() {
            return Err(StoreError::config(
                "error_tracking.file_path is required for the file sink",
            ));
        }
        Ok(())
    }
}

pub fn figment(path: Option<&Path>) -> Figment {
    let file = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

pub fn load_config(path: Option<&Path>) -> StoreResult<AppConfig> {
    let config: AppConfig = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}
