//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Where variant bytes and persisted records live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Storage root holding `content/`, `queue/` and the legacy directories
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Directory used by the file-backed record store
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            state_dir: default_state_dir(),
        }
    }
}

/// Scheduler tick and maintenance settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Interval between admission checks in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Files stuck in PROCESSING longer than this are marked FAILED
    #[serde(default = "default_stale_processing_minutes")]
    pub stale_processing_minutes: u64,
    /// Interval between stale-processing sweeps in seconds
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

fn default_tick_interval_ms() -> u64 {
    2000
}

fn default_stale_processing_minutes() -> u64 {
    30
}

fn default_maintenance_interval_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stale_processing_minutes: default_stale_processing_minutes(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

/// Progress notification batching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatesConfig {
    /// Debounce window for per-file updates in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Status HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusServerConfig {
    /// Whether the daemon serves `/status`
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    /// Socket address to bind
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_status_enabled() -> bool {
    true
}

fn default_bind_addr() -> String {
    "127.0.0.1:7879".to_string()
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_status_enabled(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
    #[serde(default)]
    pub status_server: StatusServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - MEDIA_STORAGE_ROOT -> storage.root
    /// - MEDIA_STATE_DIR -> storage.state_dir
    /// - MEDIA_SCHEDULER_TICK_MS -> scheduler.tick_interval_ms
    /// - MEDIA_STALE_PROCESSING_MINUTES -> scheduler.stale_processing_minutes
    /// - MEDIA_UPDATE_DEBOUNCE_MS -> updates.debounce_ms
    /// - MEDIA_STATUS_SERVER_ENABLED -> status_server.enabled
    /// - MEDIA_STATUS_BIND_ADDR -> status_server.bind_addr
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MEDIA_STORAGE_ROOT") {
            if !val.is_empty() {
                self.storage.root = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("MEDIA_STATE_DIR") {
            if !val.is_empty() {
                self.storage.state_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("MEDIA_SCHEDULER_TICK_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.scheduler.tick_interval_ms = ms;
            }
        }

        if let Ok(val) = env::var("MEDIA_STALE_PROCESSING_MINUTES") {
            if let Ok(minutes) = val.parse::<u64>() {
                self.scheduler.stale_processing_minutes = minutes;
            }
        }

        if let Ok(val) = env::var("MEDIA_UPDATE_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.updates.debounce_ms = ms;
            }
        }

        if let Ok(val) = env::var("MEDIA_STATUS_SERVER_ENABLED") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.status_server.enabled = true,
                "false" | "0" | "no" => self.status_server.enabled = false,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Ok(val) = env::var("MEDIA_STATUS_BIND_ADDR") {
            if !val.is_empty() {
                self.status_server.bind_addr = val;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    /// (environment overrides still apply). Unreadable or malformed files
    /// are still errors.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}
