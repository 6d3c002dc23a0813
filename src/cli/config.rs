//! originbind configuration file handling
//!
//! Provides default configuration generation and loading. Configuration files
//! are TOML and live in the data directory next to the state files.

use originbind::gatekeeper::access_history::DEFAULT_MAX_ENTRIES;
use originbind::gatekeeper::gate::{DEFAULT_MAX_ORIGINS, DEFAULT_REJECTION_MESSAGE};
use originbind::gatekeeper::GatePolicy;
use originbind::geo::DEFAULT_API_URL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default config file name inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

/// originbind configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginBindConfig {
    /// Where state files live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gate policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Country-code enrichment
    #[serde(default)]
    pub geo: GeoConfig,

    /// Per-identity access history
    #[serde(default)]
    pub access_history: AccessHistoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding player-origins.toml, failed-logins.toml and
    /// access-history.toml
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_max_origins")]
    pub max_origins_per_identity: usize,

    /// Log a warning line for every denied attempt
    #[serde(default = "default_true")]
    pub log_denials: bool,

    /// Shown to denied players; supports {origin}, {count} and {max}
    #[serde(default = "default_rejection_message")]
    pub rejection_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessHistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("originbind")
}

fn default_max_origins() -> usize {
    DEFAULT_MAX_ORIGINS
}

fn default_true() -> bool {
    true
}

fn default_rejection_message() -> String {
    DEFAULT_REJECTION_MESSAGE.to_string()
}

fn default_cache_ttl_minutes() -> u64 {
    60
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_origins_per_identity: default_max_origins(),
            log_denials: true,
            rejection_message: default_rejection_message(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_minutes: default_cache_ttl_minutes(),
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AccessHistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl GeoConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl OriginBindConfig {
    /// Create a new configuration rooted at `data_dir`
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            storage: StorageConfig { data_dir },
            policy: PolicyConfig::default(),
            geo: GeoConfig::default(),
            access_history: AccessHistoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: OriginBindConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Gate policy derived from this configuration
    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            max_origins: self.policy.max_origins_per_identity,
            log_denials: self.policy.log_denials,
            rejection_message: self.policy.rejection_message.clone(),
            enrich_country: self.geo.enabled,
        }
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# originbind configuration
#
# Each player identity may only log in from a small set of approved IPs.
# The first IP a player connects from is registered automatically; further
# IPs are added by an operator.

[storage]
# Directory holding player-origins.toml, failed-logins.toml, access-history.toml
data_dir = {data_dir}

[policy]
# Maximum IPs per player (enforced by `originbind add`)
max_origins_per_identity = 2

# Log a warning line for every denied connection
log_denials = true

# Message shown to denied players. Placeholders: {{origin}}, {{count}}, {{max}}
rejection_message = """
Unauthorized IP address
This IP is not registered for your account
Contact an administrator if you need help"""

[geo]
# Annotate denials and access history with country codes (ip-api.com)
enabled = true

# How long a resolved country is trusted
cache_ttl_minutes = 60

api_url = "http://ip-api.com/json/"

# Bound on a single lookup
timeout_secs = 5

[access_history]
# Keep the most recent login attempts per player
enabled = true
max_entries = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/originbind.log"
"#,
            data_dir = toml::Value::String(data_dir.display().to_string())
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        data_dir: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default data directory
pub fn default_data_path() -> PathBuf {
    default_data_dir()
}

/// Get the default config file path for a data directory
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}
