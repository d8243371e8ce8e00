//! Configuration loading for backchain.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.backchain/config.toml`)
//! 3. User config (`~/.backchain/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The engine runs with sensible defaults
//! when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::core::hit_policy::HitPolicy;
use crate::error::{ChainError, FailOpen, Result};
use crate::table::DEFAULT_ROW_ID_PREFIX;
use crate::util::{read_to_string_limited, MAX_FILE_SIZE};

/// Main configuration struct for backchain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Resolution configuration.
    pub engine: EngineConfig,
    /// Rule learning configuration.
    pub learning: LearningConfig,
    /// Decision-table document configuration.
    pub table: TableConfig,
    /// Log output configuration.
    pub logging: LoggingConfig,
}

/// Resolution configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Hit policy for outputs whose table declares none.
    pub default_hit_policy: HitPolicy,
}

/// Rule learning configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LearningConfig {
    /// Whether the rule factory is consulted.
    pub enabled: bool,
    /// Maximum rules learned by one decision.
    pub max_new_rules: usize,
}

/// Minimum valid max_new_rules value.
pub const MIN_MAX_NEW_RULES: usize = 1;

impl LearningConfig {
    /// Check if max_new_rules is valid (must be >= 1).
    ///
    /// Use `enabled = false` to turn learning off.
    pub fn is_valid_max_new_rules(value: usize) -> bool {
        value >= MIN_MAX_NEW_RULES
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_new_rules: 32,
        }
    }
}

/// Decision-table document configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableConfig {
    /// Prefix for generated row identifiers.
    pub row_id_prefix: String,
    /// Largest document that will be read, in bytes.
    pub max_document_bytes: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            row_id_prefix: DEFAULT_ROW_ID_PREFIX.to_string(),
            max_document_bytes: MAX_FILE_SIZE,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub level: String,
}

/// Valid values for the logging level field.
pub const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl LoggingConfig {
    /// Check if a log level value is valid.
    pub fn is_valid_level(value: &str) -> bool {
        VALID_LOG_LEVELS.contains(&value)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. Project config (`.backchain/config.toml` in cwd)
    /// 3. User config (`~/.backchain/config.toml`)
    /// 4. Defaults
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.backchain/config.toml`.
    fn load_user_config() -> Option<Config> {
        let path = backchain_home()?.join("config.toml");
        Self::load_optional(&path)
    }

    /// Load project config from `.backchain/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        let path = cwd.join(".backchain").join("config.toml");
        Self::load_optional(&path)
    }

    /// Load a config file that may legitimately be absent.
    ///
    /// A file that exists but cannot be read or parsed is reported and
    /// skipped.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.is_file() {
            return None;
        }
        Self::load_from_file(path)
            .map(Some)
            .fail_open_default(&format!("loading {}", path.display()))
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = read_to_string_limited(path)?;
        toml::from_str(&content)
            .map_err(|e| ChainError::config(format!("{}: {}", path.display(), e)))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // BACKCHAIN_DEFAULT_HIT_POLICY
        if let Ok(val) = env::var("BACKCHAIN_DEFAULT_HIT_POLICY") {
            match val.parse::<HitPolicy>() {
                Ok(policy) => self.engine.default_hit_policy = policy,
                Err(_) => eprintln!(
                    "Warning: Invalid BACKCHAIN_DEFAULT_HIT_POLICY value '{}'. \
                    Using '{}'.",
                    val, self.engine.default_hit_policy
                ),
            }
        }

        // BACKCHAIN_LEARNING_ENABLED
        if let Ok(val) = env::var("BACKCHAIN_LEARNING_ENABLED") {
            match val.as_str() {
                "true" | "1" => self.learning.enabled = true,
                "false" | "0" => self.learning.enabled = false,
                _ => eprintln!(
                    "Warning: Invalid BACKCHAIN_LEARNING_ENABLED value '{}'. \
                    Expected true/false. Using '{}'.",
                    val, self.learning.enabled
                ),
            }
        }

        // BACKCHAIN_MAX_NEW_RULES
        if let Ok(val) = env::var("BACKCHAIN_MAX_NEW_RULES") {
            match val.parse::<usize>() {
                Ok(n) if LearningConfig::is_valid_max_new_rules(n) => {
                    self.learning.max_new_rules = n
                }
                _ => eprintln!(
                    "Warning: Invalid BACKCHAIN_MAX_NEW_RULES value '{}'. \
                    Must be an integer >= {}. Using '{}'.",
                    val, MIN_MAX_NEW_RULES, self.learning.max_new_rules
                ),
            }
        }

        // BACKCHAIN_LOG_LEVEL
        if let Ok(val) = env::var("BACKCHAIN_LOG_LEVEL") {
            let level = val.to_ascii_lowercase();
            if LoggingConfig::is_valid_level(&level) {
                self.logging.level = level;
            } else {
                eprintln!(
                    "Warning: Invalid BACKCHAIN_LOG_LEVEL value '{}'. \
                    Valid values: {:?}. Using '{}'.",
                    val, VALID_LOG_LEVELS, self.logging.level
                );
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// The `other` config takes precedence for every field it sets to a
    /// non-default value. Merging is field by field, so a project config that
    /// only changes `learning.enabled` keeps the user's `max_new_rules`.
    ///
    /// # Limitation
    ///
    /// A layer cannot set a value back to its default to override a
    /// non-default value from a lower layer, because "not set in file" and
    /// "explicitly set to the default" deserialize identically.
    fn merge(mut self, other: Config) -> Self {
        let default_engine = EngineConfig::default();
        if other.engine.default_hit_policy != default_engine.default_hit_policy {
            self.engine.default_hit_policy = other.engine.default_hit_policy;
        }

        let default_learning = LearningConfig::default();
        if other.learning.enabled != default_learning.enabled {
            self.learning.enabled = other.learning.enabled;
        }
        if other.learning.max_new_rules != default_learning.max_new_rules {
            self.learning.max_new_rules = other.learning.max_new_rules;
        }

        let default_table = TableConfig::default();
        if other.table.row_id_prefix != default_table.row_id_prefix {
            self.table.row_id_prefix = other.table.row_id_prefix;
        }
        if other.table.max_document_bytes != default_table.max_document_bytes {
            self.table.max_document_bytes = other.table.max_document_bytes;
        }

        if other.logging.level != LoggingConfig::default().level {
            self.logging.level = other.logging.level;
        }

        self
    }
}

/// Get the backchain home directory.
///
/// Checks `BACKCHAIN_HOME` first, then falls back to `~/.backchain`.
/// An empty `BACKCHAIN_HOME` is ignored.
pub fn backchain_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("BACKCHAIN_HOME") {
        if home.is_empty() {
            tracing::warn!("BACKCHAIN_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("BACKCHAIN_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".backchain"));
    }

    // Containerized/minimal environments without HOME
    let fallback_path = env::temp_dir().join("backchain");
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

/// Path of the crash log written by the panic hook.
pub fn crash_log_path() -> Option<PathBuf> {
    backchain_home().map(|home| home.join("crash.log"))
}
