//! # Configuration Management
//!
//! Settings for archive decode limits, the packing buffer pool and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - TOML strings via `from_toml()`
//! - Direct instantiation with defaults
//!
//! Limits bound every length read from untrusted bytes. A count above its limit is a
//! soft failure of that archive, never an allocation.

use crate::core::archive::{init_packing_pool, ArchiveLimits};
use crate::error::{ArchiveError, Result};
use crate::utils::buffer_pool::{BufferPool, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_POOLED_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, Level};

/// Hard ceiling for any configured decode limit
pub const MAX_DECODE_LIMIT: u32 = 16 * 1024 * 1024;

/// Top-level codec configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct CodecConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CodecConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ArchiveError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ArchiveError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ArchiveError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ArchiveError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ArchiveError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Every problem found; empty means valid
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.archive.validate());
        errors.extend(self.pool.validate());
        errors.extend(self.logging.validate());
        errors
    }

    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ArchiveError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Validate, then install the packing pool.
    ///
    /// Returns the limits to pass to unpacking archives. Fails if a pool is already in use.
    pub fn apply(&self) -> Result<ArchiveLimits> {
        self.validate_strict()?;
        if !init_packing_pool(BufferPool::from_config(&self.pool)) {
            return Err(ArchiveError::ConfigError(String::from(
                "Packing pool already initialized",
            )));
        }
        info!(
            pool_size = self.pool.pool_size,
            max_property_count = self.archive.max_property_count,
            "Codec configuration applied"
        );
        Ok(self.archive.limits())
    }
}

/// Decode limits
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ArchiveConfig {
    /// Longest string accepted, in bytes
    pub max_string_len: u32,

    /// Most elements accepted in one list
    pub max_list_len: u32,

    /// Most entries accepted in one property collection
    pub max_property_count: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        let limits = ArchiveLimits::default();
        Self {
            max_string_len: limits.max_string_len,
            max_list_len: limits.max_list_len,
            max_property_count: limits.max_property_count,
        }
    }
}

impl ArchiveConfig {
    pub fn limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_string_len: self.max_string_len,
            max_list_len: self.max_list_len,
            max_property_count: self.max_property_count,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("max_string_len", self.max_string_len),
            ("max_list_len", self.max_list_len),
            ("max_property_count", self.max_property_count),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            } else if value > MAX_DECODE_LIMIT {
                errors.push(format!(
                    "{name} too large: {value} (maximum: {MAX_DECODE_LIMIT})"
                ));
            }
        }

        errors
    }
}

/// Packing buffer pool sizing
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PoolConfig {
    /// Buffers allocated up front
    pub pool_size: usize,

    /// Capacity of each new buffer
    pub initial_capacity: usize,

    /// Buffers that grew beyond this are freed instead of pooled
    pub max_pooled_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 32,
            initial_capacity: DEFAULT_BUFFER_CAPACITY,
            max_pooled_capacity: DEFAULT_MAX_POOLED_CAPACITY,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.pool_size > 10_000 {
            errors.push(format!(
                "Pool size very high: {} (maximum recommended: 10,000)",
                self.pool_size
            ));
        }

        if self.initial_capacity == 0 {
            errors.push("Initial buffer capacity must be greater than 0".to_string());
        }

        if self.max_pooled_capacity < self.initial_capacity {
            errors.push(
                "Max pooled capacity cannot be smaller than initial capacity".to_string(),
            );
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    pub log_to_console: bool,

    pub log_to_file: bool,

    /// Required when `log_to_file` is set
    pub log_file_path: Option<String>,

    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("replica-archive"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
