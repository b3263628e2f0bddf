//! Configuration system
//!
//! Pool sizing and scene capacities are fixed at init time by design: the
//! loader treats running out of either as a fatal condition rather than
//! growing silently, so the limits live in one serializable place.

use serde::{Deserialize, Serialize};

use crate::foundation::memory::{DEFAULT_PAGE_COUNT, DEFAULT_PAGE_SIZE};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a TOML file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to a TOML file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        if !path.ends_with(".toml") {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Memory pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Capacity of a freshly backed page, in bytes
    pub page_size: usize,
    /// Number of page slots in the pool (hard cap, never grown)
    pub page_count: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_count: DEFAULT_PAGE_COUNT,
        }
    }
}

/// Scene and asset capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Maximum number of actors a scene can hold
    pub max_actors: usize,
    /// Maximum number of registered models
    pub max_models: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_actors: 256,
            max_models: 32,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Memory pool sizing
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Scene and asset capacities
    #[serde(default)]
    pub scene: SceneConfig,
}

impl Config for EngineConfig {}
