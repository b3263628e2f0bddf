//! Core engine types: configuration

pub mod config;

pub use config::{Config, ConfigError, EngineConfig, MemoryConfig, SceneConfig};
