//! Configuration loading
//!
//! Engine settings loadable from TOML or RON files, selected by extension.

use serde::{Deserialize, Serialize};

use crate::backend::BackendError;
use crate::registry::Colliders;

/// Format-agnostic configuration loading and saving
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_owned()))
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_owned()));
        };
        Ok(std::fs::write(path, contents)?)
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

/// Collision engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Capacity of each typed collider array
    pub max_colliders: usize,
    /// Capacity of the collision output buffer
    pub max_collisions: usize,
    /// Whether collision checking runs
    pub check: bool,
    /// Whether collision resolution runs
    pub resolve: bool,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            max_colliders: 1024,
            max_collisions: 2048,
            check: true,
            resolve: true,
        }
    }
}

impl Config for CollisionConfig {}

impl CollisionConfig {
    /// Apply the settings to a registry
    pub fn apply(&self, colliders: &mut Colliders) -> Result<(), BackendError> {
        colliders.set_max_colliders(self.max_colliders)?;
        colliders.set_max_collisions(self.max_collisions)?;
        colliders.set_check(self.check);
        colliders.set_resolve(self.resolve);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let cfg: CollisionConfig =
            toml::from_str("max_colliders = 16\nresolve = false\n").unwrap();
        assert_eq!(cfg.max_colliders, 16);
        assert_eq!(cfg.max_collisions, 2048);
        assert!(cfg.check);
        assert!(!cfg.resolve);
    }

    #[test]
    fn apply_configures_registry() {
        let cfg = CollisionConfig {
            max_colliders: 8,
            max_collisions: 4,
            check: true,
            resolve: false,
        };
        let mut reg = Colliders::new();
        cfg.apply(&mut reg).unwrap();
        assert_eq!(reg.max_colliders(), 8);
        assert_eq!(reg.max_collisions(), 4);
        assert!(!reg.resolve());
    }
}
