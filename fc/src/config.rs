//! Configuration types and loading for the `fc` binary

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::FilterContextConfig;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON file holding persisted filter values
    #[serde(rename = "store-path", default = "default_store_path")]
    pub store_path: PathBuf,

    /// Filter context settings
    #[serde(default)]
    pub context: FilterContextConfig,
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filtercontext")
        .join("filters.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            context: FilterContextConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./filtercontext.yml
        let local_config = PathBuf::from("filtercontext.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/filtercontext/filtercontext.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("filtercontext").join("filtercontext.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_path_loads() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("fc.yml");
        fs::write(
            &path,
            "store-path: /tmp/orders.json\ncontext:\n  persistence-prefix: \"orders.\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/orders.json"));
        assert_eq!(config.context.persistence_prefix, "orders.");
        assert!(!config.context.allow_live_reattach);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("missing.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("fc.yml");
        let config = Config {
            store_path: temp.path().join("filters.json"),
            context: FilterContextConfig {
                persistence_prefix: "p/".to_string(),
                allow_live_reattach: true,
            },
        };

        config.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.store_path, config.store_path);
        assert_eq!(loaded.context, config.context);
    }

    #[test]
    fn test_default_store_path() {
        let config = Config::default();
        assert!(config.store_path.ends_with("filtercontext/filters.json"));
    }
}
