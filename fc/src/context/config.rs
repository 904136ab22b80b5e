//! Filter context configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Filter context configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterContextConfig {
    /// Prefix prepended to a value's key to form its persistence key
    #[serde(rename = "persistence-prefix", default = "default_persistence_prefix")]
    pub persistence_prefix: String,

    /// Open the live-reattach window from the start instead of waiting for
    /// an application update from the hot-reload watcher
    #[serde(rename = "allow-live-reattach", default)]
    pub allow_live_reattach: bool,
}

fn default_persistence_prefix() -> String {
    debug!("default_persistence_prefix: called");
    "filter:".to_string()
}

impl Default for FilterContextConfig {
    fn default() -> Self {
        debug!("FilterContextConfig::default: called");
        Self {
            persistence_prefix: default_persistence_prefix(),
            allow_live_reattach: false,
        }
    }
}

impl FilterContextConfig {
    /// Persistence key for a filter key under this configuration
    pub fn persistence_key(&self, key: &str) -> String {
        debug!(%key, "FilterContextConfig::persistence_key: called");
        format!("{}{}", self.persistence_prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FilterContextConfig::default();
        assert_eq!(config.persistence_prefix, "filter:");
        assert!(!config.allow_live_reattach);
    }

    #[test]
    fn test_persistence_key() {
        let config = FilterContextConfig {
            persistence_prefix: "orders.".to_string(),
            ..Default::default()
        };
        assert_eq!(config.persistence_key("status"), "orders.status");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: FilterContextConfig = serde_yaml::from_str("allow-live-reattach: true").unwrap();
        assert_eq!(config.persistence_prefix, "filter:");
        assert!(config.allow_live_reattach);
    }
}
