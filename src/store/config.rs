//! Runtime configuration for stores.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Order in which a draining store picks up pending actions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Actions emitted synchronously by the effect just subscribed run before
    /// actions buffered from elsewhere.
    #[default]
    SynchronousFirst,
    /// Every pending action runs in arrival order.
    Fifo,
}

/// What to do when a reducer calls `send` on its own store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentrancyCheck {
    Panic,
    /// Log a warning and queue the action.
    Warn,
    /// Queue the action silently.
    Ignore,
}

impl Default for ReentrancyCheck {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Warn
        }
    }
}

/// Store settings that do not depend on the domain types.
///
/// Every field has a default, so a partial JSON document is valid:
///
/// ```rust
/// use tka::store::{DrainPolicy, StoreConfig};
///
/// let config = StoreConfig::from_json(r#"{ "label": "app", "drain_policy": "fifo" }"#).unwrap();
/// assert_eq!(config.label.as_deref(), Some("app"));
/// assert_eq!(config.drain_policy, DrainPolicy::Fifo);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name used in log events.
    pub label: Option<String>,
    pub drain_policy: DrainPolicy,
    pub reentrancy: ReentrancyCheck,
}

impl StoreConfig {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_drain_policy(mut self, drain_policy: DrainPolicy) -> Self {
        self.drain_policy = drain_policy;
        self
    }

    pub fn with_reentrancy(mut self, reentrancy: ReentrancyCheck) -> Self {
        self.reentrancy = reentrancy;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// The label for log events, `"store"` when none was set.
    pub(crate) fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("store")
    }
}

/// Errors loading or saving a [`StoreConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid store configuration: {0}")]
    Parse(String),

    #[error("Could not read store configuration from {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Could not serialize store configuration: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.drain_policy, DrainPolicy::SynchronousFirst);
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let config = StoreConfig::default()
            .with_label("counter")
            .with_drain_policy(DrainPolicy::Fifo)
            .with_reentrancy(ReentrancyCheck::Ignore);

        let json = config.to_json().unwrap();

        assert!(json.contains("\"fifo\""));
        assert_eq!(StoreConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let error = StoreConfig::from_json(r#"{ "drain_policy": "random" }"#).unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = StoreConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(error.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn debug_builds_panic_on_reentrancy() {
        assert_eq!(ReentrancyCheck::default(), ReentrancyCheck::Panic);
    }
}
