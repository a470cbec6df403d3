use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::eta::DEFAULT_CRUISE_SPEED_MPS;
use crate::matching::DEFAULT_TOLERANCE_M;
use crate::network::Role;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid duration '{value}': {source}")]
    Duration {
        value: String,
        source: humantime::DurationError,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Location of the routes, vehicles and drivers file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    pub path: PathBuf,
}

/// A bearer key and the user it authenticates.
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    pub key: String,
    pub user_id: String,
    pub name: String,
    /// Role given on first use. Defaults to driver for users listed as
    /// drivers in the reference data and student otherwise.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_tolerance")]
    pub match_tolerance_m: f64,
    #[serde(default = "default_speed")]
    pub default_speed_mps: f64,
    #[serde(default = "default_persist_timeout")]
    pub persist_timeout: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            match_tolerance_m: default_tolerance(),
            default_speed_mps: default_speed(),
            persist_timeout: default_persist_timeout(),
        }
    }
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE_M
}

fn default_speed() -> f64 {
    DEFAULT_CRUISE_SPEED_MPS
}

fn default_persist_timeout() -> String {
    "2s".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON-lines history file. History is kept in memory when unset.
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    crate::realtime::DEFAULT_CAPACITY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Ingest,
    ReadPositions,
}

impl Config {
    /// Read a config file. Relative paths inside it resolve against the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;

        if let Some(base) = path.parent() {
            config.reference.path = base.join(&config.reference.path);
            if let Some(history) = config.store.history_path.as_mut() {
                *history = base.join(&*history);
            }
        }
        Ok(config)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut keys = HashSet::new();
        for identity in &self.identities {
            if identity.key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "identity {} has an empty key",
                    identity.user_id
                )));
            }
            if !keys.insert(identity.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate key for identity {}",
                    identity.user_id
                )));
            }
        }

        let pipeline = &self.pipeline;
        if !(pipeline.match_tolerance_m.is_finite() && pipeline.match_tolerance_m > 0.0) {
            return Err(ConfigError::Invalid(
                "pipeline.match_tolerance_m must be positive".into(),
            ));
        }
        if !(pipeline.default_speed_mps.is_finite() && pipeline.default_speed_mps > 0.0) {
            return Err(ConfigError::Invalid(
                "pipeline.default_speed_mps must be positive".into(),
            ));
        }
        if self.persist_timeout()?.is_zero() {
            return Err(ConfigError::Invalid(
                "pipeline.persist_timeout must be positive".into(),
            ));
        }
        if self.realtime.capacity == 0 {
            return Err(ConfigError::Invalid(
                "realtime.capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn persist_timeout(&self) -> Result<Duration, ConfigError> {
        let value = &self.pipeline.persist_timeout;
        humantime::parse_duration(value).map_err(|source| ConfigError::Duration {
            value: value.clone(),
            source,
        })
    }

    pub fn find_identity(&self, key: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
reference:
  path: network.yaml
"#;

    #[test]
    fn test_defaults() {
        let config = Config::from_str(MINIMAL).unwrap();

        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert_eq!(config.pipeline.match_tolerance_m, 50.0);
        assert_eq!(config.pipeline.default_speed_mps, 5.0);
        assert_eq!(config.persist_timeout().unwrap(), Duration::from_secs(2));
        assert_eq!(config.realtime.capacity, 256);
        assert!(config.store.history_path.is_none());
        assert!(config.identities.is_empty());
    }

    #[test]
    fn test_identities() {
        let config = Config::from_str(
            r#"
reference: { path: network.yaml }
identities:
  - { key: k-alice, user_id: alice, name: Alice }
  - { key: k-ops, user_id: ops, name: Ops, role: admin }
pipeline:
  persist_timeout: 500ms
"#,
        )
        .unwrap();

        let ops = config.find_identity("k-ops").unwrap();
        assert_eq!(ops.user_id, "ops");
        assert_eq!(ops.role, Some(Role::Admin));
        assert_eq!(config.find_identity("k-alice").unwrap().role, None);
        assert!(config.find_identity("nope").is_none());
        assert_eq!(
            config.persist_timeout().unwrap(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let duplicate = r#"
reference: { path: n.yaml }
identities:
  - { key: same, user_id: a, name: A }
  - { key: same, user_id: b, name: B }
"#;
        assert!(matches!(
            Config::from_str(duplicate),
            Err(ConfigError::Invalid(_))
        ));

        let zero_speed = "reference: { path: n.yaml }\npipeline: { default_speed_mps: 0 }\n";
        assert!(matches!(
            Config::from_str(zero_speed),
            Err(ConfigError::Invalid(_))
        ));

        let bad_timeout = "reference: { path: n.yaml }\npipeline: { persist_timeout: soon }\n";
        assert!(matches!(
            Config::from_str(bad_timeout),
            Err(ConfigError::Duration { .. })
        ));

        assert!(matches!(
            Config::from_str("web: { bind: x }\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "reference: { path: network.yaml }\nstore: { history_path: data/pings.jsonl }\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.reference.path, temp_dir.path().join("network.yaml"));
        assert_eq!(
            config.store.history_path,
            Some(temp_dir.path().join("data/pings.jsonl"))
        );
    }
}
