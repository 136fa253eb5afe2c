//! Pipeline configuration
//!
//! Loaded from YAML. Every constant the pipeline uses (timezone, buffer
//! distance, projection, per-category expiry, the source list) lives here
//! rather than in the adapters.

use crate::dedup::DEFAULT_BUFFER_METERS;
use crate::feed::PayloadKind;
use crate::geometry::LambertConic;
use crate::record::ExpiryPolicy;
use crate::storage::DEFAULT_DOWNVOTES_THRESHOLD;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// The source list shipped with the crate.
const BUILTIN_CONFIG: &str = include_str!("../config/sources.yaml");

/// Errors raised while loading or checking configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("duplicate source name: {0}")]
    DuplicateSource(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("source {source_name} uses unregistered adapter '{adapter}'")]
    UnknownAdapter { source_name: String, adapter: String },

    #[error("buffer distance must be positive, got {0}")]
    InvalidBuffer(f64),
}

/// When the dedup snapshot is refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    /// Read once per source batch; same-batch near duplicates can both commit
    #[default]
    PerBatch,
    /// Also add every committed report to the batch's snapshot
    IncludeCommitted,
}

/// One external feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Registry key of the adapter that understands this feed
    pub adapter: String,
    pub url: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub kind: PayloadKind,
    pub report_type: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key, read at fetch time
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_api_key_param")]
    pub api_key_param: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_api_key_param() -> String {
    "apikey".to_string()
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn new(
        name: impl Into<String>,
        adapter: impl Into<String>,
        kind: PayloadKind,
        report_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            adapter: adapter.into(),
            url: String::new(),
            params: BTreeMap::new(),
            kind,
            report_type: report_type.into(),
            api_key: None,
            api_key_env: None,
            api_key_param: default_api_key_param(),
            enabled: true,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The API key, from the config itself or from `api_key_env`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        })
    }

    /// Query string pairs, API key included.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(key) = self.api_key() {
            pairs.push((self.api_key_param.clone(), key));
        }
        pairs
    }
}

/// Everything a pipeline run needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// IANA name of the feeds' civil timezone
    pub timezone: String,
    pub buffer_meters: f64,
    pub downvote_threshold: i64,
    /// Abort a whole source on its first invalid record (diagnostics only)
    pub raise_on_error: bool,
    pub fetch_timeout_secs: u64,
    pub snapshot: SnapshotPolicy,
    pub projection: LambertConic,
    pub categories: BTreeMap<String, ExpiryPolicy>,
    pub sources: Vec<SourceConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Paris".to_string(),
            buffer_meters: DEFAULT_BUFFER_METERS,
            downvote_threshold: DEFAULT_DOWNVOTES_THRESHOLD,
            raise_on_error: false,
            fetch_timeout_secs: 30,
            snapshot: SnapshotPolicy::default(),
            projection: LambertConic::default(),
            categories: default_categories(),
            sources: Vec::new(),
        }
    }
}

fn default_categories() -> BTreeMap<String, ExpiryPolicy> {
    BTreeMap::from([
        ("interrupt".to_string(), ExpiryPolicy::ExplicitEnd { default_hours: 7 * 24 }),
        ("traffic".to_string(), ExpiryPolicy::FromStart { hours: 24 }),
        ("accident".to_string(), ExpiryPolicy::FromStart { hours: 1 }),
        ("gcum".to_string(), ExpiryPolicy::FromStart { hours: 1 }),
    ])
}

impl PipelineConfig {
    /// The configuration shipped with the crate, listing every known feed.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml_str(BUILTIN_CONFIG)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if !(self.buffer_meters > 0.0) {
            return Err(ConfigError::InvalidBuffer(self.buffer_meters));
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    /// Expiry policy of a category; unknown categories get the default.
    pub fn expiry_policy(&self, report_type: &str) -> ExpiryPolicy {
        self.categories
            .get(report_type)
            .copied()
            .unwrap_or_default()
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Enable exactly the named sources.
    pub fn restrict_to(&mut self, names: &[String]) -> Result<(), ConfigError> {
        if let Some(unknown) = names.iter().find(|n| self.source(n).is_none()) {
            return Err(ConfigError::UnknownSource(unknown.clone()));
        }
        for source in &mut self.sources {
            source.enabled = names.contains(&source.name);
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = PipelineConfig::builtin().unwrap();
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Paris);
        assert!(config.source("paris").is_some());
        assert_eq!(config.source("bordeaux").unwrap().kind, PayloadKind::Kmz);
        assert_eq!(config.source("bordeaux").unwrap().report_type, "traffic");
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let config = PipelineConfig::from_yaml_str("sources: []\n").unwrap();
        assert_eq!(config.buffer_meters, 40.0);
        assert_eq!(config.downvote_threshold, 1);
        assert_eq!(config.snapshot, SnapshotPolicy::PerBatch);
        assert_eq!(config.expiry_policy("traffic"), ExpiryPolicy::FromStart { hours: 24 });
        assert_eq!(config.expiry_policy("pothole"), ExpiryPolicy::default());
    }

    #[test]
    fn duplicate_sources_are_rejected() {
        let yaml = r#"
sources:
  - { name: a, adapter: paris, url: "http://x", kind: json, report_type: interrupt }
  - { name: a, adapter: paris, url: "http://y", kind: json, report_type: interrupt }
"#;
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml),
            Err(ConfigError::DuplicateSource(name)) if name == "a"
        ));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("timezone: Mars/Olympus\n"),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn zero_buffer_is_rejected() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("buffer_meters: 0\n"),
            Err(ConfigError::InvalidBuffer(_))
        ));
    }

    #[test]
    fn api_key_is_appended_to_query() {
        let mut source = SourceConfig::new("s", "paris", PayloadKind::Json, "interrupt")
            .with_param("format", "json");
        source.api_key = Some("secret".to_string());
        source.api_key_param = "key".to_string();
        assert_eq!(
            source.query_pairs(),
            vec![
                ("format".to_string(), "json".to_string()),
                ("key".to_string(), "secret".to_string())
            ]
        );
    }

    #[test]
    fn restrict_to_enables_only_named_sources() {
        let mut config = PipelineConfig::builtin().unwrap();
        config.restrict_to(&["lyon".to_string()]).unwrap();
        let enabled: Vec<&str> = config.enabled_sources().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["lyon"]);
        assert!(matches!(
            config.restrict_to(&["atlantis".to_string()]),
            Err(ConfigError::UnknownSource(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roadfeed.yaml");
        std::fs::write(&path, "buffer_meters: 25\nsnapshot: include_committed\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.buffer_meters, 25.0);
        assert_eq!(config.snapshot, SnapshotPolicy::IncludeCommitted);
    }
}
