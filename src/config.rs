//! Configuration for the registration growth core.
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration:
//!
//! ```yaml
//! data_path: ${VEHREG_DATA_DIR:-.}/vehicle_registration_data.csv
//! cache_ttl: 5m
//! row_policy: reject   # or: skip
//! known_categories: [2W, 3W, 4W, CV, EV]
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::category;

/// Default cache time-to-live (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default input file name.
pub const DEFAULT_DATA_PATH: &str = "vehicle_registration_data.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// What the loader does with a row that fails date or value validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    /// Fail the whole load on the first bad row.
    #[default]
    Reject,
    /// Drop the row from every aggregate and log a warning.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// CSV file holding the registration records.
    pub data_path: PathBuf,

    /// How long a computed snapshot stays fresh.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    pub row_policy: RowPolicy,

    /// Expected category vocabulary. Other categories load fine but are logged.
    pub known_categories: Vec<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            cache_ttl: DEFAULT_CACHE_TTL,
            row_policy: RowPolicy::default(),
            known_categories: category::KNOWN.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl DashboardConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: DashboardConfig = if raw.trim().is_empty() {
            DashboardConfig::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        let expanded = expand_env_vars(&config.data_path.to_string_lossy());
        config.data_path = PathBuf::from(expanded);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("data_path must not be empty".into()));
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::Validation(
                "cache_ttl must be greater than zero".into(),
            ));
        }
        if self.known_categories.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "known_categories must not contain blank entries".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references from the environment.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(&caps[1]).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}
