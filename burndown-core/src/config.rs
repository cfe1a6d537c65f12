//! Configuration: a key-value property store and the settings resolved from it
//!
//! The engine never reads configuration on its own. Callers resolve a
//! [`ForecastConfig`] once from any [`ConfigProvider`] and pass it in.

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::DEFAULT_DATE_FORMAT;

/// Comma separated list of backlog (sheet) names
pub const KEY_BACKLOGS: &str = "backlogs";
/// Sprint length in days
pub const KEY_SPRINT_LENGTH: &str = "sprintLength";
/// Weekday sprints start on
pub const KEY_SPRINT_START_DAY: &str = "sprintStartDay";
/// chrono format string for sprint start dates
pub const KEY_DATE_FORMAT: &str = "dateFormat";
/// Maximum number of sprints the forecast may synthesize
pub const KEY_FORECAST_LIMIT: &str = "forecastLimit";

pub const DEFAULT_FORECAST_LIMIT: usize = 104;

/// Source of the settings the engine needs
pub trait ConfigProvider {
    fn backlog_names(&self) -> Result<Vec<String>, ConfigError>;

    fn sprint_length_days(&self) -> Result<u32, ConfigError>;

    fn sprint_start_day(&self) -> Result<Weekday, ConfigError>;

    fn date_format(&self) -> Result<String, ConfigError> {
        Ok(DEFAULT_DATE_FORMAT.to_string())
    }

    fn forecast_limit(&self) -> Result<usize, ConfigError> {
        Ok(DEFAULT_FORECAST_LIMIT)
    }
}

/// Key-value configuration store persisted as YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyStore {
    properties: BTreeMap<String, String>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a usable single-backlog setup
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        store.set(KEY_BACKLOGS, "Backlog");
        store.set(KEY_SPRINT_LENGTH, "14");
        store.set(KEY_SPRINT_START_DAY, "Monday");
        store.set(KEY_DATE_FORMAT, DEFAULT_DATE_FORMAT);
        store
    }

    /// Loads the store from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Save the store to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|v| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        match self.get(key).map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ConfigError::Missing(key)),
        }
    }
}

impl ConfigProvider for PropertyStore {
    fn backlog_names(&self) -> Result<Vec<String>, ConfigError> {
        let names: Vec<String> = self
            .require(KEY_BACKLOGS)?
            .split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        if names.is_empty() {
            return Err(ConfigError::Missing(KEY_BACKLOGS));
        }
        Ok(names)
    }

    fn sprint_length_days(&self) -> Result<u32, ConfigError> {
        let value = self.require(KEY_SPRINT_LENGTH)?;
        match value.parse::<u32>() {
            Ok(days) if days > 0 => Ok(days),
            _ => Err(ConfigError::Invalid {
                key: KEY_SPRINT_LENGTH,
                value: value.to_string(),
            }),
        }
    }

    fn sprint_start_day(&self) -> Result<Weekday, ConfigError> {
        let value = self.require(KEY_SPRINT_START_DAY)?;
        value.parse::<Weekday>().map_err(|_| ConfigError::Invalid {
            key: KEY_SPRINT_START_DAY,
            value: value.to_string(),
        })
    }

    fn date_format(&self) -> Result<String, ConfigError> {
        match self.get(KEY_DATE_FORMAT).map(str::trim) {
            Some(v) if !v.is_empty() => {
                if StrftimeItems::new(v).any(|item| matches!(item, Item::Error)) {
                    return Err(ConfigError::Invalid {
                        key: KEY_DATE_FORMAT,
                        value: v.to_string(),
                    });
                }
                Ok(v.to_string())
            }
            _ => Ok(DEFAULT_DATE_FORMAT.to_string()),
        }
    }

    fn forecast_limit(&self) -> Result<usize, ConfigError> {
        match self.get(KEY_FORECAST_LIMIT).map(str::trim) {
            Some(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::Invalid {
                key: KEY_FORECAST_LIMIT,
                value: v.to_string(),
            }),
            _ => Ok(DEFAULT_FORECAST_LIMIT),
        }
    }
}

/// Settings resolved once, before any backlog is built
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub backlog_names: Vec<String>,
    pub sprint_length_days: u32,
    pub sprint_start_day: Weekday,
    pub date_format: String,
    pub forecast_limit: usize,
}

impl ForecastConfig {
    pub fn resolve(provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        Ok(Self {
            backlog_names: provider.backlog_names()?,
            sprint_length_days: provider.sprint_length_days()?,
            sprint_start_day: provider.sprint_start_day()?,
            date_format: provider.date_format()?,
            forecast_limit: provider.forecast_limit()?,
        })
    }

    pub fn sprint_length(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.sprint_length_days))
    }
}

/// Gets the path to the configuration file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("BURNDOWN_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    // Default to ~/.burndown.config
    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

    Ok(home_dir.join(".burndown.config"))
}
