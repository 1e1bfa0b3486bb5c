//! City configuration loaded from YAML.
//!
//! A city file names the city, lists its datasets with the schema used to
//! normalize each one, and carries the feature, threshold, monitor and
//! orchestrator settings for scoring runs:
//!
//! ```yaml
//! city_name: Scottsdale
//! datasets:
//!   ez_complaints:
//!     path: data/complaints.jsonl
//!     category: complaints
//!     schema:
//!       record_type: complaint
//!       property_id_field: property_id
//!       timestamp_field: complaint_date
//!       fields:
//!         complaint_type: { canonical: category, kind: text }
//! thresholds:
//!   boundaries:
//!     - { name: low, lower: 0.0, upper: 0.3 }
//!     - { name: medium, lower: 0.3, upper: 0.7 }
//!     - { name: high, lower: 0.7, upper: 1.0 }
//!   score_delta_alert_threshold: 0.2
//! ```
//!
//! Relative dataset and label paths are resolved against the directory that
//! holds the configuration file.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use log::debug;
use nuisance_core::{
    ConfigError, FeatureConfig, FeatureConfigError, MonitorPolicy, Orchestrator,
    OrchestratorConfig, SchemaMap, SourceSchema, ThresholdConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category assigned to datasets that do not name one.
pub const DEFAULT_DATASET_CATEGORY: &str = "other";

/// One raw dataset of a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSON Lines file holding the dataset's rows.
    pub path: Utf8PathBuf,
    /// Grouping used for summaries, e.g. `complaints` or `properties`.
    #[serde(default = "default_category")]
    pub category: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// How rows map onto canonical records.
    pub schema: SourceSchema,
}

fn default_category() -> String {
    DEFAULT_DATASET_CATEGORY.to_owned()
}

/// Observed outcomes used to train a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelsConfig {
    /// JSON Lines file of `{property_id, outcome}` rows.
    pub path: Utf8PathBuf,
    /// Features are built from records at or before this instant.
    pub as_of: DateTime<Utc>,
    /// Epoch label attached to the training vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<String>,
}

/// Everything needed to train and score for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    /// City the configuration describes.
    pub city_name: String,
    /// Dataset name to dataset. Names double as [`nuisance_core::RawRecord::source`].
    pub datasets: BTreeMap<String, DatasetConfig>,
    /// Feature construction settings.
    #[serde(default)]
    pub features: FeatureConfig,
    /// Risk bands and the delta alert threshold.
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// Change monitor policy.
    #[serde(default)]
    pub monitor: MonitorPolicy,
    /// Worker count, failure tolerance and lookback.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Training outcomes, when the city has any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelsConfig>,
}

/// Errors raised while loading a city configuration.
#[derive(Debug, Error)]
pub enum CityConfigError {
    /// The file could not be read.
    #[error("failed to read city configuration at {path}")]
    Read {
        /// Requested file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// The YAML was malformed or held invalid thresholds.
    #[error("failed to parse city configuration from {origin}")]
    Parse {
        /// File path, or `inline` for in-memory text.
        origin: String,
        /// Source error from `serde_yaml`.
        #[source]
        source: serde_yaml::Error,
    },
    /// `city_name` was blank.
    #[error("city_name must not be blank")]
    BlankCityName,
    /// No datasets were listed.
    #[error("city {city_name} lists no datasets")]
    NoDatasets {
        /// City being configured.
        city_name: String,
    },
    /// A dataset had an empty path.
    #[error("dataset {name} has an empty path")]
    EmptyDatasetPath {
        /// Dataset name.
        name: String,
    },
    /// The feature settings were invalid.
    #[error(transparent)]
    Features(#[from] FeatureConfigError),
    /// The orchestrator settings were invalid.
    #[error(transparent)]
    Orchestrator(#[from] ConfigError),
    /// A complaint window reaches further back than records are fetched.
    #[error(
        "complaint window of {window_days} days exceeds the orchestrator lookback of {lookback_days} days"
    )]
    WindowBeyondLookback {
        /// Longest configured complaint window.
        window_days: u32,
        /// Configured record lookback.
        lookback_days: u32,
    },
}

impl CityConfig {
    /// Load, resolve and validate a configuration file.
    ///
    /// # Errors
    /// Returns [`CityConfigError`] when the file cannot be read or parsed, or
    /// when the configuration is invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, CityConfigError> {
        let text = nuisance_fs::read_to_string(path).map_err(|source| CityConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse_yaml(&text, path.as_str())?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        debug!(
            "loaded city configuration for {} with {} datasets",
            config.city_name,
            config.datasets.len()
        );
        Ok(config)
    }

    /// Parse and validate YAML text without touching the filesystem.
    ///
    /// Paths are left as written.
    ///
    /// # Errors
    /// Returns [`CityConfigError`] when the text is malformed or the
    /// configuration is invalid.
    pub fn from_yaml(text: &str) -> Result<Self, CityConfigError> {
        let config = Self::parse_yaml(text, "inline")?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(text: &str, origin: &str) -> Result<Self, CityConfigError> {
        serde_yaml::from_str(text).map_err(|source| CityConfigError::Parse {
            origin: origin.to_owned(),
            source,
        })
    }

    /// Check settings that serde cannot.
    ///
    /// # Errors
    /// Returns [`CityConfigError`] for a blank city name, no datasets, an
    /// empty dataset path, invalid feature or orchestrator settings, or a
    /// complaint window longer than a bounded record lookback.
    pub fn validate(&self) -> Result<(), CityConfigError> {
        if self.city_name.trim().is_empty() {
            return Err(CityConfigError::BlankCityName);
        }
        if self.datasets.is_empty() {
            return Err(CityConfigError::NoDatasets {
                city_name: self.city_name.clone(),
            });
        }
        if let Some((name, _)) = self
            .datasets
            .iter()
            .find(|(_, dataset)| dataset.path.as_str().is_empty())
        {
            return Err(CityConfigError::EmptyDatasetPath { name: name.clone() });
        }
        self.features.validate()?;
        Orchestrator::new(self.orchestrator)?;
        let window_days = self.features.max_lookback_days();
        if let Some(lookback_days) = self.orchestrator.lookback_days
            && window_days > lookback_days
        {
            return Err(CityConfigError::WindowBeyondLookback {
                window_days,
                lookback_days,
            });
        }
        Ok(())
    }

    /// Join relative dataset and label paths onto `base`.
    pub fn resolve_paths(&mut self, base: &Utf8Path) {
        for dataset in self.datasets.values_mut() {
            if dataset.path.is_relative() {
                dataset.path = base.join(&dataset.path);
            }
        }
        if let Some(labels) = self.labels.as_mut()
            && labels.path.is_relative()
        {
            labels.path = base.join(&labels.path);
        }
    }

    /// Schemas keyed by dataset name.
    #[must_use]
    pub fn schema_map(&self) -> SchemaMap {
        self.datasets
            .iter()
            .fold(SchemaMap::new(), |map, (name, dataset)| {
                map.with_source(name.clone(), dataset.schema.clone())
            })
    }

    /// Dataset names grouped by category, both in sorted order.
    #[must_use]
    pub fn datasets_by_category(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, dataset) in &self.datasets {
            grouped
                .entry(dataset.category.as_str())
                .or_default()
                .push(name.as_str());
        }
        grouped
    }
}
