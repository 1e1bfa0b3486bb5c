//! Score command implementation for the nuisance CLI.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::info;
use nuisance_core::{
    CancellationToken, ChangeMonitor, Epoch, EpochRequest, FeatureBuilder, Orchestrator,
    RiskModel, ScoringEngine, ScoringInputs, StateStore,
};
use nuisance_data::{CityConfig, EpochSummary, ExportedFiles, FileRecordProvider, export_epoch};
use nuisance_model::load_model;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_ARTEFACTS_DIR, ARG_AS_OF, ARG_CITY, ARG_EPOCH, ARG_MODEL, ARG_OUTPUT_DIR, ARG_STATE_DB,
    ArtefactPaths, CliError, ENV_SCORE_CITY, ENV_SCORE_EPOCH, require_existing, write_json,
};

/// CLI arguments for the `score` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Score every property of a city for one epoch with a saved \
                 model. Risk state is committed to the SQLite state database \
                 and scores, high-risk properties, alerts and a summary are \
                 exported to the output directory.",
    about = "Score a city for one epoch"
)]
#[ortho_config(prefix = "NUISANCE")]
pub(crate) struct ScoreArgs {
    /// City configuration file (YAML).
    #[arg(long = ARG_CITY, value_name = "path")]
    #[serde(default)]
    pub(crate) city: Option<Utf8PathBuf>,
    /// Label of the scoring epoch, e.g. `2024-06`.
    #[arg(long = ARG_EPOCH, value_name = "label")]
    #[serde(default)]
    pub(crate) epoch: Option<String>,
    /// Reference time for feature windows (RFC 3339); defaults to now.
    #[arg(long = ARG_AS_OF, value_name = "timestamp")]
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
    /// Directory holding the default artefact filenames.
    #[arg(long = ARG_ARTEFACTS_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) artefacts_dir: Option<Utf8PathBuf>,
    /// Override the model artefact path (`model.bin`).
    #[arg(long = ARG_MODEL, value_name = "path")]
    #[serde(default)]
    pub(crate) model: Option<Utf8PathBuf>,
    /// Override the risk state database path (`state.db`).
    #[arg(long = ARG_STATE_DB, value_name = "path")]
    #[serde(default)]
    pub(crate) state_db: Option<Utf8PathBuf>,
    /// Override the export directory (`output`).
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
}

impl ScoreArgs {
    pub(crate) fn into_config(self) -> Result<ScoreConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ScoreConfig::try_from(merged)
    }
}

/// Resolved `score` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScoreConfig {
    /// City configuration file.
    pub(crate) city: Utf8PathBuf,
    /// Epoch being scored.
    pub(crate) epoch: Epoch,
    /// Reference time for feature windows.
    pub(crate) as_of: DateTime<Utc>,
    /// Saved model.
    pub(crate) model_path: Utf8PathBuf,
    /// SQLite risk state.
    pub(crate) state_db: Utf8PathBuf,
    /// Export directory.
    pub(crate) output_dir: Utf8PathBuf,
}

impl ScoreConfig {
    pub(crate) fn from_parts(
        city: Utf8PathBuf,
        epoch: String,
        as_of: Option<DateTime<Utc>>,
        paths: ArtefactPaths,
    ) -> Self {
        Self {
            city,
            epoch: Epoch::new(epoch),
            as_of: as_of.unwrap_or_else(Utc::now),
            model_path: paths.model,
            state_db: paths.state_db,
            output_dir: paths.output_dir,
        }
    }

    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.city, ARG_CITY)?;
        require_existing(&self.model_path, ARG_MODEL)
    }
}

impl TryFrom<ScoreArgs> for ScoreConfig {
    type Error = CliError;

    fn try_from(args: ScoreArgs) -> Result<Self, Self::Error> {
        let city = args.city.ok_or(CliError::MissingArgument {
            field: ARG_CITY,
            env: ENV_SCORE_CITY,
        })?;
        let epoch = args.epoch.ok_or(CliError::MissingArgument {
            field: ARG_EPOCH,
            env: ENV_SCORE_EPOCH,
        })?;
        let paths =
            ArtefactPaths::resolve(args.artefacts_dir, args.model, args.state_db, args.output_dir);
        Ok(Self::from_parts(city, epoch, args.as_of, paths))
    }
}

/// What a scoring run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ScoreOutcome {
    /// Category counts and run report.
    pub(crate) summary: EpochSummary,
    /// Exported files.
    pub(crate) files: ExportedFiles,
}

pub(crate) fn run_score(args: ScoreArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let city = CityConfig::load(&config.city)?;
    let model = load_model(&config.model_path)?;
    let outcome = score_with_model(&city, &model, &config)?;
    write_json(writer, &outcome)
}

/// Score every property of `city` with `model` and export the results.
pub(crate) fn score_with_model(
    city: &CityConfig,
    model: &dyn RiskModel,
    config: &ScoreConfig,
) -> Result<ScoreOutcome, CliError> {
    let provider = FileRecordProvider::from_config(city)?;
    let features = FeatureBuilder::new(city.features.clone())?;
    if !features.schema().same_features(model.schema()) {
        return Err(CliError::ModelSchemaMismatch {
            model_version: model.model_version().to_owned(),
        });
    }
    let schema_map = city.schema_map();
    let monitor = ChangeMonitor::new(city.monitor);
    let inputs = ScoringInputs {
        provider: &provider,
        schema_map: &schema_map,
        features: &features,
        model,
        thresholds: &city.thresholds,
        monitor: &monitor,
    };
    let request = EpochRequest {
        epoch: config.epoch.clone(),
        as_of: config.as_of,
        property_ids: provider.property_ids(),
    };
    let engine = ScoringEngine::new(Orchestrator::new(city.orchestrator)?);
    let mut store = open_state_store(&config.state_db)?;
    let outcome =
        engine.run_and_commit(&mut *store, &request, &inputs, &CancellationToken::new())?;
    info!(
        "scored {} of {} properties for {} ({} alerts)",
        outcome.report.scored,
        outcome.report.attempted,
        config.epoch,
        outcome.alerts.len()
    );

    let files = export_epoch(&config.output_dir, &city.city_name, &outcome, &city.thresholds)?;
    Ok(ScoreOutcome {
        summary: EpochSummary::new(&city.city_name, &outcome, &city.thresholds),
        files,
    })
}

#[cfg(feature = "store-sqlite")]
fn open_state_store(path: &Utf8Path) -> Result<Box<dyn StateStore>, CliError> {
    nuisance_fs::ensure_parent_dir(path).map_err(|source| CliError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })?;
    let store = nuisance_core::SqliteStateStore::open(path)?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "store-sqlite"))]
fn open_state_store(path: &Utf8Path) -> Result<Box<dyn StateStore>, CliError> {
    let _ = path;
    Err(CliError::MissingFeature {
        feature: "store-sqlite",
        action: "score",
    })
}
