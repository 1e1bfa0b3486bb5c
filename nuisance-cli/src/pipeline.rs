//! Pipeline command: train a model, then score a city with it.

use std::io::Write;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use clap::Parser;
use nuisance_data::CityConfig;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::score::{ScoreConfig, ScoreOutcome, score_with_model};
use crate::train::{TrainConfig, TrainOutcome, train_model};
use crate::{
    ARG_ARTEFACTS_DIR, ARG_AS_OF, ARG_CITY, ARG_EPOCH, ARG_ITERATIONS, ARG_L2, ARG_LEARNING_RATE,
    ARG_MODEL, ARG_OUTPUT_DIR, ARG_SEED, ARG_STATE_DB, ARG_TEST_FRACTION, ArtefactPaths, CliError,
    ENV_PIPELINE_CITY, ENV_PIPELINE_EPOCH, write_json,
};

/// CLI arguments for the `pipeline` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Train a model from the city's labelled history and score \
                 every property for one epoch with it. Accepts the options \
                 of both `train` and `score`.",
    about = "Train a model and score a city with it"
)]
#[ortho_config(prefix = "NUISANCE")]
pub(crate) struct PipelineArgs {
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
    /// Seed for the train/test split.
    #[arg(long = ARG_SEED, value_name = "n")]
    #[serde(default)]
    pub(crate) seed: Option<u64>,
    /// Share of each outcome class held out for evaluation.
    #[arg(long = ARG_TEST_FRACTION, value_name = "fraction")]
    #[serde(default)]
    pub(crate) test_fraction: Option<f64>,
    /// Gradient-descent step size.
    #[arg(long = ARG_LEARNING_RATE, value_name = "rate")]
    #[serde(default)]
    pub(crate) learning_rate: Option<f64>,
    /// Full-batch gradient-descent iterations.
    #[arg(long = ARG_ITERATIONS, value_name = "n")]
    #[serde(default)]
    pub(crate) iterations: Option<u32>,
    /// L2 penalty on the weights.
    #[arg(long = ARG_L2, value_name = "penalty")]
    #[serde(default)]
    pub(crate) l2: Option<f64>,
}

impl PipelineArgs {
    pub(crate) fn into_config(self) -> Result<PipelineConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        PipelineConfig::try_from(merged)
    }
}

/// Resolved `pipeline` configuration: one half per stage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PipelineConfig {
    pub(crate) train: TrainConfig,
    pub(crate) score: ScoreConfig,
}

impl TryFrom<PipelineArgs> for PipelineConfig {
    type Error = CliError;

    fn try_from(args: PipelineArgs) -> Result<Self, Self::Error> {
        let city = args.city.ok_or(CliError::MissingArgument {
            field: ARG_CITY,
            env: ENV_PIPELINE_CITY,
        })?;
        let epoch = args.epoch.ok_or(CliError::MissingArgument {
            field: ARG_EPOCH,
            env: ENV_PIPELINE_EPOCH,
        })?;
        let paths =
            ArtefactPaths::resolve(args.artefacts_dir, args.model, args.state_db, args.output_dir);
        let train = TrainConfig::from_parts(
            city.clone(),
            &paths,
            args.seed,
            args.test_fraction,
            (args.learning_rate, args.iterations, args.l2),
        );
        let score = ScoreConfig::from_parts(city, epoch, args.as_of, paths);
        Ok(Self { train, score })
    }
}

/// Both stage outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PipelineOutcome {
    pub(crate) training: TrainOutcome,
    pub(crate) scoring: ScoreOutcome,
}

pub(crate) fn run_pipeline(args: PipelineArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.train.validate_sources()?;
    let outcome = execute_pipeline(&config)?;
    write_json(writer, &outcome)
}

/// Train, then score with the freshly trained model.
pub(crate) fn execute_pipeline(config: &PipelineConfig) -> Result<PipelineOutcome, CliError> {
    let (model, training) = train_model(&config.train)?;
    let city = CityConfig::load(&config.score.city)?;
    let scoring = score_with_model(&city, &model, &config.score)?;
    Ok(PipelineOutcome { training, scoring })
}
