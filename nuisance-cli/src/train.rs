//! Train command implementation for the nuisance CLI.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use nuisance_core::{Epoch, FeatureBuilder, RiskModel, Trainer};
use nuisance_data::{
    CityConfig, FileRecordProvider, TrainingWindow, build_training_examples, load_labels,
};
use nuisance_model::{
    DEFAULT_DECISION_THRESHOLD, DEFAULT_SPLIT_SEED, DEFAULT_TEST_FRACTION, EvaluationReport,
    LogisticModel, LogisticTrainer, evaluate, save_model, split_train_test,
};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_ARTEFACTS_DIR, ARG_CITY, ARG_ITERATIONS, ARG_L2, ARG_LEARNING_RATE, ARG_MODEL, ARG_SEED,
    ARG_TEST_FRACTION, ArtefactPaths, CliError, ENV_TRAIN_CITY, require_existing, write_json,
};

/// Epoch label attached to training vectors when the city names none.
pub(crate) const DEFAULT_TRAINING_EPOCH: &str = "training";

/// CLI arguments for the `train` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Build feature vectors for every labelled property of a city, \
                 hold out a stratified share for evaluation, fit a logistic \
                 model on the rest and save it with its evaluation report.",
    about = "Train a nuisance risk model"
)]
#[ortho_config(prefix = "NUISANCE")]
pub(crate) struct TrainArgs {
    /// City configuration file (YAML).
    #[arg(long = ARG_CITY, value_name = "path")]
    #[serde(default)]
    pub(crate) city: Option<Utf8PathBuf>,
    /// Directory holding the default artefact filenames.
    #[arg(long = ARG_ARTEFACTS_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) artefacts_dir: Option<Utf8PathBuf>,
    /// Override the model artefact path (`model.bin`).
    #[arg(long = ARG_MODEL, value_name = "path")]
    #[serde(default)]
    pub(crate) model: Option<Utf8PathBuf>,
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

impl TrainArgs {
    pub(crate) fn into_config(self) -> Result<TrainConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        TrainConfig::try_from(merged)
    }
}

/// Resolved `train` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrainConfig {
    /// City configuration file.
    pub(crate) city: Utf8PathBuf,
    /// Where the model is saved.
    pub(crate) model_path: Utf8PathBuf,
    /// Where the evaluation report is saved.
    pub(crate) evaluation_path: Utf8PathBuf,
    /// Hyperparameters.
    pub(crate) trainer: LogisticTrainer,
    /// Hold-out share.
    pub(crate) test_fraction: f64,
    /// Split seed.
    pub(crate) seed: u64,
}

impl TrainConfig {
    /// Assemble a configuration from its parts, filling defaults.
    pub(crate) fn from_parts(
        city: Utf8PathBuf,
        paths: &ArtefactPaths,
        seed: Option<u64>,
        test_fraction: Option<f64>,
        hyperparameters: (Option<f64>, Option<u32>, Option<f64>),
    ) -> Self {
        let defaults = LogisticTrainer::default();
        let (learning_rate, iterations, l2) = hyperparameters;
        Self {
            city,
            model_path: paths.model.clone(),
            evaluation_path: paths.evaluation.clone(),
            trainer: LogisticTrainer {
                learning_rate: learning_rate.unwrap_or(defaults.learning_rate),
                iterations: iterations.unwrap_or(defaults.iterations),
                l2: l2.unwrap_or(defaults.l2),
            },
            test_fraction: test_fraction.unwrap_or(DEFAULT_TEST_FRACTION),
            seed: seed.unwrap_or(DEFAULT_SPLIT_SEED),
        }
    }

    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.city, ARG_CITY)
    }
}

impl TryFrom<TrainArgs> for TrainConfig {
    type Error = CliError;

    fn try_from(args: TrainArgs) -> Result<Self, Self::Error> {
        let city = args.city.ok_or(CliError::MissingArgument {
            field: ARG_CITY,
            env: ENV_TRAIN_CITY,
        })?;
        let paths = ArtefactPaths::resolve(args.artefacts_dir, args.model, None, None);
        Ok(Self::from_parts(
            city,
            &paths,
            args.seed,
            args.test_fraction,
            (args.learning_rate, args.iterations, args.l2),
        ))
    }
}

/// What a training run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TrainOutcome {
    /// City the model was trained for.
    pub(crate) city_name: String,
    /// Saved model artefact.
    pub(crate) model_path: Utf8PathBuf,
    /// Version recorded on every score the model produces.
    pub(crate) model_version: String,
    /// Examples used for fitting.
    pub(crate) train_examples: usize,
    /// Examples held out for evaluation.
    pub(crate) test_examples: usize,
    /// Hold-out metrics.
    pub(crate) evaluation: EvaluationReport,
}

pub(crate) fn run_train(args: TrainArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let (_, outcome) = train_model(&config)?;
    write_json(writer, &outcome)
}

/// Train, evaluate and save a model as `config` describes.
pub(crate) fn train_model(
    config: &TrainConfig,
) -> Result<(LogisticModel, TrainOutcome), CliError> {
    let city = CityConfig::load(&config.city)?;
    let labels_config = city.labels.clone().ok_or_else(|| CliError::MissingLabels {
        city_name: city.city_name.clone(),
    })?;
    let labels = load_labels(&labels_config.path)?;
    let provider = FileRecordProvider::from_config(&city)?;
    let builder = FeatureBuilder::new(city.features.clone())?;
    let epoch = Epoch::new(
        labels_config
            .epoch
            .unwrap_or_else(|| DEFAULT_TRAINING_EPOCH.to_owned()),
    );
    let examples = build_training_examples(
        &labels,
        &provider,
        &city.schema_map(),
        &builder,
        TrainingWindow {
            epoch: &epoch,
            as_of: labels_config.as_of,
            lookback_days: city.orchestrator.lookback_days,
        },
    )?;

    let split = split_train_test(&examples, config.test_fraction, config.seed)?;
    let model = config.trainer.train(&split.train)?;
    let evaluation = evaluate(&model, &split.test, DEFAULT_DECISION_THRESHOLD)?;
    save_model(&model, &config.model_path)?;
    write_evaluation(&config.evaluation_path, &evaluation)?;
    info!(
        "trained {} on {} examples; hold-out accuracy {:.3} over {} examples",
        model.model_version(),
        split.train.len(),
        evaluation.accuracy,
        split.test.len()
    );

    let outcome = TrainOutcome {
        city_name: city.city_name,
        model_path: config.model_path.clone(),
        model_version: model.model_version().to_owned(),
        train_examples: split.train.len(),
        test_examples: split.test.len(),
        evaluation,
    };
    Ok((model, outcome))
}

fn write_evaluation(path: &Utf8Path, report: &EvaluationReport) -> Result<(), CliError> {
    let bytes = serde_json::to_vec_pretty(report).map_err(CliError::SerializeOutput)?;
    nuisance_fs::write_atomic(path, &bytes).map_err(|source| CliError::WriteEvaluation {
        path: path.to_path_buf(),
        source,
    })
}

