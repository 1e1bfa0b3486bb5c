//! Command-line interface for the nuisance risk engine.
//!
//! Subcommands:
//! - `train`: build labelled examples for a city, fit the logistic model,
//!   evaluate it on a seeded hold-out set and save the artefact.
//! - `score`: run one scoring epoch with a saved model, commit the risk
//!   state and export scores, alerts and a summary.
//! - `pipeline`: `train` followed by `score` with the freshly trained model.
//! - `sample`: write a seeded synthetic city for development.
//!
//! Options come from CLI flags, configuration files and `NUISANCE_*`
//! environment variables, merged by `ortho_config`.
#![forbid(unsafe_code)]

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use serde::Serialize;

mod error;
mod pipeline;
mod sample;
mod score;
mod train;

pub use error::CliError;

use pipeline::PipelineArgs;
use sample::SampleArgs;
use score::ScoreArgs;
use train::TrainArgs;

pub(crate) const ARG_CITY: &str = "city";
pub(crate) const ARG_ARTEFACTS_DIR: &str = "artefacts-dir";
pub(crate) const ARG_MODEL: &str = "model";
pub(crate) const ARG_STATE_DB: &str = "state-db";
pub(crate) const ARG_OUTPUT_DIR: &str = "output-dir";
pub(crate) const ARG_EPOCH: &str = "epoch";
pub(crate) const ARG_AS_OF: &str = "as-of";
pub(crate) const ARG_SEED: &str = "seed";
pub(crate) const ARG_TEST_FRACTION: &str = "test-fraction";
pub(crate) const ARG_LEARNING_RATE: &str = "learning-rate";
pub(crate) const ARG_ITERATIONS: &str = "iterations";
pub(crate) const ARG_L2: &str = "l2";
pub(crate) const ARG_PROPERTIES: &str = "properties";
pub(crate) const ARG_MEAN_COMPLAINTS: &str = "mean-complaints";
pub(crate) const ARG_SPAN_DAYS: &str = "span-days";
pub(crate) const ARG_CITY_NAME: &str = "city-name";
pub(crate) const ENV_TRAIN_CITY: &str = "NUISANCE_CMDS_TRAIN_CITY";
pub(crate) const ENV_SCORE_CITY: &str = "NUISANCE_CMDS_SCORE_CITY";
pub(crate) const ENV_SCORE_EPOCH: &str = "NUISANCE_CMDS_SCORE_EPOCH";
pub(crate) const ENV_PIPELINE_CITY: &str = "NUISANCE_CMDS_PIPELINE_CITY";
pub(crate) const ENV_PIPELINE_EPOCH: &str = "NUISANCE_CMDS_PIPELINE_EPOCH";
pub(crate) const ENV_SAMPLE_OUTPUT_DIR: &str = "NUISANCE_CMDS_SAMPLE_OUTPUT_DIR";

const DEFAULT_ARTEFACTS_DIR: &str = "artefacts";

/// Run the nuisance CLI with the current process arguments and environment.
///
/// Command output is written to stdout as pretty-printed JSON.
///
/// # Errors
/// Returns [`CliError`] when argument parsing, configuration or the command
/// itself fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    dispatch(cli.command, &mut stdout)
}

fn dispatch(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Train(args) => train::run_train(args, writer),
        Command::Score(args) => score::run_score(args, writer),
        Command::Pipeline(args) => pipeline::run_pipeline(args, writer),
        Command::Sample(args) => sample::run_sample(args, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "nuisance",
    about = "Score short-term-rental properties for nuisance risk",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train and evaluate a model from a city's labelled history.
    Train(TrainArgs),
    /// Score every property of a city for one epoch.
    Score(ScoreArgs),
    /// Train a model, then score with it.
    Pipeline(PipelineArgs),
    /// Write a synthetic city for development.
    Sample(SampleArgs),
}

/// Files a command reads and writes beneath the artefacts directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArtefactPaths {
    /// Saved model.
    pub(crate) model: Utf8PathBuf,
    /// Hold-out evaluation report.
    pub(crate) evaluation: Utf8PathBuf,
    /// SQLite risk state.
    pub(crate) state_db: Utf8PathBuf,
    /// Exported scores, alerts and summaries.
    pub(crate) output_dir: Utf8PathBuf,
}

impl ArtefactPaths {
    /// Derive default paths from `artefacts_dir`, keeping explicit overrides.
    pub(crate) fn resolve(
        artefacts_dir: Option<Utf8PathBuf>,
        model: Option<Utf8PathBuf>,
        state_db: Option<Utf8PathBuf>,
        output_dir: Option<Utf8PathBuf>,
    ) -> Self {
        let dir = artefacts_dir.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ARTEFACTS_DIR));
        Self {
            model: model.unwrap_or_else(|| dir.join("model.bin")),
            evaluation: dir.join("evaluation.json"),
            state_db: state_db.unwrap_or_else(|| dir.join("state.db")),
            output_dir: output_dir.unwrap_or_else(|| dir.join("output")),
        }
    }
}

/// Check that `path` names an existing regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match nuisance_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) if path.exists() => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Ok(false) => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write `value` as pretty-printed JSON followed by a newline.
pub(crate) fn write_json<T: Serialize>(writer: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerializeOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
mod tests;
