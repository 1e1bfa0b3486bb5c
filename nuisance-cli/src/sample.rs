//! Sample command: write a seeded synthetic city to disk.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use nuisance_data::{SyntheticConfig, write_synthetic_city};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_AS_OF, ARG_CITY_NAME, ARG_MEAN_COMPLAINTS, ARG_OUTPUT_DIR, ARG_PROPERTIES, ARG_SEED,
    ARG_SPAN_DAYS, CliError, ENV_SAMPLE_OUTPUT_DIR, write_json,
};

/// CLI arguments for the `sample` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Generate a synthetic city with complaint, parcel, permit \
                 and enforcement datasets plus outcome labels, and write it \
                 with a ready-to-use city.yaml. The same seed always yields \
                 the same files.",
    about = "Write a synthetic city"
)]
#[ortho_config(prefix = "NUISANCE")]
pub(crate) struct SampleArgs {
    /// Directory receiving the datasets and `city.yaml`.
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Number of properties to generate.
    #[arg(long = ARG_PROPERTIES, value_name = "n")]
    #[serde(default)]
    pub(crate) properties: Option<usize>,
    /// Random seed.
    #[arg(long = ARG_SEED, value_name = "n")]
    #[serde(default)]
    pub(crate) seed: Option<u64>,
    /// Mean complaints per property over the whole span.
    #[arg(long = ARG_MEAN_COMPLAINTS, value_name = "mean")]
    #[serde(default)]
    pub(crate) mean_complaints: Option<f64>,
    /// Days of history to generate.
    #[arg(long = ARG_SPAN_DAYS, value_name = "days")]
    #[serde(default)]
    pub(crate) span_days: Option<u32>,
    /// Last instant of generated history (RFC 3339).
    #[arg(long = ARG_AS_OF, value_name = "timestamp")]
    #[serde(default)]
    pub(crate) as_of: Option<chrono::DateTime<chrono::Utc>>,
    /// Name recorded in the city configuration.
    #[arg(long = ARG_CITY_NAME, value_name = "name")]
    #[serde(default)]
    pub(crate) city_name: Option<String>,
}

impl SampleArgs {
    pub(crate) fn into_config(self) -> Result<SampleConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SampleConfig::try_from(merged)
    }
}

/// Resolved `sample` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SampleConfig {
    pub(crate) output_dir: Utf8PathBuf,
    pub(crate) synthetic: SyntheticConfig,
}

impl TryFrom<SampleArgs> for SampleConfig {
    type Error = CliError;

    fn try_from(args: SampleArgs) -> Result<Self, Self::Error> {
        let output_dir = args.output_dir.ok_or(CliError::MissingArgument {
            field: ARG_OUTPUT_DIR,
            env: ENV_SAMPLE_OUTPUT_DIR,
        })?;
        let defaults = SyntheticConfig::default();
        let synthetic = SyntheticConfig {
            city_name: args.city_name.unwrap_or(defaults.city_name),
            seed: args.seed.unwrap_or(defaults.seed),
            properties: args.properties.unwrap_or(defaults.properties),
            mean_complaints: args.mean_complaints.unwrap_or(defaults.mean_complaints),
            span_days: args.span_days.unwrap_or(defaults.span_days),
            as_of: args.as_of.unwrap_or(defaults.as_of),
        };
        Ok(Self {
            output_dir,
            synthetic,
        })
    }
}

/// Where the synthetic city landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SampleOutcome {
    pub(crate) city_config: Utf8PathBuf,
    pub(crate) properties: usize,
}

pub(crate) fn run_sample(args: SampleArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let outcome = write_sample(&config)?;
    write_json(writer, &outcome)
}

pub(crate) fn write_sample(config: &SampleConfig) -> Result<SampleOutcome, CliError> {
    let city_config = write_synthetic_city(&config.output_dir, &config.synthetic)?;
    info!(
        "wrote {} synthetic properties to {}",
        config.synthetic.properties, config.output_dir
    );
    Ok(SampleOutcome {
        city_config,
        properties: config.synthetic.properties,
    })
}
