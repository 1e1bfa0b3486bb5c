//! Error types emitted by the nuisance CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use nuisance_core::{ConfigError, FeatureConfigError, RunError, ShapeMismatchError, StoreError};
use nuisance_data::{
    CityConfigError, DatasetError, ExportError, LabelError, SyntheticError,
};
use nuisance_model::{ModelLoadError, ModelSaveError, SplitError, TrainError};
use thiserror::Error;

/// Errors emitted by the nuisance CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name.
        field: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },
    /// The requested operation requires a missing compile-time feature.
    #[error("{action} requires the `{feature}` feature to be enabled")]
    MissingFeature {
        /// Cargo feature name.
        feature: &'static str,
        /// Command that needs it.
        action: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Flag naming the path.
        field: &'static str,
        /// Missing path.
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        /// Flag naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected.
    #[error("failed to inspect {field} path {path:?}")]
    InspectSourcePath {
        /// Flag naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// The city configuration has no `labels` section to train from.
    #[error("city {city_name} has no labels configured for training")]
    MissingLabels {
        /// City being trained.
        city_name: String,
    },
    /// The model was trained on a different feature configuration.
    #[error("model {model_version} expects different features than the city configuration")]
    ModelSchemaMismatch {
        /// Version of the rejected model.
        model_version: String,
    },
    /// The city configuration could not be loaded.
    #[error(transparent)]
    City(#[from] CityConfigError),
    /// A dataset could not be read.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// Training examples could not be assembled.
    #[error(transparent)]
    Labels(#[from] LabelError),
    /// Feature settings were invalid.
    #[error(transparent)]
    Features(#[from] FeatureConfigError),
    /// Orchestrator settings were invalid.
    #[error(transparent)]
    Orchestrator(#[from] ConfigError),
    /// The train/test split was misconfigured.
    #[error(transparent)]
    Split(#[from] SplitError),
    /// Training failed.
    #[error("failed to train model")]
    Train(#[from] TrainError),
    /// Hold-out evaluation failed.
    #[error("failed to evaluate model")]
    Evaluate(#[from] ShapeMismatchError),
    /// The model artefact could not be written.
    #[error(transparent)]
    SaveModel(#[from] ModelSaveError),
    /// The model artefact could not be read.
    #[error(transparent)]
    LoadModel(#[from] ModelLoadError),
    /// The risk state store failed.
    #[error(transparent)]
    StateStore(#[from] StoreError),
    /// The scoring run failed.
    #[error("scoring run failed")]
    Run(#[from] RunError),
    /// Output files could not be written.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// The synthetic city could not be generated.
    #[error(transparent)]
    Synthetic(#[from] SyntheticError),
    /// A directory could not be created.
    #[error("failed to create directory for {path:?}")]
    CreateDirectory {
        /// Path whose directory was needed.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// Writing the evaluation report failed.
    #[error("failed to write evaluation report to {path:?}")]
    WriteEvaluation {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// Serializing command output failed.
    #[error("failed to serialize command output")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write command output")]
    WriteOutput(#[source] std::io::Error),
}
