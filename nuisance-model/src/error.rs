//! Error types raised while training, persisting and loading models.
#![forbid(unsafe_code)]

use camino::Utf8PathBuf;
use nuisance_core::ShapeMismatchError;
use thiserror::Error;

/// Errors raised while fitting a logistic model.
#[derive(Debug, Error)]
pub enum TrainError {
    /// No labelled examples were supplied.
    #[error("cannot train on an empty dataset")]
    Empty,
    /// Every example carried the same outcome.
    #[error("cannot train on a single-class dataset (every outcome is {outcome})")]
    SingleClass {
        /// The only outcome present.
        outcome: bool,
    },
    /// An example's features differ from the first example's.
    #[error("example {index} does not match the training schema")]
    InconsistentSchema {
        /// Position of the offending example.
        index: usize,
        /// Mismatch details.
        #[source]
        source: ShapeMismatchError,
    },
    /// A feature value was NaN or infinite.
    #[error("example {index} has a non-finite value for {feature}")]
    NonFiniteFeature {
        /// Position of the offending example.
        index: usize,
        /// Feature name.
        feature: String,
    },
    /// A hyperparameter was outside its valid range.
    #[error("invalid {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Gradient descent diverged.
    #[error("training diverged after {iteration} iterations")]
    Diverged {
        /// Iteration at which a parameter became non-finite.
        iteration: u32,
    },
    /// The fitted parameters could not form a model.
    #[error(transparent)]
    InvalidModel(#[from] InvalidModelError),
}

/// Error raised when a train/test split is requested with a bad fraction.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("test fraction must be within (0, 1), found {value}")]
pub struct SplitError {
    /// Rejected fraction.
    pub value: f64,
}

/// Errors raised while writing a model artefact.
#[derive(Debug, Error)]
pub enum ModelSaveError {
    /// Serialising the model to `bincode` failed.
    #[error("failed to serialise model for {path}")]
    Serialise {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// Writing the artefact failed.
    #[error("failed to write model file at {path}")]
    WriteFile {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while reading a model artefact.
///
/// Every variant is fatal for a scoring run: without a model nothing can be
/// scored.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// The artefact could not be opened.
    #[error("failed to open model file at {path}")]
    Open {
        /// Requested file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// The file does not start with the model magic bytes.
    #[error("{path} is not a model artefact")]
    BadMagic {
        /// Requested file path.
        path: Utf8PathBuf,
    },
    /// The artefact was written by an incompatible format version.
    #[error("model file {path} has format version {found}, expected {supported}")]
    UnsupportedVersion {
        /// Requested file path.
        path: Utf8PathBuf,
        /// Version recorded in the file.
        found: u16,
        /// Version this build reads.
        supported: u16,
    },
    /// Decoding the model parameters failed or they were inconsistent.
    #[error("model file {path} is corrupt")]
    Decode {
        /// Requested file path.
        path: Utf8PathBuf,
        /// Source error from `bincode`.
        #[source]
        source: bincode::Error,
    },
}

/// Reasons a set of logistic parameters cannot form a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidModelError {
    /// A parameter vector's length differs from the schema's.
    #[error("{parameter} has {found} entries but the schema has {expected} features")]
    LengthMismatch {
        /// Parameter vector name.
        parameter: &'static str,
        /// Entries found.
        found: usize,
        /// Schema length.
        expected: usize,
    },
    /// A parameter was NaN or infinite.
    #[error("{parameter} contains a non-finite value")]
    NonFinite {
        /// Parameter vector name.
        parameter: &'static str,
    },
    /// A standardisation scale was zero or negative.
    #[error("scale for {feature} must be positive")]
    NonPositiveScale {
        /// Feature name.
        feature: String,
    },
    /// The recorded version does not match the parameters.
    #[error("recorded version {recorded} does not match parameters ({computed})")]
    VersionMismatch {
        /// Version stored alongside the parameters.
        recorded: String,
        /// Version recomputed from the parameters.
        computed: String,
    },
}
