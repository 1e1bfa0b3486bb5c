//! Reference risk model for the nuisance engine.
//!
//! The crate provides a standardised logistic regression behind the
//! [`RiskModel`](nuisance_core::RiskModel) and
//! [`Trainer`](nuisance_core::Trainer) traits, together with the tooling a
//! training run needs:
//! - **Training**: [`LogisticTrainer`] fits weights by deterministic
//!   full-batch gradient descent with L2 regularisation.
//! - **Evaluation**: [`split_train_test`] performs a seeded stratified split
//!   and [`evaluate`] reports confusion counts, accuracy, precision, recall,
//!   F1 and Brier score.
//! - **Persistence**: [`save_model`] and [`load_model`] write and read a
//!   `bincode` artefact prefixed with the `NRMD` magic and a format version.
//!
//! # Examples
//!
//! ```no_run
//! use camino::Utf8Path;
//! use nuisance_core::RiskModel;
//! use nuisance_model::load_model;
//!
//! let model = load_model(Utf8Path::new("artefacts/model.bin")).expect("load model");
//! println!("{} scores {} features", model.model_version(), model.schema().len());
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod evaluate;
mod logistic;
mod persist;

pub use error::{InvalidModelError, ModelLoadError, ModelSaveError, SplitError, TrainError};
pub use evaluate::{
    DEFAULT_DECISION_THRESHOLD, DEFAULT_SPLIT_SEED, DEFAULT_TEST_FRACTION, EvaluationReport,
    TrainTestSplit, evaluate, split_train_test,
};
pub use logistic::{
    DEFAULT_ITERATIONS, DEFAULT_L2, DEFAULT_LEARNING_RATE, LogisticModel, LogisticTrainer,
};
pub use persist::{MODEL_FORMAT_VERSION, MODEL_MAGIC, load_model, save_model};

#[expect(
    clippy::cast_precision_loss,
    reason = "example counts stay far below 2^52"
)]
pub(crate) const fn count_as_f64(count: usize) -> f64 {
    count as f64
}

#[cfg(test)]
mod tests;
