//! Standardised logistic regression.
#![forbid(unsafe_code)]

use log::{debug, info};
use nuisance_core::model::dense_values;
use nuisance_core::{
    FeatureSchema, FeatureVector, LabelledExample, Probability, RiskModel, ShapeMismatchError,
    Trainer,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::count_as_f64;
use crate::error::{InvalidModelError, TrainError};

/// Default gradient-descent step size.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
/// Default number of full-batch iterations.
pub const DEFAULT_ITERATIONS: u32 = 500;
/// Default L2 penalty on the weights.
pub const DEFAULT_L2: f64 = 0.001;

const MIN_SCALE: f64 = 1e-12;
const VERSION_PREFIX: &str = "logistic-";
const VERSION_DIGEST_BYTES: usize = 6;

/// Hyperparameters for fitting a [`LogisticModel`].
///
/// Training is deterministic: weights start at zero and every iteration
/// visits the examples in input order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticTrainer {
    /// Gradient-descent step size; must be positive.
    pub learning_rate: f64,
    /// Number of full-batch iterations; must be positive.
    pub iterations: u32,
    /// L2 penalty on the weights; must be non-negative.
    pub l2: f64,
}

impl Default for LogisticTrainer {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            iterations: DEFAULT_ITERATIONS,
            l2: DEFAULT_L2,
        }
    }
}

impl LogisticTrainer {
    const fn validate(&self) -> Result<(), TrainError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::InvalidParameter {
                name: "learning_rate",
                value: self.learning_rate,
            });
        }
        if self.iterations == 0 {
            return Err(TrainError::InvalidParameter {
                name: "iterations",
                value: 0.0,
            });
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err(TrainError::InvalidParameter {
                name: "l2",
                value: self.l2,
            });
        }
        Ok(())
    }

    #[expect(
        clippy::float_arithmetic,
        reason = "gradient descent updates weights with floating-point maths"
    )]
    fn descend(&self, rows: &[Vec<f64>], labels: &[f64]) -> Result<(Vec<f64>, f64), TrainError> {
        let dims = rows.first().map_or(0, Vec::len);
        let count = count_as_f64(rows.len());
        let mut weights = vec![0.0; dims];
        let mut bias = 0.0;
        for iteration in 0..self.iterations {
            let mut gradient = vec![0.0; dims];
            let mut bias_gradient = 0.0;
            for (row, label) in rows.iter().zip(labels) {
                let residual = sigmoid(linear(&weights, bias, row)) - label;
                for (slot, value) in gradient.iter_mut().zip(row) {
                    *slot += residual * value;
                }
                bias_gradient += residual;
            }
            for (weight, slot) in weights.iter_mut().zip(&gradient) {
                *weight -= self.learning_rate * (slot / count + self.l2 * *weight);
            }
            bias -= self.learning_rate * bias_gradient / count;
            if !bias.is_finite() || weights.iter().any(|weight| !weight.is_finite()) {
                return Err(TrainError::Diverged { iteration });
            }
        }
        debug!("gradient descent finished after {} iterations", self.iterations);
        Ok((weights, bias))
    }
}

impl Trainer for LogisticTrainer {
    type Model = LogisticModel;
    type Error = TrainError;

    /// Fit a model whose schema is the first example's feature set.
    ///
    /// # Errors
    /// Returns [`TrainError`] for invalid hyperparameters, an empty or
    /// single-class dataset, examples whose features differ from the first
    /// example's, non-finite feature values, or diverging descent.
    fn train(&self, examples: &[LabelledExample]) -> Result<LogisticModel, TrainError> {
        self.validate()?;
        let first = examples.first().ok_or(TrainError::Empty)?;
        let schema = FeatureSchema::new(
            first
                .features
                .feature_names()
                .map(str::to_owned)
                .collect(),
        );

        let mut rows = Vec::with_capacity(examples.len());
        let mut positives = 0_usize;
        for (index, example) in examples.iter().enumerate() {
            let row = dense_values(&schema, &example.features)
                .map_err(|source| TrainError::InconsistentSchema { index, source })?;
            if let Some((feature, _)) = schema
                .names()
                .iter()
                .zip(&row)
                .find(|(_, value)| !value.is_finite())
            {
                return Err(TrainError::NonFiniteFeature {
                    index,
                    feature: feature.clone(),
                });
            }
            if example.outcome {
                positives += 1;
            }
            rows.push(row);
        }
        if positives == 0 || positives == examples.len() {
            return Err(TrainError::SingleClass {
                outcome: positives != 0,
            });
        }

        let (means, scales) = standardisation(&rows, schema.len());
        let standardised: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| standardise(row, &means, &scales))
            .collect();
        let labels: Vec<f64> = examples
            .iter()
            .map(|example| if example.outcome { 1.0 } else { 0.0 })
            .collect();
        let (weights, bias) = self.descend(&standardised, &labels)?;
        let model = LogisticModel::from_parts(schema, means, scales, weights, bias)?;
        info!(
            "trained {} on {} examples ({positives} positive)",
            model.version,
            examples.len()
        );
        Ok(model)
    }
}

/// Logistic regression over standardised features.
///
/// Scores are `sigmoid(bias + Σ weight · (x - mean) / scale)` with features
/// taken in schema order. The version string is derived from the schema and
/// parameters, so two models with equal versions score identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LogisticModelRepr", into = "LogisticModelRepr")]
pub struct LogisticModel {
    schema: FeatureSchema,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
    version: String,
}

#[derive(Serialize, Deserialize)]
struct LogisticModelRepr {
    schema: FeatureSchema,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
    version: String,
}

impl TryFrom<LogisticModelRepr> for LogisticModel {
    type Error = InvalidModelError;

    fn try_from(repr: LogisticModelRepr) -> Result<Self, Self::Error> {
        let model =
            Self::from_parts(repr.schema, repr.means, repr.scales, repr.weights, repr.bias)?;
        if model.version != repr.version {
            return Err(InvalidModelError::VersionMismatch {
                recorded: repr.version,
                computed: model.version,
            });
        }
        Ok(model)
    }
}

impl From<LogisticModel> for LogisticModelRepr {
    fn from(model: LogisticModel) -> Self {
        Self {
            schema: model.schema,
            means: model.means,
            scales: model.scales,
            weights: model.weights,
            bias: model.bias,
            version: model.version,
        }
    }
}

impl LogisticModel {
    /// Assemble a model from explicit parameters.
    ///
    /// # Errors
    /// Returns [`InvalidModelError`] when a parameter vector's length differs
    /// from the schema's, a parameter is not finite, or a scale is not
    /// positive.
    pub fn from_parts(
        schema: FeatureSchema,
        means: Vec<f64>,
        scales: Vec<f64>,
        weights: Vec<f64>,
        bias: f64,
    ) -> Result<Self, InvalidModelError> {
        for (parameter, values) in [("means", &means), ("scales", &scales), ("weights", &weights)]
        {
            if values.len() != schema.len() {
                return Err(InvalidModelError::LengthMismatch {
                    parameter,
                    found: values.len(),
                    expected: schema.len(),
                });
            }
            if values.iter().any(|value| !value.is_finite()) {
                return Err(InvalidModelError::NonFinite { parameter });
            }
        }
        if !bias.is_finite() {
            return Err(InvalidModelError::NonFinite { parameter: "bias" });
        }
        if let Some((feature, _)) = schema
            .names()
            .iter()
            .zip(&scales)
            .find(|(_, scale)| **scale <= 0.0)
        {
            return Err(InvalidModelError::NonPositiveScale {
                feature: feature.clone(),
            });
        }
        let version = model_version(&schema, &means, &scales, &weights, bias);
        Ok(Self {
            schema,
            means,
            scales,
            weights,
            bias,
            version,
        })
    }

    /// Intercept on the standardised scale.
    #[must_use]
    pub const fn bias(&self) -> f64 {
        self.bias
    }

    /// Feature weights on the standardised scale, in schema order.
    pub fn coefficients(&self) -> impl Iterator<Item = (&str, f64)> {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.weights.iter().copied())
    }
}

impl RiskModel for LogisticModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn model_version(&self) -> &str {
        &self.version
    }

    fn score(&self, features: &FeatureVector) -> Result<Probability, ShapeMismatchError> {
        let values = dense_values(&self.schema, features)?;
        let standardised = standardise(&values, &self.means, &self.scales);
        Ok(Probability::saturating(sigmoid(linear(
            &self.weights,
            self.bias,
            &standardised,
        ))))
    }
}

#[expect(
    clippy::float_arithmetic,
    reason = "population mean and standard deviation per feature"
)]
fn standardisation(rows: &[Vec<f64>], dims: usize) -> (Vec<f64>, Vec<f64>) {
    let count = count_as_f64(rows.len());
    let mut means = vec![0.0; dims];
    for row in rows {
        for (mean, value) in means.iter_mut().zip(row) {
            *mean += value;
        }
    }
    for mean in &mut means {
        *mean /= count;
    }
    let mut variances = vec![0.0; dims];
    for row in rows {
        for ((variance, value), mean) in variances.iter_mut().zip(row).zip(&means) {
            let centred = value - mean;
            *variance += centred * centred;
        }
    }
    let scales = variances
        .into_iter()
        .map(|variance| {
            let deviation = (variance / count).sqrt();
            if deviation > MIN_SCALE { deviation } else { 1.0 }
        })
        .collect();
    (means, scales)
}

#[expect(clippy::float_arithmetic, reason = "z-score standardisation")]
fn standardise(values: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(means)
        .zip(scales)
        .map(|((value, mean), scale)| (value - mean) / scale)
        .collect()
}

#[expect(clippy::float_arithmetic, reason = "dot product plus intercept")]
fn linear(weights: &[f64], bias: f64, values: &[f64]) -> f64 {
    weights
        .iter()
        .zip(values)
        .fold(bias, |acc, (weight, value)| acc + weight * value)
}

#[expect(
    clippy::float_arithmetic,
    reason = "logistic function evaluated in its numerically stable form"
)]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let exp = z.exp();
        exp / (1.0 + exp)
    }
}

/// `logistic-` followed by the first 12 hex digits of a SHA-256 over the
/// schema and parameters.
fn model_version(
    schema: &FeatureSchema,
    means: &[f64],
    scales: &[f64],
    weights: &[f64],
    bias: f64,
) -> String {
    let mut hasher = Sha256::new();
    for name in schema.names() {
        hasher.update(name.as_bytes());
        hasher.update([0_u8]);
    }
    for values in [means, scales, weights] {
        for value in values {
            hasher.update(format!("{value:?};").as_bytes());
        }
        hasher.update([0_u8]);
    }
    hasher.update(format!("{bias:?}").as_bytes());
    let digest = hasher.finalize();
    let prefix: Vec<u8> = digest.iter().take(VERSION_DIGEST_BYTES).copied().collect();
    format!("{VERSION_PREFIX}{}", hex::encode(prefix))
}
