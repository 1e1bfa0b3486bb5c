//! Risk model capability set.
//!
//! A [`RiskModel`] maps a [`FeatureVector`] to a [`Probability`]. Models are
//! shared across scoring threads, so implementations must be `Send + Sync`
//! and deterministic. A [`Trainer`] fits a model from labelled history.

use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Epoch, FeatureSchema, FeatureVector, PropertyId, RiskCategory};

/// A finite probability in `[0, 1]`.
///
/// # Examples
/// ```
/// use nuisance_core::Probability;
///
/// assert!(Probability::new(1.2).is_none());
/// assert_eq!(Probability::saturating(1.2).get(), 1.0);
/// assert_eq!(Probability::saturating(f64::NAN).get(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "f64", into = "f64")
)]
pub struct Probability(f64);

impl Probability {
    /// Wrap `value` when it is finite and within `[0, 1]`.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(Self(value))
    }

    /// Clamp `value` into `[0, 1]`, mapping NaN to `0`.
    #[must_use]
    pub const fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Underlying value.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Probability {
    type Error = ProbabilityRangeError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ProbabilityRangeError { value })
    }
}

impl From<Probability> for f64 {
    fn from(probability: Probability) -> Self {
        probability.0
    }
}

/// Error raised when a value is not a valid [`Probability`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("probability must be finite and within [0, 1], found {value}")]
pub struct ProbabilityRangeError {
    /// Rejected value.
    pub value: f64,
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Score for one property in one epoch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreResult {
    /// Scored property.
    pub property_id: PropertyId,
    /// Scoring period.
    pub epoch: Epoch,
    /// Model output.
    pub probability: Probability,
    /// Category assigned by the thresholds.
    pub category: RiskCategory,
    /// Version of the model that produced the score.
    pub model_version: String,
}

/// Feature vector paired with the outcome observed afterwards.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelledExample {
    /// Model input.
    pub features: FeatureVector,
    /// Whether the property went on to cause a nuisance.
    pub outcome: bool,
}

impl LabelledExample {
    /// Pair a vector with its outcome.
    #[must_use]
    pub const fn new(features: FeatureVector, outcome: bool) -> Self {
        Self { features, outcome }
    }
}

/// Error raised when a vector's features differ from a model's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "feature vector for {property_id} does not match schema: missing {missing:?}, unexpected {unexpected:?}"
)]
pub struct ShapeMismatchError {
    /// Property whose vector was rejected.
    pub property_id: PropertyId,
    /// Schema features absent from the vector.
    pub missing: Vec<String>,
    /// Vector features absent from the schema.
    pub unexpected: Vec<String>,
}

impl ShapeMismatchError {
    /// Compare a vector's keys with `schema`.
    ///
    /// # Errors
    /// Returns the mismatch when the key sets differ.
    pub fn check(schema: &FeatureSchema, vector: &FeatureVector) -> Result<(), Self> {
        let expected: BTreeSet<&str> = schema.names().iter().map(String::as_str).collect();
        let actual: BTreeSet<&str> = vector.feature_names().collect();
        if expected == actual {
            return Ok(());
        }
        Err(Self {
            property_id: vector.property_id.clone(),
            missing: expected
                .difference(&actual)
                .map(|name| (*name).to_owned())
                .collect(),
            unexpected: actual
                .difference(&expected)
                .map(|name| (*name).to_owned())
                .collect(),
        })
    }
}

/// Order a vector's values by `schema`.
///
/// # Errors
/// Returns [`ShapeMismatchError`] when the vector's keys differ from the
/// schema.
pub fn dense_values(
    schema: &FeatureSchema,
    vector: &FeatureVector,
) -> Result<Vec<f64>, ShapeMismatchError> {
    ShapeMismatchError::check(schema, vector)?;
    Ok(schema
        .names()
        .iter()
        .filter_map(|name| vector.get(name))
        .collect())
}

/// Map feature vectors to risk probabilities.
///
/// Implementations must be deterministic: scoring the same vector twice
/// yields the same probability.
///
/// # Examples
/// ```
/// use nuisance_core::{FeatureSchema, FeatureVector, Probability, RiskModel, ShapeMismatchError};
///
/// struct Constant(FeatureSchema);
///
/// impl RiskModel for Constant {
///     fn schema(&self) -> &FeatureSchema {
///         &self.0
///     }
///
///     fn model_version(&self) -> &str {
///         "constant-1"
///     }
///
///     fn score(&self, features: &FeatureVector) -> Result<Probability, ShapeMismatchError> {
///         ShapeMismatchError::check(&self.0, features)?;
///         Ok(Probability::saturating(0.5))
///     }
/// }
/// ```
pub trait RiskModel: Send + Sync {
    /// Features the model expects, in order.
    fn schema(&self) -> &FeatureSchema;

    /// Identifier recorded on every [`ScoreResult`].
    fn model_version(&self) -> &str;

    /// Score a single vector.
    ///
    /// # Errors
    /// Returns [`ShapeMismatchError`] when `features` does not match
    /// [`RiskModel::schema`].
    fn score(&self, features: &FeatureVector) -> Result<Probability, ShapeMismatchError>;
}

impl<M: RiskModel + ?Sized> RiskModel for Box<M> {
    fn schema(&self) -> &FeatureSchema {
        (**self).schema()
    }

    fn model_version(&self) -> &str {
        (**self).model_version()
    }

    fn score(&self, features: &FeatureVector) -> Result<Probability, ShapeMismatchError> {
        (**self).score(features)
    }
}

/// Fit a [`RiskModel`] from labelled history.
pub trait Trainer {
    /// Model produced by training.
    type Model: RiskModel;
    /// Error raised when the data cannot be fitted.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fit a model.
    ///
    /// # Errors
    /// Returns [`Trainer::Error`] when the examples are unusable, for
    /// instance empty, single-class or of inconsistent shape.
    fn train(&self, examples: &[LabelledExample]) -> Result<Self::Model, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rstest::rstest;

    fn vector(names: &[&str]) -> FeatureVector {
        FeatureVector {
            property_id: PropertyId::from("P1"),
            epoch: Epoch::from("2024-06"),
            values: names
                .iter()
                .map(|name| ((*name).to_owned(), 1.0))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().map(|name| (*name).to_owned()).collect())
    }

    #[rstest]
    #[case(0.0, true)]
    #[case(1.0, true)]
    #[case(-0.01, false)]
    #[case(f64::INFINITY, false)]
    #[case(f64::NAN, false)]
    fn validates_probabilities(#[case] value: f64, #[case] valid: bool) {
        assert_eq!(Probability::new(value).is_some(), valid);
    }

    #[rstest]
    #[case(-3.0, 0.0)]
    #[case(0.25, 0.25)]
    #[case(f64::INFINITY, 1.0)]
    fn saturates_probabilities(#[case] value: f64, #[case] expected: f64) {
        assert_eq!(Probability::saturating(value).get(), expected);
    }

    #[rstest]
    fn reports_missing_and_unexpected_features() {
        let err = ShapeMismatchError::check(&schema(&["a", "b"]), &vector(&["b", "c"]))
            .expect_err("mismatch");
        assert_eq!(err.missing, vec!["a".to_owned()]);
        assert_eq!(err.unexpected, vec!["c".to_owned()]);
    }

    #[rstest]
    fn orders_dense_values_by_schema() {
        let mut features = vector(&["a", "b"]);
        features.values.insert("a".into(), 2.0);
        let dense = dense_values(&schema(&["b", "a"]), &features).expect("shape matches");
        assert_eq!(dense, vec![1.0, 2.0]);
    }
}
