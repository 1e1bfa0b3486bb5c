//! Seeded train/test splits and hold-out evaluation.
#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use nuisance_core::{LabelledExample, RiskModel, ShapeMismatchError};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::count_as_f64;
use crate::error::SplitError;

/// Share of each class held out for testing by default.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
/// Seed used for the default split.
pub const DEFAULT_SPLIT_SEED: u64 = 42;
/// Probability at or above which a prediction counts as positive.
pub const DEFAULT_DECISION_THRESHOLD: f64 = 0.5;

/// Examples partitioned into training and hold-out sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainTestSplit {
    /// Examples used for fitting, in input order.
    pub train: Vec<LabelledExample>,
    /// Hold-out examples, in input order.
    pub test: Vec<LabelledExample>,
}

/// Split `examples` so each outcome class contributes `test_fraction` of its
/// members (rounded to nearest) to the test set.
///
/// The split depends only on the input order, `test_fraction` and `seed`.
///
/// # Errors
/// Returns [`SplitError`] when `test_fraction` is not strictly between 0 and
/// 1.
///
/// # Examples
/// ```
/// use nuisance_model::{DEFAULT_SPLIT_SEED, split_train_test};
///
/// let split = split_train_test(&[], 0.2, DEFAULT_SPLIT_SEED).expect("valid fraction");
/// assert!(split.train.is_empty() && split.test.is_empty());
/// assert!(split_train_test(&[], 1.0, DEFAULT_SPLIT_SEED).is_err());
/// ```
pub fn split_train_test(
    examples: &[LabelledExample],
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError {
            value: test_fraction,
        });
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut held_out = BTreeSet::new();
    for outcome in [true, false] {
        let mut members: Vec<usize> = examples
            .iter()
            .enumerate()
            .filter(|(_, example)| example.outcome == outcome)
            .map(|(index, _)| index)
            .collect();
        members.shuffle(&mut rng);
        let take = held_out_count(members.len(), test_fraction);
        held_out.extend(members.into_iter().take(take));
    }

    let mut split = TrainTestSplit::default();
    for (index, example) in examples.iter().enumerate() {
        if held_out.contains(&index) {
            split.test.push(example.clone());
        } else {
            split.train.push(example.clone());
        }
    }
    Ok(split)
}

#[expect(
    clippy::float_arithmetic,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "the product is non-negative and no larger than the class size"
)]
fn held_out_count(class_size: usize, test_fraction: f64) -> usize {
    let rounded = (count_as_f64(class_size) * test_fraction).round() as usize;
    rounded.min(class_size)
}

/// Hold-out performance of a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Number of examples scored.
    pub examples: usize,
    /// Positive outcomes predicted positive.
    pub true_positives: usize,
    /// Negative outcomes predicted positive.
    pub false_positives: usize,
    /// Negative outcomes predicted negative.
    pub true_negatives: usize,
    /// Positive outcomes predicted negative.
    pub false_negatives: usize,
    /// Share of correct predictions.
    pub accuracy: f64,
    /// Share of positive predictions that were correct; 0 with none.
    pub precision: f64,
    /// Share of positive outcomes predicted positive; 0 with none.
    pub recall: f64,
    /// Harmonic mean of precision and recall; 0 when both are 0.
    pub f1: f64,
    /// Mean squared error of the probabilities against the outcomes.
    pub brier_score: f64,
    /// Threshold used to turn probabilities into predictions.
    pub decision_threshold: f64,
}

/// Score `examples` with `model` and summarise the results.
///
/// A probability at or above `decision_threshold` predicts a positive
/// outcome. Ratios whose denominator is zero are reported as 0.
///
/// # Errors
/// Returns [`ShapeMismatchError`] for the first example whose features do not
/// match the model's schema.
#[expect(
    clippy::float_arithmetic,
    reason = "metrics are ratios and means over the scored examples"
)]
pub fn evaluate<M: RiskModel + ?Sized>(
    model: &M,
    examples: &[LabelledExample],
    decision_threshold: f64,
) -> Result<EvaluationReport, ShapeMismatchError> {
    let mut report = EvaluationReport {
        examples: examples.len(),
        true_positives: 0,
        false_positives: 0,
        true_negatives: 0,
        false_negatives: 0,
        accuracy: 0.0,
        precision: 0.0,
        recall: 0.0,
        f1: 0.0,
        brier_score: 0.0,
        decision_threshold,
    };
    let mut squared_error = 0.0;
    for example in examples {
        let probability = model.score(&example.features)?.get();
        let target = if example.outcome { 1.0 } else { 0.0 };
        squared_error += (probability - target) * (probability - target);
        match (probability >= decision_threshold, example.outcome) {
            (true, true) => report.true_positives += 1,
            (true, false) => report.false_positives += 1,
            (false, false) => report.true_negatives += 1,
            (false, true) => report.false_negatives += 1,
        }
    }

    report.accuracy = ratio(
        report.true_positives + report.true_negatives,
        report.examples,
    );
    report.precision = ratio(
        report.true_positives,
        report.true_positives + report.false_positives,
    );
    report.recall = ratio(
        report.true_positives,
        report.true_positives + report.false_negatives,
    );
    let combined = report.precision + report.recall;
    if combined > 0.0 {
        report.f1 = 2.0 * report.precision * report.recall / combined;
    }
    if report.examples > 0 {
        report.brier_score = squared_error / count_as_f64(report.examples);
    }
    Ok(report)
}

#[expect(clippy::float_arithmetic, reason = "ratio of two counts")]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        count_as_f64(numerator) / count_as_f64(denominator)
    }
}
