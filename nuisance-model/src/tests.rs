//! Unit coverage for training, evaluation and persistence.
#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use nuisance_core::test_support::FixedModel;
use nuisance_core::{
    Epoch, FeatureSchema, FeatureVector, LabelledExample, PropertyId, RiskModel, Trainer,
};
use proptest::prelude::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::{
    DEFAULT_DECISION_THRESHOLD, DEFAULT_SPLIT_SEED, InvalidModelError, LogisticModel,
    LogisticTrainer, MODEL_FORMAT_VERSION, ModelLoadError, TrainError, evaluate, load_model,
    save_model, split_train_test,
};

fn vector(property_id: &str, values: &[(&str, f64)]) -> FeatureVector {
    FeatureVector {
        property_id: PropertyId::from(property_id),
        epoch: Epoch::from("2024-06"),
        values: values
            .iter()
            .map(|(name, value)| ((*name).to_owned(), *value))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn example(index: u32, complaints: u32, outcome: bool) -> LabelledExample {
    LabelledExample::new(
        vector(
            &format!("P{index}"),
            &[("complaints_90d", f64::from(complaints)), ("bedrooms", 3.0)],
        ),
        outcome,
    )
}

/// Twenty quiet properties that stayed quiet and twenty noisy ones that did
/// not.
#[fixture]
fn separable() -> Vec<LabelledExample> {
    (0..20_u32)
        .map(|index| example(index, index, false))
        .chain((20..40_u32).map(|index| example(index, index, true)))
        .collect()
}

#[fixture]
fn temp_dir() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(err) => panic!("create temporary directory: {err}"),
    }
}

fn artefact_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name))
        .unwrap_or_else(|path| panic!("non UTF-8 path: {}", path.display()))
}

#[expect(clippy::float_arithmetic, reason = "tolerance comparison")]
fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[rstest]
fn learns_separable_data(separable: Vec<LabelledExample>) {
    let model = LogisticTrainer::default()
        .train(&separable)
        .expect("training succeeds");
    let report = evaluate(&model, &separable, DEFAULT_DECISION_THRESHOLD).expect("shape matches");
    assert!(report.accuracy >= 0.95, "accuracy {}", report.accuracy);

    let quiet = model
        .score(&example(0, 0, false).features)
        .expect("score quiet");
    let noisy = model
        .score(&example(0, 39, true).features)
        .expect("score noisy");
    assert!(quiet < noisy);
    let weight = model
        .coefficients()
        .find(|(name, _)| *name == "complaints_90d")
        .map(|(_, weight)| weight)
        .expect("complaint weight");
    assert!(weight > 0.0);
}

#[rstest]
fn training_is_deterministic(separable: Vec<LabelledExample>) {
    let trainer = LogisticTrainer::default();
    let first = trainer.train(&separable).expect("first fit");
    let second = trainer.train(&separable).expect("second fit");
    assert_eq!(first, second);
    assert_eq!(first.model_version(), second.model_version());
}

#[rstest]
fn version_is_prefixed_digest(separable: Vec<LabelledExample>) {
    let model = LogisticTrainer::default()
        .train(&separable)
        .expect("training succeeds");
    let version = model.model_version();
    let digest = version.strip_prefix("logistic-").expect("logistic prefix");
    assert_eq!(digest.len(), 12);
    assert!(digest.chars().all(|ch| ch.is_ascii_hexdigit()));
}

#[rstest]
fn schema_follows_first_example(separable: Vec<LabelledExample>) {
    let model = LogisticTrainer::default()
        .train(&separable)
        .expect("training succeeds");
    assert_eq!(
        model.schema().names(),
        ["bedrooms".to_owned(), "complaints_90d".to_owned()]
    );
}

#[rstest]
fn rejects_empty_dataset() {
    let err = LogisticTrainer::default()
        .train(&[])
        .expect_err("empty dataset");
    assert!(matches!(err, TrainError::Empty));
}

#[rstest]
fn rejects_single_class_dataset() {
    let examples: Vec<_> = (0..5_u32).map(|index| example(index, index, true)).collect();
    let err = LogisticTrainer::default()
        .train(&examples)
        .expect_err("single class");
    assert!(matches!(err, TrainError::SingleClass { outcome: true }));
}

#[rstest]
fn rejects_inconsistent_schema(mut separable: Vec<LabelledExample>) {
    separable.push(LabelledExample::new(
        vector("P99", &[("complaints_90d", 1.0)]),
        false,
    ));
    let err = LogisticTrainer::default()
        .train(&separable)
        .expect_err("inconsistent schema");
    match err {
        TrainError::InconsistentSchema { index, source } => {
            assert_eq!(index, 40);
            assert_eq!(source.missing, vec!["bedrooms".to_owned()]);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[rstest]
fn rejects_non_finite_features(mut separable: Vec<LabelledExample>) {
    separable.push(LabelledExample::new(
        vector("P99", &[("complaints_90d", f64::NAN), ("bedrooms", 3.0)]),
        true,
    ));
    let err = LogisticTrainer::default()
        .train(&separable)
        .expect_err("non-finite value");
    assert!(matches!(
        err,
        TrainError::NonFiniteFeature { index: 40, ref feature } if feature == "complaints_90d"
    ));
}

#[rstest]
#[case(LogisticTrainer { learning_rate: 0.0, ..LogisticTrainer::default() }, "learning_rate")]
#[case(LogisticTrainer { iterations: 0, ..LogisticTrainer::default() }, "iterations")]
#[case(LogisticTrainer { l2: -0.5, ..LogisticTrainer::default() }, "l2")]
fn rejects_invalid_hyperparameters(
    separable: Vec<LabelledExample>,
    #[case] trainer: LogisticTrainer,
    #[case] expected: &str,
) {
    let err = trainer.train(&separable).expect_err("invalid parameter");
    assert!(matches!(err, TrainError::InvalidParameter { name, .. } if name == expected));
}

#[rstest]
fn scoring_checks_shape(separable: Vec<LabelledExample>) {
    let model = LogisticTrainer::default()
        .train(&separable)
        .expect("training succeeds");
    let err = model
        .score(&vector("P1", &[("complaints_90d", 1.0), ("permit_count", 2.0)]))
        .expect_err("shape mismatch");
    assert_eq!(err.missing, vec!["bedrooms".to_owned()]);
    assert_eq!(err.unexpected, vec!["permit_count".to_owned()]);
}

#[rstest]
fn from_parts_validates_lengths_and_scales() {
    let schema = FeatureSchema::new(vec!["a".to_owned(), "b".to_owned()]);
    let short = LogisticModel::from_parts(schema.clone(), vec![0.0], vec![1.0, 1.0], vec![0.0, 0.0], 0.0)
        .expect_err("means too short");
    assert_eq!(
        short,
        InvalidModelError::LengthMismatch {
            parameter: "means",
            found: 1,
            expected: 2,
        }
    );
    let zero_scale = LogisticModel::from_parts(
        schema,
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        vec![0.0, 0.0],
        0.0,
    )
    .expect_err("zero scale");
    assert_eq!(
        zero_scale,
        InvalidModelError::NonPositiveScale {
            feature: "b".to_owned()
        }
    );
}

#[rstest]
fn zero_weights_score_one_half() {
    let schema = FeatureSchema::new(vec!["a".to_owned()]);
    let model = LogisticModel::from_parts(schema, vec![0.0], vec![1.0], vec![0.0], 0.0)
        .expect("valid parameters");
    let probability = model.score(&vector("P1", &[("a", 7.0)])).expect("score");
    assert_close(probability.get(), 0.5);
}

#[rstest]
fn evaluation_counts_and_metrics() {
    let schema = FeatureSchema::new(vec!["x".to_owned()]);
    let model = FixedModel::new(schema)
        .with_score("TP", 0.9)
        .with_score("FP", 0.6)
        .with_score("TN", 0.2)
        .with_score("FN", 0.4);
    let examples = [("TP", true), ("FP", false), ("TN", false), ("FN", true)]
        .map(|(id, outcome)| LabelledExample::new(vector(id, &[("x", 0.0)]), outcome));

    let report = evaluate(&model, &examples, 0.5).expect("shape matches");

    assert_eq!(report.examples, 4);
    assert_eq!(
        (
            report.true_positives,
            report.false_positives,
            report.true_negatives,
            report.false_negatives
        ),
        (1, 1, 1, 1)
    );
    assert_close(report.accuracy, 0.5);
    assert_close(report.precision, 0.5);
    assert_close(report.recall, 0.5);
    assert_close(report.f1, 0.5);
    assert_close(report.brier_score, 0.1925);
}

#[rstest]
fn evaluation_of_nothing_is_all_zero() {
    let model = FixedModel::new(FeatureSchema::default());
    let report = evaluate(&model, &[], 0.5).expect("nothing to score");
    assert_eq!(report.examples, 0);
    assert_close(report.accuracy, 0.0);
    assert_close(report.f1, 0.0);
    assert_close(report.brier_score, 0.0);
}

#[rstest]
fn split_is_stratified_and_ordered() {
    let examples: Vec<_> = (0..50_u32)
        .map(|index| example(index, index, false))
        .chain((50..60_u32).map(|index| example(index, index, true)))
        .collect();

    let split = split_train_test(&examples, 0.2, DEFAULT_SPLIT_SEED).expect("valid fraction");

    assert_eq!(split.test.len(), 12);
    assert_eq!(split.train.len(), 48);
    assert_eq!(split.test.iter().filter(|ex| ex.outcome).count(), 2);
    let ids: Vec<&str> = split
        .test
        .iter()
        .map(|ex| ex.features.property_id.as_str())
        .collect();
    let positions: Vec<usize> = ids
        .iter()
        .filter_map(|id| {
            examples
                .iter()
                .position(|ex| ex.features.property_id.as_str() == *id)
        })
        .collect();
    assert!(positions.windows(2).all(|pair| matches!(pair, [a, b] if a < b)));
}

#[rstest]
fn split_is_reproducible(separable: Vec<LabelledExample>) {
    let first = split_train_test(&separable, 0.2, 7).expect("valid fraction");
    let second = split_train_test(&separable, 0.2, 7).expect("valid fraction");
    assert_eq!(first, second);
}

#[rstest]
#[case(0.0)]
#[case(1.0)]
#[case(-0.1)]
#[case(f64::NAN)]
fn split_rejects_bad_fractions(separable: Vec<LabelledExample>, #[case] fraction: f64) {
    assert!(split_train_test(&separable, fraction, DEFAULT_SPLIT_SEED).is_err());
}

#[rstest]
fn saved_model_round_trips(separable: Vec<LabelledExample>, temp_dir: TempDir) {
    let model = LogisticTrainer::default()
        .train(&separable)
        .expect("training succeeds");
    let path = artefact_path(&temp_dir, "models/model.bin");

    save_model(&model, &path).expect("save model");
    let loaded = load_model(&path).expect("load model");

    assert_eq!(loaded, model);
    for item in &separable {
        assert_eq!(
            loaded.score(&item.features).expect("score loaded"),
            model.score(&item.features).expect("score original")
        );
    }
}

#[rstest]
fn loading_a_foreign_file_reports_bad_magic(temp_dir: TempDir) {
    let path = artefact_path(&temp_dir, "model.bin");
    std::fs::write(path.as_std_path(), b"not a model").expect("write file");
    let err = load_model(&path).expect_err("foreign file");
    assert!(matches!(err, ModelLoadError::BadMagic { .. }));
}

#[rstest]
fn loading_a_future_format_is_rejected(temp_dir: TempDir) {
    let path = artefact_path(&temp_dir, "model.bin");
    // Magic followed by a single-byte varint version.
    std::fs::write(path.as_std_path(), [b'N', b'R', b'M', b'D', 99]).expect("write file");
    let err = load_model(&path).expect_err("future format");
    assert!(matches!(
        err,
        ModelLoadError::UnsupportedVersion { found: 99, supported, .. }
            if supported == MODEL_FORMAT_VERSION
    ));
}

#[rstest]
fn loading_a_truncated_model_is_corrupt(temp_dir: TempDir) {
    let path = artefact_path(&temp_dir, "model.bin");
    std::fs::write(path.as_std_path(), [b'N', b'R', b'M', b'D', 1, 2]).expect("write file");
    let err = load_model(&path).expect_err("truncated");
    assert!(matches!(err, ModelLoadError::Decode { .. }));
}

#[rstest]
fn loading_a_missing_file_fails_to_open(temp_dir: TempDir) {
    let path = artefact_path(&temp_dir, "absent.bin");
    let err = load_model(&path).expect_err("missing file");
    assert!(matches!(err, ModelLoadError::Open { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scores_are_probabilities(
        weight in -50.0_f64..50.0,
        bias in -50.0_f64..50.0,
        value in -1.0e6_f64..1.0e6,
    ) {
        let schema = FeatureSchema::new(vec!["a".to_owned()]);
        let model = LogisticModel::from_parts(schema, vec![0.0], vec![1.0], vec![weight], bias)
            .expect("finite parameters");
        let features = vector("P1", &[("a", value)]);
        let first = model.score(&features).expect("shape matches");
        let second = model.score(&features).expect("shape matches");
        prop_assert!((0.0..=1.0).contains(&first.get()));
        prop_assert_eq!(first, second);
    }
}
