//! Property tests for threshold classification and feature construction.

use chrono::{Duration, TimeZone, Utc};
use nuisance_core::{
    CanonicalRecord, Epoch, FeatureBuilder, FeatureConfig, FieldValue, Probability, PropertyId,
    RecordType, ThresholdBand, ThresholdConfig,
};
use proptest::prelude::*;

const CATEGORIES: [&str; 5] = ["noise", "parking", "trash", "party", "fireworks"];

fn record_strategy() -> impl Strategy<Value = CanonicalRecord> {
    (
        0_usize..4,
        0_i64..800,
        0_usize..CATEGORIES.len(),
        0_i64..6,
        prop::bool::ANY,
    )
        .prop_map(|(kind, days_back, category, number, flag)| {
            let as_of = Utc
                .with_ymd_and_hms(2024, 7, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(|| panic!("valid date"));
            let record_type = RecordType::ALL
                .get(kind)
                .copied()
                .unwrap_or(RecordType::Complaint);
            let label = CATEGORIES.get(category).copied().unwrap_or("noise");
            CanonicalRecord::new(
                PropertyId::from("P1"),
                record_type,
                as_of - Duration::days(days_back - 30),
            )
            .with_field("category", FieldValue::Text(label.to_owned()))
            .with_field("bedrooms", FieldValue::Integer(number))
            .with_field("severity", FieldValue::Integer(number))
            .with_field("owner_occupied", FieldValue::Boolean(flag))
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn every_probability_has_exactly_one_category(value in 0.0_f64..=1.0) {
        let thresholds = ThresholdConfig::default();
        let probability = Probability::new(value).unwrap_or_else(|| panic!("in range"));
        let category = thresholds.classify(probability);
        let containing = thresholds
            .bands()
            .iter()
            .enumerate()
            .filter(|(rank, band)| {
                value >= band.lower
                    && (value < band.upper || (*rank == thresholds.bands().len() - 1 && value <= band.upper))
            })
            .map(|(rank, _)| rank)
            .collect::<Vec<_>>();
        prop_assert_eq!(containing, vec![category.rank()]);
    }

    #[test]
    fn custom_contiguous_bands_are_total(cut in 0.01_f64..0.99, value in 0.0_f64..=1.0) {
        let thresholds = ThresholdConfig::new(vec![
            ThresholdBand::new("quiet", 0.0, cut),
            ThresholdBand::new("watch", cut, 1.0),
        ])
        .unwrap_or_else(|err| panic!("contiguous bands: {err}"));
        let probability = Probability::new(value).unwrap_or_else(|| panic!("in range"));
        let expected = if value < cut { "quiet" } else { "watch" };
        let classified = thresholds.classify(probability);
        prop_assert_eq!(classified.name(), expected);
    }

    #[test]
    fn feature_vectors_are_deterministic(records in prop::collection::vec(record_strategy(), 0..40)) {
        let builder = FeatureBuilder::new(FeatureConfig::default())
            .unwrap_or_else(|err| panic!("default config: {err}"));
        let as_of = Utc
            .with_ymd_and_hms(2024, 7, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| panic!("valid date"));
        let id = PropertyId::from("P1");
        let epoch = Epoch::from("2024-07");
        let first = builder.build(&id, &epoch, as_of, &records);
        let second = builder.build(&id, &epoch, as_of, &records);
        let bits = |v: &nuisance_core::FeatureVector| {
            v.values.iter().map(|(k, x)| (k.clone(), x.to_bits())).collect::<Vec<_>>()
        };
        prop_assert_eq!(bits(&first), bits(&second));
        prop_assert_eq!(first.values.len(), builder.schema().len());
        prop_assert!(first.values.values().all(|value| value.is_finite()));
    }

    #[test]
    fn future_records_never_change_features(records in prop::collection::vec(record_strategy(), 0..40)) {
        let builder = FeatureBuilder::new(FeatureConfig::default())
            .unwrap_or_else(|err| panic!("default config: {err}"));
        let as_of = Utc
            .with_ymd_and_hms(2024, 7, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| panic!("valid date"));
        let id = PropertyId::from("P1");
        let epoch = Epoch::from("2024-07");
        let past: Vec<CanonicalRecord> = records
            .iter()
            .filter(|record| record.timestamp() <= as_of)
            .cloned()
            .collect();
        prop_assert_eq!(
            builder.build(&id, &epoch, as_of, &records),
            builder.build(&id, &epoch, as_of, &past)
        );
    }
}
