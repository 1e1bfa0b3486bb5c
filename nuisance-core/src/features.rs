//! Fixed-shape feature vectors derived from canonical records.
//!
//! [`FeatureBuilder::build`] is a pure function of its inputs: the same
//! records and `as_of` always yield a bit-identical [`FeatureVector`]. Only
//! records at or before `as_of` contribute, so rebuilding a past epoch never
//! sees later events.
//!
//! Feature names produced for the default configuration:
//!
//! | Family | Features |
//! |--------|----------|
//! | Rolling complaints | `complaints_30d`, `complaints_90d`, `complaints_365d` |
//! | Complaint mix | `complaint_share_{noise,parking,trash,party,other}` |
//! | Seasonality | `season_sin`, `season_cos` |
//! | Static attributes | `bedrooms`, `owner_occupied`, `has_attributes`, `zoning_{class}` |
//! | Enforcement | `enforcement_count`, `enforcement_max_severity`, `days_since_enforcement` |
//! | Permits | `permit_count`, `days_since_permit` |
//!
//! Values that cannot be derived because the records never mention them
//! (an absent attribute record, no enforcement history) take
//! [`FeatureConfig::missing_value`] so every vector has the same shape.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CanonicalRecord, Epoch, FieldValue, MAX_LOOKBACK_DAYS, PropertyId, RecordType, days_before,
};

/// Sentinel used for features whose source data is absent.
pub const DEFAULT_MISSING_VALUE: f64 = -1.0;

const OTHER_CATEGORY: &str = "other";

/// Tunable inputs to feature construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct FeatureConfig {
    /// Rolling complaint windows in days, relative to `as_of`.
    pub lookback_windows_days: Vec<u32>,
    /// Complaint categories with their own share feature; the rest count
    /// towards `complaint_share_other`.
    pub complaint_categories: Vec<String>,
    /// Payload field carrying the complaint category.
    pub complaint_category_field: String,
    /// Zoning classes encoded one-hot.
    pub zoning_classes: Vec<String>,
    /// Payload field carrying the zoning class.
    pub zoning_field: String,
    /// Payload field carrying the bedroom count.
    pub bedrooms_field: String,
    /// Payload field carrying the owner-occupancy flag.
    pub owner_occupied_field: String,
    /// Payload field carrying an enforcement action's severity.
    pub severity_field: String,
    /// Sentinel for features whose source data is absent.
    pub missing_value: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lookback_windows_days: vec![30, 90, 365],
            complaint_categories: ["noise", "parking", "trash", "party"]
                .map(str::to_owned)
                .to_vec(),
            complaint_category_field: "category".to_owned(),
            zoning_classes: ["residential", "mixed_use", "commercial"]
                .map(str::to_owned)
                .to_vec(),
            zoning_field: "zoning".to_owned(),
            bedrooms_field: "bedrooms".to_owned(),
            owner_occupied_field: "owner_occupied".to_owned(),
            severity_field: "severity".to_owned(),
            missing_value: DEFAULT_MISSING_VALUE,
        }
    }
}

impl FeatureConfig {
    /// Longest configured complaint window; a bounded record retrieval
    /// must reach at least this far back.
    #[must_use]
    pub fn max_lookback_days(&self) -> u32 {
        self.lookback_windows_days.iter().copied().max().unwrap_or(0)
    }

    /// Check the configuration produces a well-formed schema.
    ///
    /// # Errors
    /// Returns [`FeatureConfigError`] for zero-length or overlong windows,
    /// duplicate feature names, a category called `other`, or a non-finite
    /// sentinel.
    pub fn validate(&self) -> Result<(), FeatureConfigError> {
        if self.lookback_windows_days.contains(&0) {
            return Err(FeatureConfigError::ZeroWindow);
        }
        if let Some(days) = self
            .lookback_windows_days
            .iter()
            .copied()
            .find(|days| *days > MAX_LOOKBACK_DAYS)
        {
            return Err(FeatureConfigError::WindowTooLong { days });
        }
        if !self.missing_value.is_finite() {
            return Err(FeatureConfigError::NonFiniteSentinel);
        }
        if self
            .complaint_categories
            .iter()
            .any(|category| slug(category) == OTHER_CATEGORY)
        {
            return Err(FeatureConfigError::ReservedCategory);
        }
        let names = schema_names(self);
        let mut seen = BTreeSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(FeatureConfigError::DuplicateFeature { name: name.clone() });
            }
        }
        Ok(())
    }
}

/// Error raised for an unusable [`FeatureConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureConfigError {
    /// A lookback window of zero days was configured.
    #[error("lookback windows must be at least one day")]
    ZeroWindow,
    /// A lookback window exceeds [`MAX_LOOKBACK_DAYS`].
    #[error("lookback window of {days} days exceeds the limit of {max}", max = MAX_LOOKBACK_DAYS)]
    WindowTooLong {
        /// Configured window.
        days: u32,
    },
    /// The missing-value sentinel is NaN or infinite.
    #[error("missing-value sentinel must be finite")]
    NonFiniteSentinel,
    /// A complaint category collides with the catch-all bucket.
    #[error("complaint category 'other' is reserved")]
    ReservedCategory,
    /// Two configured entries produce the same feature name.
    #[error("feature '{name}' is produced more than once")]
    DuplicateFeature {
        /// Colliding feature name.
        name: String,
    },
}

/// Ordered list of feature names defining a vector's shape.
///
/// # Examples
/// ```
/// use nuisance_core::{FeatureConfig, FeatureSchema};
///
/// let schema = FeatureSchema::from_config(&FeatureConfig::default());
/// assert!(schema.contains("complaints_90d"));
/// assert!(schema.contains("complaint_share_other"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Wrap an ordered list of names.
    #[must_use]
    pub const fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Schema produced by a feature configuration.
    #[must_use]
    pub fn from_config(config: &FeatureConfig) -> Self {
        Self::new(schema_names(config))
    }

    /// Feature names in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Report whether the schema has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Report whether `name` is part of the schema.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|candidate| candidate == name)
    }

    /// Report whether both schemas name the same features, in any order.
    ///
    /// Models read vectors by name, so a model trained on one ordering can
    /// score vectors built with another.
    #[must_use]
    pub fn same_features(&self, other: &Self) -> bool {
        let mut left: Vec<&str> = self.names.iter().map(String::as_str).collect();
        let mut right: Vec<&str> = other.names.iter().map(String::as_str).collect();
        left.sort_unstable();
        right.sort_unstable();
        left == right
    }
}

/// Numeric summary of one property's history for one epoch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureVector {
    /// Property the vector describes.
    pub property_id: PropertyId,
    /// Scoring period the vector was built for.
    pub epoch: Epoch,
    /// Feature name to value.
    pub values: BTreeMap<String, f64>,
}

impl FeatureVector {
    /// Look up a feature value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Names of the features present, in sorted order.
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Builds [`FeatureVector`]s from canonical records.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
    schema: FeatureSchema,
}

impl FeatureBuilder {
    /// Validate `config` and create a builder.
    ///
    /// # Errors
    /// Propagates [`FeatureConfig::validate`] failures.
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureConfigError> {
        config.validate()?;
        let schema = FeatureSchema::from_config(&config);
        Ok(Self { config, schema })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Shape of every vector this builder produces.
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Build the feature vector for `property_id` as of `as_of`.
    ///
    /// Records for other properties or dated after `as_of` are ignored. An
    /// empty record slice yields zero counts, neutral zoning flags and
    /// sentinels for absent attributes and recencies.
    ///
    /// # Examples
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use nuisance_core::{Epoch, FeatureBuilder, FeatureConfig, PropertyId};
    ///
    /// let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    /// let as_of = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    /// let vector = builder.build(&PropertyId::from("P1"), &Epoch::from("2024-07"), as_of, &[]);
    /// assert_eq!(vector.get("complaints_30d"), Some(0.0));
    /// assert_eq!(vector.get("days_since_enforcement"), Some(-1.0));
    /// assert_eq!(vector.values.len(), builder.schema().len());
    /// ```
    #[must_use]
    pub fn build(
        &self,
        property_id: &PropertyId,
        epoch: &Epoch,
        as_of: DateTime<Utc>,
        records: &[CanonicalRecord],
    ) -> FeatureVector {
        let relevant: Vec<&CanonicalRecord> = records
            .iter()
            .filter(|record| record.property_id() == property_id && record.timestamp() <= as_of)
            .collect();

        let mut values = BTreeMap::new();
        self.complaint_windows(&relevant, as_of, &mut values);
        self.complaint_mix(&relevant, &mut values);
        seasonality(as_of, &mut values);
        self.attributes(&relevant, &mut values);
        self.history(
            &relevant,
            RecordType::EnforcementAction,
            as_of,
            &mut values,
        );
        self.history(&relevant, RecordType::Permit, as_of, &mut values);

        FeatureVector {
            property_id: property_id.clone(),
            epoch: epoch.clone(),
            values,
        }
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "complaint counts stay far below 2^52"
    )]
    fn complaint_windows(
        &self,
        records: &[&CanonicalRecord],
        as_of: DateTime<Utc>,
        values: &mut BTreeMap<String, f64>,
    ) {
        for days in &self.config.lookback_windows_days {
            let start = days_before(as_of, *days);
            let count = records
                .iter()
                .filter(|record| {
                    record.record_type() == RecordType::Complaint && record.timestamp() > start
                })
                .count();
            values.insert(window_feature(*days), count as f64);
        }
    }

    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "shares divide category counts by the complaint total"
    )]
    fn complaint_mix(&self, records: &[&CanonicalRecord], values: &mut BTreeMap<String, f64>) {
        let known: Vec<String> = self
            .config
            .complaint_categories
            .iter()
            .map(|category| slug(category))
            .collect();
        let mut counts: BTreeMap<&str, usize> = known
            .iter()
            .map(|category| (category.as_str(), 0))
            .chain(std::iter::once((OTHER_CATEGORY, 0)))
            .collect();
        let mut total = 0_usize;
        for record in records
            .iter()
            .filter(|record| record.record_type() == RecordType::Complaint)
        {
            total += 1;
            let category = record
                .field(&self.config.complaint_category_field)
                .and_then(FieldValue::as_text)
                .map(slug);
            let bucket = category
                .as_deref()
                .and_then(|name| known.iter().find(|known| known.as_str() == name))
                .map_or(OTHER_CATEGORY, String::as_str);
            if let Some(count) = counts.get_mut(bucket) {
                *count += 1;
            }
        }
        for (category, count) in counts {
            let share = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            };
            values.insert(share_feature(category), share);
        }
    }

    fn attributes(&self, records: &[&CanonicalRecord], values: &mut BTreeMap<String, f64>) {
        let latest = records
            .iter()
            .filter(|record| record.record_type() == RecordType::PropertyAttribute)
            .max_by_key(|record| record.timestamp());
        let missing = self.config.missing_value;

        let bedrooms = latest
            .and_then(|record| record.field(&self.config.bedrooms_field))
            .and_then(FieldValue::as_f64)
            .unwrap_or(missing);
        let owner_occupied = latest
            .and_then(|record| record.field(&self.config.owner_occupied_field))
            .and_then(FieldValue::as_bool)
            .map_or(missing, |flag| if flag { 1.0 } else { 0.0 });
        let zoning = latest
            .and_then(|record| record.field(&self.config.zoning_field))
            .and_then(FieldValue::as_text)
            .map(slug);

        values.insert("bedrooms".to_owned(), bedrooms);
        values.insert("owner_occupied".to_owned(), owner_occupied);
        values.insert(
            "has_attributes".to_owned(),
            if latest.is_some() { 1.0 } else { 0.0 },
        );
        for label in &self.config.zoning_classes {
            let class = slug(label);
            let flag = zoning.as_deref() == Some(class.as_str());
            values.insert(zoning_feature(&class), if flag { 1.0 } else { 0.0 });
        }
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "counts and day spans stay far below 2^52"
    )]
    fn history(
        &self,
        records: &[&CanonicalRecord],
        kind: RecordType,
        as_of: DateTime<Utc>,
        values: &mut BTreeMap<String, f64>,
    ) {
        let events: Vec<&&CanonicalRecord> = records
            .iter()
            .filter(|record| record.record_type() == kind)
            .collect();
        let days_since = events
            .iter()
            .map(|record| record.timestamp())
            .max()
            .map_or(self.config.missing_value, |latest| {
                (as_of - latest).num_days() as f64
            });
        let count = events.len() as f64;
        match kind {
            RecordType::EnforcementAction => {
                let max_severity = events
                    .iter()
                    .filter_map(|record| record.field(&self.config.severity_field))
                    .filter_map(FieldValue::as_f64)
                    .fold(0.0_f64, f64::max);
                values.insert("enforcement_count".to_owned(), count);
                values.insert("enforcement_max_severity".to_owned(), max_severity);
                values.insert("days_since_enforcement".to_owned(), days_since);
            }
            RecordType::Permit => {
                values.insert("permit_count".to_owned(), count);
                values.insert("days_since_permit".to_owned(), days_since);
            }
            RecordType::Complaint | RecordType::PropertyAttribute => {}
        }
    }
}

#[expect(
    clippy::float_arithmetic,
    reason = "cyclical encoding maps the day of year onto the unit circle"
)]
fn seasonality(as_of: DateTime<Utc>, values: &mut BTreeMap<String, f64>) {
    let year = as_of.year();
    let days_in_year = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    };
    let day_index = f64::from(as_of.ordinal0());
    let angle = TAU * day_index / days_in_year;
    values.insert("season_sin".to_owned(), angle.sin());
    values.insert("season_cos".to_owned(), angle.cos());
}

fn schema_names(config: &FeatureConfig) -> Vec<String> {
    let mut names: Vec<String> = config
        .lookback_windows_days
        .iter()
        .map(|days| window_feature(*days))
        .collect();
    names.extend(
        config
            .complaint_categories
            .iter()
            .map(|category| share_feature(&slug(category))),
    );
    names.push(share_feature(OTHER_CATEGORY));
    names.extend(["season_sin", "season_cos"].map(str::to_owned));
    names.extend(["bedrooms", "owner_occupied", "has_attributes"].map(str::to_owned));
    names.extend(
        config
            .zoning_classes
            .iter()
            .map(|class| zoning_feature(&slug(class))),
    );
    names.extend(
        [
            "enforcement_count",
            "enforcement_max_severity",
            "days_since_enforcement",
            "permit_count",
            "days_since_permit",
        ]
        .map(str::to_owned),
    );
    names
}

fn window_feature(days: u32) -> String {
    format!("complaints_{days}d")
}

fn share_feature(category: &str) -> String {
    format!("complaint_share_{category}")
}

fn zoning_feature(class: &str) -> String {
    format!("zoning_{class}")
}

/// Lowercase a label and replace anything but ASCII alphanumerics with `_`.
fn slug(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    fn complaint(id: &str, when: DateTime<Utc>, category: &str) -> CanonicalRecord {
        CanonicalRecord::new(PropertyId::from(id), RecordType::Complaint, when)
            .with_field("category", FieldValue::Text(category.into()))
    }

    #[fixture]
    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(FeatureConfig::default()).expect("default config is valid")
    }

    #[rstest]
    fn same_features_ignores_order(builder: FeatureBuilder) {
        let mut reordered: Vec<String> = builder.schema().names().to_vec();
        reordered.sort();
        let sorted = FeatureSchema::new(reordered);
        assert!(builder.schema().same_features(&sorted));
        assert_ne!(builder.schema(), &sorted);

        let fewer = FeatureSchema::new(vec!["complaints_30d".to_owned()]);
        assert!(!builder.schema().same_features(&fewer));
    }

    #[fixture]
    fn history() -> Vec<CanonicalRecord> {
        vec![
            complaint("P1", at(2024, 6, 20), "Noise"),
            complaint("P1", at(2024, 5, 1), "noise"),
            complaint("P1", at(2023, 12, 1), "Parking"),
            complaint("P1", at(2022, 1, 1), "Fireworks"),
            complaint("P1", at(2024, 8, 1), "noise"),
            complaint("P2", at(2024, 6, 25), "trash"),
            CanonicalRecord::new(
                PropertyId::from("P1"),
                RecordType::PropertyAttribute,
                at(2023, 1, 1),
            )
            .with_field("bedrooms", FieldValue::Integer(3))
            .with_field("zoning", FieldValue::Text("Residential".into())),
            CanonicalRecord::new(
                PropertyId::from("P1"),
                RecordType::PropertyAttribute,
                at(2024, 2, 1),
            )
            .with_field("bedrooms", FieldValue::Integer(5))
            .with_field("owner_occupied", FieldValue::Boolean(false))
            .with_field("zoning", FieldValue::Text("Mixed Use".into())),
            CanonicalRecord::new(
                PropertyId::from("P1"),
                RecordType::EnforcementAction,
                at(2024, 6, 1),
            )
            .with_field("severity", FieldValue::Integer(2)),
            CanonicalRecord::new(
                PropertyId::from("P1"),
                RecordType::EnforcementAction,
                at(2024, 3, 2),
            )
            .with_field("severity", FieldValue::Integer(4)),
            CanonicalRecord::new(PropertyId::from("P1"), RecordType::Permit, at(2023, 7, 1)),
        ]
    }

    fn build(builder: &FeatureBuilder, records: &[CanonicalRecord]) -> FeatureVector {
        builder.build(
            &PropertyId::from("P1"),
            &Epoch::from("2024-07"),
            at(2024, 7, 1),
            records,
        )
    }

    #[rstest]
    fn counts_complaints_per_window(builder: FeatureBuilder, history: Vec<CanonicalRecord>) {
        let vector = build(&builder, &history);
        assert_eq!(vector.get("complaints_30d"), Some(1.0));
        assert_eq!(vector.get("complaints_90d"), Some(2.0));
        assert_eq!(vector.get("complaints_365d"), Some(3.0));
    }

    #[rstest]
    fn computes_complaint_mix(builder: FeatureBuilder, history: Vec<CanonicalRecord>) {
        let vector = build(&builder, &history);
        assert_eq!(vector.get("complaint_share_noise"), Some(0.5));
        assert_eq!(vector.get("complaint_share_parking"), Some(0.25));
        assert_eq!(vector.get("complaint_share_other"), Some(0.25));
        assert_eq!(vector.get("complaint_share_trash"), Some(0.0));
    }

    #[rstest]
    fn uses_latest_attribute_record(builder: FeatureBuilder, history: Vec<CanonicalRecord>) {
        let vector = build(&builder, &history);
        assert_eq!(vector.get("bedrooms"), Some(5.0));
        assert_eq!(vector.get("owner_occupied"), Some(0.0));
        assert_eq!(vector.get("has_attributes"), Some(1.0));
        assert_eq!(vector.get("zoning_mixed_use"), Some(1.0));
        assert_eq!(vector.get("zoning_residential"), Some(0.0));
    }

    #[rstest]
    fn summarises_enforcement_and_permits(builder: FeatureBuilder, history: Vec<CanonicalRecord>) {
        let vector = build(&builder, &history);
        assert_eq!(vector.get("enforcement_count"), Some(2.0));
        assert_eq!(vector.get("enforcement_max_severity"), Some(4.0));
        assert_eq!(vector.get("days_since_enforcement"), Some(30.0));
        assert_eq!(vector.get("permit_count"), Some(1.0));
        assert_eq!(vector.get("days_since_permit"), Some(366.0));
    }

    #[rstest]
    fn empty_history_yields_defaults(builder: FeatureBuilder) {
        let vector = build(&builder, &[]);
        let names: Vec<&str> = vector.feature_names().collect();
        let mut expected: Vec<&str> = builder.schema().names().iter().map(String::as_str).collect();
        expected.sort_unstable();
        assert_eq!(names, expected);
        for sentinel in ["bedrooms", "owner_occupied", "days_since_enforcement", "days_since_permit"] {
            assert_eq!(vector.get(sentinel), Some(DEFAULT_MISSING_VALUE), "{sentinel}");
        }
        for zero in ["complaints_365d", "complaint_share_other", "has_attributes", "zoning_commercial"] {
            assert_eq!(vector.get(zero), Some(0.0), "{zero}");
        }
    }

    #[rstest]
    fn seasonality_is_cyclical(builder: FeatureBuilder) {
        let new_year = builder.build(
            &PropertyId::from("P1"),
            &Epoch::from("2024-01"),
            at(2024, 1, 1),
            &[],
        );
        assert_eq!(new_year.get("season_sin"), Some(0.0));
        assert_eq!(new_year.get("season_cos"), Some(1.0));
    }

    #[rstest]
    fn build_is_deterministic(builder: FeatureBuilder, history: Vec<CanonicalRecord>) {
        let first = build(&builder, &history);
        let second = build(&builder, &history);
        let first_bits: Vec<u64> = first.values.values().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.values.values().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[rstest]
    #[case(FeatureConfig { lookback_windows_days: vec![0], ..FeatureConfig::default() }, FeatureConfigError::ZeroWindow)]
    #[case(FeatureConfig { lookback_windows_days: vec![30, u32::MAX], ..FeatureConfig::default() }, FeatureConfigError::WindowTooLong { days: u32::MAX })]
    #[case(FeatureConfig { lookback_windows_days: vec![30, 30], ..FeatureConfig::default() }, FeatureConfigError::DuplicateFeature { name: "complaints_30d".into() })]
    #[case(FeatureConfig { complaint_categories: vec!["Other".into()], ..FeatureConfig::default() }, FeatureConfigError::ReservedCategory)]
    #[case(FeatureConfig { missing_value: f64::NAN, ..FeatureConfig::default() }, FeatureConfigError::NonFiniteSentinel)]
    fn rejects_invalid_configs(#[case] config: FeatureConfig, #[case] expected: FeatureConfigError) {
        assert_eq!(FeatureBuilder::new(config).expect_err("invalid"), expected);
    }
}
