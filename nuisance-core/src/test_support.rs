//! Test-only collaborators used by unit and behaviour tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::normalize::parse_timestamp;
use crate::{
    FeatureSchema, FeatureVector, FieldKind, Probability, PropertyId, PropertyRiskState,
    ProviderError, RawRecord, RawValue, RecordProvider, RecordType, RiskModel, SchemaMap,
    ShapeMismatchError, SourceSchema, StateSnapshot, StateStore, StoreError, TimeWindow,
};

/// Dataset name used by [`complaint_row`] and [`sample_schema_map`].
pub const COMPLAINTS_SOURCE: &str = "complaints";

/// Dataset name used by [`attribute_row`] and [`sample_schema_map`].
pub const PARCELS_SOURCE: &str = "parcels";

/// Dataset name used by [`enforcement_row`] and [`sample_schema_map`].
pub const ENFORCEMENT_SOURCE: &str = "enforcement";

/// Probability [`FixedModel`] returns for properties without a scripted score.
pub const DEFAULT_FIXED_SCORE: f64 = 0.1;

/// Schema map with complaints, parcels and enforcement datasets, each keyed
/// by `property_id` and `date`.
///
/// Complaints map `type` to `category`, parcels map `beds` to `bedrooms`
/// and enforcement actions carry `severity`.
#[must_use]
pub fn sample_schema_map() -> SchemaMap {
    SchemaMap::new()
        .with_source(
            COMPLAINTS_SOURCE,
            SourceSchema::fixed(RecordType::Complaint, "property_id", "date")
                .with_field("type", "category", FieldKind::Text),
        )
        .with_source(
            PARCELS_SOURCE,
            SourceSchema::fixed(RecordType::PropertyAttribute, "property_id", "date")
                .with_field("beds", "bedrooms", FieldKind::Integer),
        )
        .with_source(
            ENFORCEMENT_SOURCE,
            SourceSchema::fixed(RecordType::EnforcementAction, "property_id", "date")
                .with_field("severity", "severity", FieldKind::Integer),
        )
}

/// Raw complaint row matching [`sample_schema_map`].
#[must_use]
pub fn complaint_row(property_id: &str, date: &str, category: &str) -> RawRecord {
    RawRecord::new(COMPLAINTS_SOURCE)
        .with("property_id", RawValue::Text(property_id.to_owned()))
        .with("date", RawValue::Text(date.to_owned()))
        .with("type", RawValue::Text(category.to_owned()))
}

/// Raw parcel row matching [`sample_schema_map`].
#[must_use]
pub fn attribute_row(property_id: &str, date: &str, bedrooms: i64) -> RawRecord {
    RawRecord::new(PARCELS_SOURCE)
        .with("property_id", RawValue::Text(property_id.to_owned()))
        .with("date", RawValue::Text(date.to_owned()))
        .with("beds", RawValue::Integer(bedrooms))
}

/// Raw enforcement row matching [`sample_schema_map`].
#[must_use]
pub fn enforcement_row(property_id: &str, date: &str, severity: i64) -> RawRecord {
    RawRecord::new(ENFORCEMENT_SOURCE)
        .with("property_id", RawValue::Text(property_id.to_owned()))
        .with("date", RawValue::Text(date.to_owned()))
        .with("severity", RawValue::Integer(severity))
}

/// In-memory [`RecordProvider`] holding raw rows per property.
///
/// Rows are matched on their `property_id` column. Rows whose `date` column
/// parses to a timestamp outside the requested window are filtered out.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    rows: BTreeMap<PropertyId, Vec<RawRecord>>,
    failing: BTreeSet<PropertyId>,
    fetches: AtomicUsize,
}

impl MemoryProvider {
    /// Add a row, consuming and returning the provider.
    #[must_use]
    pub fn with_row(mut self, row: RawRecord) -> Self {
        self.push(row);
        self
    }

    /// Add a row.
    pub fn push(&mut self, row: RawRecord) {
        let id = row
            .fields
            .get("property_id")
            .and_then(RawValue::to_text)
            .unwrap_or_default();
        self.rows.entry(PropertyId::new(id)).or_default().push(row);
    }

    /// Make fetches for `property_id` fail.
    #[must_use]
    pub fn failing_for(mut self, property_id: &str) -> Self {
        self.failing.insert(PropertyId::from(property_id));
        self
    }

    /// Number of fetches served so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RecordProvider for MemoryProvider {
    fn fetch(
        &self,
        property_id: &PropertyId,
        window: TimeWindow,
    ) -> Result<Vec<RawRecord>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(property_id) {
            return Err(ProviderError::Unavailable {
                property_id: property_id.clone(),
                source: "scripted failure".into(),
            });
        }
        Ok(self
            .rows
            .get(property_id)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        row.fields
                            .get("date")
                            .and_then(parse_timestamp)
                            .is_none_or(|at| window.contains(at))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// [`RiskModel`] returning scripted probabilities per property.
///
/// Shape is still checked against the configured schema so mismatches can be
/// exercised. Every vector scored is kept for inspection; clones share the
/// record.
#[derive(Debug, Clone)]
pub struct FixedModel {
    schema: FeatureSchema,
    scores: BTreeMap<PropertyId, Probability>,
    seen: Arc<Mutex<BTreeMap<PropertyId, FeatureVector>>>,
}

impl FixedModel {
    /// Model accepting vectors shaped like `schema`.
    #[must_use]
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            scores: BTreeMap::new(),
            seen: Arc::default(),
        }
    }

    /// Last vector scored for `property_id`.
    #[must_use]
    pub fn seen(&self, property_id: &str) -> Option<FeatureVector> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&PropertyId::from(property_id))
            .cloned()
    }

    /// Script the score for `property_id`, clamped into `[0, 1]`.
    #[must_use]
    pub fn with_score(mut self, property_id: &str, probability: f64) -> Self {
        self.set_score(property_id, probability);
        self
    }

    /// Script the score for `property_id`, clamped into `[0, 1]`.
    pub fn set_score(&mut self, property_id: &str, probability: f64) {
        self.scores.insert(
            PropertyId::from(property_id),
            Probability::saturating(probability),
        );
    }
}

impl RiskModel for FixedModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn model_version(&self) -> &str {
        "fixed-test"
    }

    fn score(&self, features: &FeatureVector) -> Result<Probability, ShapeMismatchError> {
        ShapeMismatchError::check(&self.schema, features)?;
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(features.property_id.clone(), features.clone());
        Ok(self
            .scores
            .get(&features.property_id)
            .copied()
            .unwrap_or_else(|| Probability::saturating(DEFAULT_FIXED_SCORE)))
    }
}

/// [`StateStore`] whose commits always fail, for atomicity tests.
#[derive(Debug, Default)]
pub struct FailingStateStore {
    states: StateSnapshot,
}

impl FailingStateStore {
    /// Seed the store with states that `load_all` returns.
    #[must_use]
    pub fn with_states(states: impl IntoIterator<Item = PropertyRiskState>) -> Self {
        Self {
            states: states
                .into_iter()
                .map(|state| (state.property_id.clone(), state))
                .collect(),
        }
    }
}

impl StateStore for FailingStateStore {
    fn load_all(&self) -> Result<StateSnapshot, StoreError> {
        Ok(self.states.clone())
    }

    fn commit(&mut self, _states: &[PropertyRiskState]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable {
            message: "commit rejected".to_owned(),
        })
    }
}
