//! Core domain types for the nuisance risk engine.
//!
//! The crate turns heterogeneous short-term-rental records into risk
//! scores and alerts:
//!
//! - [`normalize`] maps city-specific raw records onto [`CanonicalRecord`]s
//!   using a configurable [`SchemaMap`].
//! - [`FeatureBuilder`] derives a fixed-shape [`FeatureVector`] for a property
//!   at a point in time.
//! - [`RiskModel`] implementations map vectors to a [`Probability`].
//! - [`ThresholdConfig`] buckets probabilities into ordered categories.
//! - [`ChangeMonitor`] compares a new score with the persisted
//!   [`PropertyRiskState`] and emits [`AlertEvent`]s.
//! - [`Orchestrator`] drives one scoring epoch over a batch of properties
//!   and [`ScoringEngine`] commits the result to a [`StateStore`].
//!
//! Constructors validate their input and return `Result` so invalid
//! configuration surfaces before any scoring happens.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod features;
pub mod model;
pub mod monitor;
pub mod normalize;
pub mod orchestrator;
pub mod provider;
pub mod record;
pub mod store;
pub mod threshold;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;

pub use features::{
    FeatureBuilder, FeatureConfig, FeatureConfigError, FeatureSchema, FeatureVector,
};
pub use model::{
    LabelledExample, Probability, ProbabilityRangeError, RiskModel, ScoreResult,
    ShapeMismatchError, Trainer,
};
pub use monitor::{
    AlertEvent, AlertReason, ChangeMonitor, HistoryEntry, MonitorPolicy, PropertyRiskState,
    Transition,
};
pub use normalize::{
    FieldKind, FieldMapping, Normalized, RejectedRecord, SchemaError, SchemaMap, SourceSchema,
    normalize, parse_timestamp,
};
pub use orchestrator::{
    CancellationToken, EpochOutcome, EpochRequest, FailureKind, Orchestrator, OrchestratorConfig,
    PropertyFailure, RunError, RunReport, ScoringEngine, ScoringInputs,
};
pub use provider::{MAX_LOOKBACK_DAYS, ProviderError, RecordProvider, TimeWindow, days_before};
pub use record::{CanonicalRecord, FieldValue, RawRecord, RawValue, RecordType};
pub use store::{MemoryStateStore, StateSnapshot, StateStore, StoreError};
pub use threshold::{ConfigError, RiskCategory, ThresholdBand, ThresholdConfig};

#[cfg(feature = "store-sqlite")]
pub use store::SqliteStateStore;

/// Identifier of a tracked short-term-rental property.
///
/// # Examples
///
/// ```
/// use nuisance_core::PropertyId;
///
/// let id = PropertyId::from("P-0042");
/// assert_eq!(id.as_str(), "P-0042");
/// assert_eq!(id.to_string(), "P-0042");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct PropertyId(String);

impl PropertyId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropertyId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for PropertyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one scoring period, e.g. `2024-06`.
///
/// Epochs are opaque labels; ordering between runs is tracked by the
/// category history rather than by parsing the label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Epoch(String);

impl Epoch {
    /// Wrap an epoch label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Borrow the label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Epoch {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Epoch {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn property_ids_order_lexicographically() {
        let mut ids = vec![PropertyId::from("b"), PropertyId::from("a")];
        ids.sort();
        assert_eq!(ids, vec![PropertyId::from("a"), PropertyId::from("b")]);
    }

    #[rstest]
    fn epoch_displays_label() {
        assert_eq!(Epoch::new("2024-06").to_string(), "2024-06");
    }
}
