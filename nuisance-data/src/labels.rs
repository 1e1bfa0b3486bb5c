//! Outcome labels and training set assembly.

use std::collections::BTreeSet;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use log::{info, warn};
use nuisance_core::{
    Epoch, FeatureBuilder, LabelledExample, PropertyId, ProviderError, RecordProvider, SchemaMap,
    TimeWindow, normalize,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{DatasetError, load_jsonl_as};

/// Whether a property went on to cause a nuisance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLabel {
    /// Labelled property.
    pub property_id: PropertyId,
    /// Observed outcome.
    pub outcome: bool,
}

/// Errors raised while assembling training examples.
#[derive(Debug, Error)]
pub enum LabelError {
    /// The labels file could not be read.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// A property was labelled twice.
    #[error("property {property_id} is labelled more than once")]
    Duplicate {
        /// Repeated property.
        property_id: PropertyId,
    },
    /// Records for a labelled property could not be fetched.
    #[error("failed to fetch training records")]
    Provider(#[from] ProviderError),
}

/// Read `{property_id, outcome}` rows from a JSON Lines file.
///
/// # Errors
/// Returns [`LabelError`] when the file cannot be read or labels the same
/// property twice.
pub fn load_labels(path: &Utf8Path) -> Result<Vec<OutcomeLabel>, LabelError> {
    let labels: Vec<OutcomeLabel> = load_jsonl_as(path)?;
    let mut seen = BTreeSet::new();
    if let Some(label) = labels
        .iter()
        .find(|label| !seen.insert(label.property_id.clone()))
    {
        return Err(LabelError::Duplicate {
            property_id: label.property_id.clone(),
        });
    }
    let positives = labels.iter().filter(|label| label.outcome).count();
    info!(
        "loaded {} labels ({positives} positive) from {path}",
        labels.len()
    );
    Ok(labels)
}

/// Where and when training features are built.
#[derive(Debug, Clone, Copy)]
pub struct TrainingWindow<'a> {
    /// Epoch label attached to the vectors.
    pub epoch: &'a Epoch,
    /// Records dated after this instant are ignored.
    pub as_of: DateTime<Utc>,
    /// Days of history fetched before `as_of`; `None` fetches everything
    /// up to `as_of`.
    pub lookback_days: Option<u32>,
}

/// Build one labelled example per label from the provider's records.
///
/// Features are built exactly as a scoring run builds them, so a model
/// trained on the result accepts the vectors the orchestrator produces.
/// Unlike a scoring run, a provider failure aborts assembly.
///
/// # Errors
/// Returns [`LabelError::Provider`] when records cannot be fetched.
pub fn build_training_examples(
    labels: &[OutcomeLabel],
    provider: &dyn RecordProvider,
    schema_map: &SchemaMap,
    builder: &FeatureBuilder,
    window: TrainingWindow<'_>,
) -> Result<Vec<LabelledExample>, LabelError> {
    let fetch_window = TimeWindow::history(window.as_of, window.lookback_days);
    let mut rejected = 0;
    let mut examples = Vec::with_capacity(labels.len());
    for label in labels {
        let raw = provider.fetch(&label.property_id, fetch_window)?;
        let normalized = normalize(&raw, schema_map);
        rejected += normalized.rejected.len();
        let features = builder.build(
            &label.property_id,
            window.epoch,
            window.as_of,
            &normalized.records,
        );
        examples.push(LabelledExample::new(features, label.outcome));
    }
    if rejected > 0 {
        warn!("skipped {rejected} unreadable records while building training examples");
    }
    info!(
        "built {} training examples for epoch {}",
        examples.len(),
        window.epoch
    );
    Ok(examples)
}
