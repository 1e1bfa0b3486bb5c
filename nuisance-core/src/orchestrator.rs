//! Drive one scoring epoch over a batch of properties.
//!
//! For every property the [`Orchestrator`] fetches raw records, normalizes
//! them, builds features, scores, classifies and runs the change monitor.
//! Work is split into contiguous shards processed on scoped threads; shared
//! inputs are only borrowed. Outcomes are merged after every shard has
//! joined, so a run never observes its own state updates.
//!
//! Per-property failures are recorded and the run carries on, unless
//! failures exceed [`OrchestratorConfig::max_failure_fraction`].
//! [`ScoringEngine`] wraps a run with loading and committing state.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::{DateTime, Utc};
use log::{info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    AlertEvent, ChangeMonitor, ConfigError, Epoch, FeatureBuilder, PropertyId, PropertyRiskState,
    RecordProvider, RiskModel, SchemaMap, ScoreResult, StateSnapshot, StateStore, StoreError,
    MAX_LOOKBACK_DAYS, ThresholdConfig, TimeWindow, Transition, normalize,
};

/// Default share of failed properties tolerated before a run aborts.
pub const DEFAULT_MAX_FAILURE_FRACTION: f64 = 0.5;

/// Tunable run behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct OrchestratorConfig {
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<NonZeroUsize>,
    /// Abort when `failed / attempted` is strictly greater than this.
    pub max_failure_fraction: f64,
    /// Days of history fetched before `as_of`; `None` fetches everything
    /// up to `as_of`.
    ///
    /// Attribute, enforcement and permit features read the full history,
    /// so a bound here also truncates those.
    pub lookback_days: Option<u32>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: None,
            max_failure_fraction: DEFAULT_MAX_FAILURE_FRACTION,
            lookback_days: None,
        }
    }
}

/// Shared flag used to stop a run early.
///
/// Workers check the flag before each property. Properties not yet started
/// when it is raised are reported as unprocessed and get no new state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Report whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Which properties to score and as of when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochRequest {
    /// Label of the scoring period.
    pub epoch: Epoch,
    /// Cut-off for records; later events are ignored.
    pub as_of: DateTime<Utc>,
    /// Properties to score. Duplicates are skipped.
    pub property_ids: Vec<PropertyId>,
}

/// Borrowed collaborators for a run.
#[derive(Clone, Copy)]
pub struct ScoringInputs<'a> {
    /// Source of raw records.
    pub provider: &'a dyn RecordProvider,
    /// City schema for normalization.
    pub schema_map: &'a SchemaMap,
    /// Feature construction.
    pub features: &'a FeatureBuilder,
    /// Trained model.
    pub model: &'a dyn RiskModel,
    /// Category bands.
    pub thresholds: &'a ThresholdConfig,
    /// Alerting rules.
    pub monitor: &'a ChangeMonitor,
}

/// Kind of per-property failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FailureKind {
    /// The record provider failed.
    RecordRetrieval,
    /// The feature vector did not match the model schema.
    ShapeMismatch,
}

/// A property that could not be scored.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PropertyFailure {
    /// Affected property.
    pub property_id: PropertyId,
    /// What went wrong.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunReport {
    /// Scoring period.
    pub epoch: Epoch,
    /// Properties processed, successfully or not.
    pub attempted: usize,
    /// Properties that produced a score.
    pub scored: usize,
    /// Duplicate property ids ignored.
    pub skipped: usize,
    /// Properties that failed.
    pub failed: usize,
    /// Raw records the normalizer rejected.
    pub rejected_records: usize,
    /// Whether the run was cancelled before finishing.
    pub cancelled: bool,
    /// Failures ordered by property id.
    pub failures: Vec<PropertyFailure>,
    /// Properties never started because of cancellation.
    pub unprocessed: Vec<PropertyId>,
}

/// Everything a successful run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochOutcome {
    /// Scores ordered by property id.
    pub results: Vec<ScoreResult>,
    /// Alerts ordered by property id, then emission order.
    pub alerts: Vec<AlertEvent>,
    /// States to commit, ordered by property id.
    pub updated_states: Vec<PropertyRiskState>,
    /// Run summary.
    pub report: RunReport,
}

/// Whole-run failure; nothing should be committed.
#[derive(Debug, Error)]
pub enum RunError {
    /// More properties failed than the configuration tolerates.
    #[error("{failed} of {attempted} properties failed, above the limit of {max_fraction}")]
    TooManyFailures {
        /// Failed properties.
        failed: usize,
        /// Processed properties.
        attempted: usize,
        /// Configured limit.
        max_fraction: f64,
        /// Report of the aborted run.
        report: Box<RunReport>,
    },
    /// Prior state could not be loaded.
    #[error("failed to load prior risk state")]
    LoadState {
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Updated state could not be committed.
    #[error("failed to commit updated risk state")]
    CommitState {
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// A scoring thread panicked.
    #[error("scoring worker panicked")]
    WorkerPanicked,
}

enum PropertyOutcome {
    Scored {
        result: ScoreResult,
        transition: Transition,
        rejected: usize,
    },
    Failed {
        failure: PropertyFailure,
        rejected: usize,
    },
    Unprocessed(PropertyId),
}

/// Runs scoring epochs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Validate `config` and build an orchestrator.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidFailureFraction`] when the fraction is
    /// outside `[0, 1]` and [`ConfigError::InvalidLookback`] for a lookback
    /// of zero days or more than [`MAX_LOOKBACK_DAYS`].
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        let fraction = config.max_failure_fraction;
        if !(fraction.is_finite() && (0.0..=1.0).contains(&fraction)) {
            return Err(ConfigError::InvalidFailureFraction { value: fraction });
        }
        if let Some(days) = config.lookback_days
            && !(1..=MAX_LOOKBACK_DAYS).contains(&days)
        {
            return Err(ConfigError::InvalidLookback { value: days });
        }
        Ok(Self { config })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> OrchestratorConfig {
        self.config
    }

    /// Score every property in `request` against `prior`.
    ///
    /// `prior` is read-only: the returned `updated_states` reflect this run
    /// only and must be committed separately.
    ///
    /// # Errors
    /// Returns [`RunError::TooManyFailures`] when the failure fraction
    /// exceeds the configured limit and [`RunError::WorkerPanicked`] if a
    /// scoring thread panics.
    pub fn run_epoch(
        &self,
        request: &EpochRequest,
        inputs: &ScoringInputs<'_>,
        prior: &StateSnapshot,
        cancel: &CancellationToken,
    ) -> Result<EpochOutcome, RunError> {
        let unique: Vec<&PropertyId> = request
            .property_ids
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let skipped = request.property_ids.len().saturating_sub(unique.len());
        info!(
            "Starting scoring epoch: epoch={}, properties={}, skipped={skipped}",
            request.epoch,
            unique.len()
        );
        if inputs.model.schema() != inputs.features.schema() {
            warn!(
                "Model schema differs from feature schema: model_version={}",
                inputs.model.model_version()
            );
        }

        let outcomes = self.process_all(&unique, request, inputs, prior, cancel)?;
        let outcome = merge(request.epoch.clone(), skipped, outcomes);
        let report = &outcome.report;
        info!(
            "Finished scoring epoch: epoch={}, attempted={}, scored={}, failed={}, rejected_records={}, cancelled={}",
            report.epoch,
            report.attempted,
            report.scored,
            report.failed,
            report.rejected_records,
            report.cancelled
        );

        let (failed, attempted) = (report.failed, report.attempted);
        if self.exceeds_failure_limit(failed, attempted) {
            return Err(RunError::TooManyFailures {
                failed,
                attempted,
                max_fraction: self.config.max_failure_fraction,
                report: Box::new(outcome.report),
            });
        }
        Ok(outcome)
    }

    fn process_all(
        &self,
        ids: &[&PropertyId],
        request: &EpochRequest,
        inputs: &ScoringInputs<'_>,
        prior: &StateSnapshot,
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyOutcome>, RunError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self
            .config
            .workers
            .or_else(|| thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get);
        let shard_len = ids.len().div_ceil(workers).max(1);
        let window = TimeWindow::history(request.as_of, self.config.lookback_days);

        thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(shard_len)
                .map(|shard| {
                    scope.spawn(move || {
                        shard
                            .iter()
                            .map(|id| score_property(id, request, inputs, prior, window, cancel))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            // Join every shard before reporting a panic so none is left for
            // the scope to re-raise.
            let joined: Vec<_> = handles
                .into_iter()
                .map(thread::ScopedJoinHandle::join)
                .collect();
            let mut outcomes = Vec::with_capacity(ids.len());
            for result in joined {
                let Ok(shard) = result else {
                    return Err(RunError::WorkerPanicked);
                };
                outcomes.extend(shard);
            }
            Ok(outcomes)
        })
    }

    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "failure fraction compares counts against a configured ratio"
    )]
    fn exceeds_failure_limit(&self, failed: usize, attempted: usize) -> bool {
        attempted > 0 && failed as f64 > self.config.max_failure_fraction * attempted as f64
    }
}

fn score_property(
    property_id: &PropertyId,
    request: &EpochRequest,
    inputs: &ScoringInputs<'_>,
    prior: &StateSnapshot,
    window: TimeWindow,
    cancel: &CancellationToken,
) -> PropertyOutcome {
    if cancel.is_cancelled() {
        return PropertyOutcome::Unprocessed(property_id.clone());
    }
    let raw = match inputs.provider.fetch(property_id, window) {
        Ok(raw) => raw,
        Err(error) => {
            return PropertyOutcome::Failed {
                failure: failure(property_id, FailureKind::RecordRetrieval, &error),
                rejected: 0,
            };
        }
    };
    let normalized = normalize(&raw, inputs.schema_map);
    let rejected = normalized.rejected.len();
    let vector = inputs.features.build(
        property_id,
        &request.epoch,
        request.as_of,
        &normalized.records,
    );
    let probability = match inputs.model.score(&vector) {
        Ok(probability) => probability,
        Err(error) => {
            return PropertyOutcome::Failed {
                failure: failure(property_id, FailureKind::ShapeMismatch, &error),
                rejected,
            };
        }
    };
    let result = ScoreResult {
        property_id: property_id.clone(),
        epoch: request.epoch.clone(),
        probability,
        category: inputs.thresholds.classify(probability),
        model_version: inputs.model.model_version().to_owned(),
    };
    let transition =
        inputs
            .monitor
            .observe(prior.get(property_id), &result, inputs.thresholds);
    PropertyOutcome::Scored {
        result,
        transition,
        rejected,
    }
}

fn failure(
    property_id: &PropertyId,
    kind: FailureKind,
    error: &dyn std::error::Error,
) -> PropertyFailure {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    warn!("Failed to score property: property={property_id}, kind={kind:?} ({message})");
    PropertyFailure {
        property_id: property_id.clone(),
        kind,
        message,
    }
}

fn merge(epoch: Epoch, skipped: usize, outcomes: Vec<PropertyOutcome>) -> EpochOutcome {
    let mut results = Vec::new();
    let mut alerts = Vec::new();
    let mut updated_states = Vec::new();
    let mut report = RunReport {
        epoch,
        attempted: 0,
        scored: 0,
        skipped,
        failed: 0,
        rejected_records: 0,
        cancelled: false,
        failures: Vec::new(),
        unprocessed: Vec::new(),
    };
    for outcome in outcomes {
        match outcome {
            PropertyOutcome::Scored {
                result,
                transition,
                rejected,
            } => {
                report.attempted += 1;
                report.scored += 1;
                report.rejected_records += rejected;
                results.push(result);
                alerts.extend(transition.alerts);
                updated_states.push(transition.state);
            }
            PropertyOutcome::Failed { failure, rejected } => {
                report.attempted += 1;
                report.failed += 1;
                report.rejected_records += rejected;
                report.failures.push(failure);
            }
            PropertyOutcome::Unprocessed(property_id) => {
                report.cancelled = true;
                report.unprocessed.push(property_id);
            }
        }
    }
    EpochOutcome {
        results,
        alerts,
        updated_states,
        report,
    }
}

/// Couples a run with loading and committing state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine {
    orchestrator: Orchestrator,
}

impl ScoringEngine {
    /// Wrap an orchestrator.
    #[must_use]
    pub const fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Load prior state from `store`, run the epoch, then commit the updated
    /// states in a single batch.
    ///
    /// Nothing is committed when the run fails. A cancelled run commits the
    /// states of the properties it finished.
    ///
    /// # Errors
    /// Returns [`RunError::LoadState`] or [`RunError::CommitState`] for
    /// store failures and propagates [`Orchestrator::run_epoch`] errors.
    pub fn run_and_commit<S>(
        &self,
        store: &mut S,
        request: &EpochRequest,
        inputs: &ScoringInputs<'_>,
        cancel: &CancellationToken,
    ) -> Result<EpochOutcome, RunError>
    where
        S: StateStore + ?Sized,
    {
        let prior = store
            .load_all()
            .map_err(|source| RunError::LoadState { source })?;
        let outcome = self
            .orchestrator
            .run_epoch(request, inputs, &prior, cancel)?;
        store
            .commit(&outcome.updated_states)
            .map_err(|source| RunError::CommitState { source })?;
        info!(
            "Committed risk state: epoch={}, properties={}",
            request.epoch,
            outcome.updated_states.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FixedModel, MemoryProvider, attribute_row, complaint_row, enforcement_row,
        sample_schema_map,
    };
    use crate::{
        FeatureConfig, FeatureSchema, FeatureVector, MemoryStateStore, Probability, RawRecord,
        ShapeMismatchError,
    };
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use std::sync::atomic::AtomicUsize;

    /// Provider that raises the cancellation flag once it has served
    /// `after` fetches.
    struct CancellingProvider {
        inner: MemoryProvider,
        cancel: CancellationToken,
        after: usize,
        served: AtomicUsize,
    }

    impl RecordProvider for CancellingProvider {
        fn fetch(
            &self,
            property_id: &PropertyId,
            window: TimeWindow,
        ) -> Result<Vec<RawRecord>, crate::ProviderError> {
            if self.served.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.cancel.cancel();
            }
            self.inner.fetch(property_id, window)
        }
    }

    /// Model whose scoring thread dies on every property.
    struct PanickingModel {
        schema: FeatureSchema,
    }

    fn explode(property_id: &PropertyId) -> ! {
        panic!("model failure for {property_id}")
    }

    impl RiskModel for PanickingModel {
        fn schema(&self) -> &FeatureSchema {
            &self.schema
        }

        fn model_version(&self) -> &str {
            "panicking"
        }

        fn score(&self, features: &FeatureVector) -> Result<Probability, ShapeMismatchError> {
            explode(&features.property_id)
        }
    }

    struct Fixture {
        provider: MemoryProvider,
        schema_map: SchemaMap,
        features: FeatureBuilder,
        model: FixedModel,
        thresholds: ThresholdConfig,
        monitor: ChangeMonitor,
    }

    impl Fixture {
        fn inputs(&self) -> ScoringInputs<'_> {
            ScoringInputs {
                provider: &self.provider,
                schema_map: &self.schema_map,
                features: &self.features,
                model: &self.model,
                thresholds: &self.thresholds,
                monitor: &self.monitor,
            }
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0)
            .single()
            .expect("valid date")
    }

    #[fixture]
    fn fixture() -> Fixture {
        let features = FeatureBuilder::new(FeatureConfig::default()).expect("valid config");
        let model = FixedModel::new(features.schema().clone())
            .with_score("P1", 0.2)
            .with_score("P2", 0.5)
            .with_score("P3", 0.9);
        let provider = MemoryProvider::default()
            .with_row(complaint_row("P1", "2024-06-01", "noise"))
            .with_row(complaint_row("P2", "2024-06-02", "party"));
        Fixture {
            provider,
            schema_map: sample_schema_map(),
            features,
            model,
            thresholds: ThresholdConfig::default(),
            monitor: ChangeMonitor::default(),
        }
    }

    fn request(ids: &[&str]) -> EpochRequest {
        EpochRequest {
            epoch: Epoch::from("2024-07"),
            as_of: as_of(),
            property_ids: ids.iter().map(|id| PropertyId::from(*id)).collect(),
        }
    }

    #[rstest]
    fn scores_unique_properties_in_order(fixture: Fixture) {
        let outcome = Orchestrator::default()
            .run_epoch(
                &request(&["P3", "P1", "P2", "P1"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &CancellationToken::new(),
            )
            .expect("run succeeds");
        let ids: Vec<&str> = outcome
            .results
            .iter()
            .map(|result| result.property_id.as_str())
            .collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
        assert_eq!(outcome.report.skipped, 1);
        assert_eq!(outcome.report.scored, 3);
        assert_eq!(outcome.updated_states.len(), 3);
        assert!(outcome.alerts.is_empty());
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(8)]
    fn worker_count_does_not_change_results(fixture: Fixture, #[case] workers: usize) {
        let config = OrchestratorConfig {
            workers: NonZeroUsize::new(workers),
            ..OrchestratorConfig::default()
        };
        let single = Orchestrator::new(OrchestratorConfig {
            workers: NonZeroUsize::new(1),
            ..OrchestratorConfig::default()
        })
        .expect("valid config");
        let parallel = Orchestrator::new(config).expect("valid config");
        let ids = request(&["P1", "P2", "P3", "P4", "P5"]);
        let run = |orchestrator: Orchestrator| {
            orchestrator
                .run_epoch(
                    &ids,
                    &fixture.inputs(),
                    &StateSnapshot::new(),
                    &CancellationToken::new(),
                )
                .expect("run succeeds")
        };
        assert_eq!(run(single), run(parallel));
    }

    #[rstest]
    fn too_many_failures_abort(mut fixture: Fixture) {
        fixture.provider = fixture.provider.failing_for("P1").failing_for("P2");
        let err = Orchestrator::default()
            .run_epoch(
                &request(&["P1", "P2", "P3"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &CancellationToken::new(),
            )
            .expect_err("run aborts");
        match err {
            RunError::TooManyFailures {
                failed,
                attempted,
                report,
                ..
            } => {
                assert_eq!((failed, attempted), (2, 3));
                assert!(report
                    .failures
                    .iter()
                    .all(|failure| failure.kind == FailureKind::RecordRetrieval));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[rstest]
    fn half_failures_are_tolerated(mut fixture: Fixture) {
        fixture.provider = fixture.provider.failing_for("P1");
        let outcome = Orchestrator::default()
            .run_epoch(
                &request(&["P1", "P2"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &CancellationToken::new(),
            )
            .expect("one of two failing is tolerated");
        assert_eq!(outcome.report.failed, 1);
        assert_eq!(outcome.report.scored, 1);
        let failure = outcome.report.failures.first().expect("failure recorded");
        assert_eq!(failure.property_id, PropertyId::from("P1"));
    }

    #[rstest]
    fn shape_mismatch_is_reported_per_property(mut fixture: Fixture) {
        fixture.model = FixedModel::new(crate::FeatureSchema::new(vec!["other".into()]));
        let config = OrchestratorConfig {
            max_failure_fraction: 1.0,
            ..OrchestratorConfig::default()
        };
        let outcome = Orchestrator::new(config)
            .expect("valid config")
            .run_epoch(
                &request(&["P1"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &CancellationToken::new(),
            )
            .expect("run tolerates failures");
        let failure = outcome.report.failures.first().expect("failure recorded");
        assert_eq!(failure.kind, FailureKind::ShapeMismatch);
        assert!(outcome.updated_states.is_empty());
    }

    #[rstest]
    fn cancelled_run_leaves_properties_unprocessed(fixture: Fixture) {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = Orchestrator::default()
            .run_epoch(
                &request(&["P1", "P2"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &cancel,
            )
            .expect("cancelled run still reports");
        assert!(outcome.report.cancelled);
        assert_eq!(outcome.report.attempted, 0);
        assert_eq!(
            outcome.report.unprocessed,
            vec![PropertyId::from("P1"), PropertyId::from("P2")]
        );
        assert!(outcome.updated_states.is_empty());
    }

    #[rstest]
    fn engine_commits_once_on_success(fixture: Fixture) {
        let mut store = MemoryStateStore::default();
        let engine = ScoringEngine::default();
        let outcome = engine
            .run_and_commit(
                &mut store,
                &request(&["P1", "P3"]),
                &fixture.inputs(),
                &CancellationToken::new(),
            )
            .expect("run succeeds");
        assert_eq!(store.commit_count(), 1);
        let state = store.get(&PropertyId::from("P3")).expect("state stored");
        assert_eq!(state.last_category, "high");
        assert_eq!(state.last_probability, Probability::saturating(0.9));
        assert_eq!(outcome.report.scored, 2);
    }

    #[rstest]
    fn engine_skips_commit_on_failure(mut fixture: Fixture) {
        fixture.provider = fixture.provider.failing_for("P1");
        let mut store = MemoryStateStore::default();
        let result = ScoringEngine::default().run_and_commit(
            &mut store,
            &request(&["P1"]),
            &fixture.inputs(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(RunError::TooManyFailures { .. })));
        assert_eq!(store.commit_count(), 0);
    }

    #[rstest]
    #[case(OrchestratorConfig { max_failure_fraction: 1.5, ..OrchestratorConfig::default() })]
    #[case(OrchestratorConfig { max_failure_fraction: f64::NAN, ..OrchestratorConfig::default() })]
    #[case(OrchestratorConfig { lookback_days: Some(0), ..OrchestratorConfig::default() })]
    #[case(OrchestratorConfig { lookback_days: Some(MAX_LOOKBACK_DAYS + 1), ..OrchestratorConfig::default() })]
    #[case(OrchestratorConfig { lookback_days: Some(u32::MAX), ..OrchestratorConfig::default() })]
    fn rejects_invalid_config(#[case] config: OrchestratorConfig) {
        assert!(Orchestrator::new(config).is_err());
    }

    #[rstest]
    #[case(None)]
    #[case(Some(1))]
    #[case(Some(MAX_LOOKBACK_DAYS))]
    fn accepts_supported_lookbacks(#[case] lookback_days: Option<u32>) {
        let config = OrchestratorConfig {
            lookback_days,
            ..OrchestratorConfig::default()
        };
        assert!(Orchestrator::new(config).is_ok());
    }

    #[rstest]
    fn old_attribute_and_enforcement_records_reach_the_features(mut fixture: Fixture) {
        fixture.provider = MemoryProvider::default()
            .with_row(attribute_row("P1", "2018-01-01", 4))
            .with_row(enforcement_row("P1", "2012-05-01", 3))
            .with_row(enforcement_row("P1", "2023-02-01", 1));
        Orchestrator::default()
            .run_epoch(
                &request(&["P1"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &CancellationToken::new(),
            )
            .expect("run succeeds");

        let vector = fixture.model.seen("P1").expect("P1 was scored");
        assert_eq!(vector.get("has_attributes"), Some(1.0));
        assert_eq!(vector.get("bedrooms"), Some(4.0));
        assert_eq!(vector.get("enforcement_count"), Some(2.0));
        assert_eq!(vector.get("enforcement_max_severity"), Some(3.0));
    }

    #[rstest]
    fn bounded_lookback_drops_older_history(mut fixture: Fixture) {
        fixture.provider = MemoryProvider::default().with_row(attribute_row("P1", "2018-01-01", 4));
        let config = OrchestratorConfig {
            lookback_days: Some(365),
            ..OrchestratorConfig::default()
        };
        Orchestrator::new(config)
            .expect("valid config")
            .run_epoch(
                &request(&["P1"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &CancellationToken::new(),
            )
            .expect("run succeeds");

        let vector = fixture.model.seen("P1").expect("P1 was scored");
        assert_eq!(vector.get("has_attributes"), Some(0.0));
    }

    #[rstest]
    fn long_complaint_windows_count_all_history(mut fixture: Fixture) {
        fixture.features = FeatureBuilder::new(FeatureConfig {
            lookback_windows_days: vec![30, 3650],
            ..FeatureConfig::default()
        })
        .expect("valid config");
        fixture.model = FixedModel::new(fixture.features.schema().clone());
        fixture.provider = MemoryProvider::default()
            .with_row(complaint_row("P1", "2016-01-01", "noise"))
            .with_row(complaint_row("P1", "2020-01-01", "noise"))
            .with_row(complaint_row("P1", "2024-06-15", "party"));
        Orchestrator::default()
            .run_epoch(
                &request(&["P1"]),
                &fixture.inputs(),
                &StateSnapshot::new(),
                &CancellationToken::new(),
            )
            .expect("run succeeds");

        let vector = fixture.model.seen("P1").expect("P1 was scored");
        assert_eq!(vector.get("complaints_3650d"), Some(3.0));
        assert_eq!(vector.get("complaints_30d"), Some(1.0));
    }

    #[rstest]
    fn cancellation_mid_run_keeps_finished_properties(mut fixture: Fixture) {
        let cancel = CancellationToken::new();
        let provider = CancellingProvider {
            inner: std::mem::take(&mut fixture.provider),
            cancel: cancel.clone(),
            after: 2,
            served: AtomicUsize::new(0),
        };
        let inputs = ScoringInputs {
            provider: &provider,
            ..fixture.inputs()
        };
        let mut store = MemoryStateStore::default();
        let engine = ScoringEngine::new(
            Orchestrator::new(OrchestratorConfig {
                workers: NonZeroUsize::new(1),
                ..OrchestratorConfig::default()
            })
            .expect("valid config"),
        );

        let outcome = engine
            .run_and_commit(&mut store, &request(&["P1", "P2", "P3", "P4"]), &inputs, &cancel)
            .expect("cancelled run still commits");

        let updated: Vec<&str> = outcome
            .updated_states
            .iter()
            .map(|state| state.property_id.as_str())
            .collect();
        assert_eq!(updated, vec!["P1", "P2"]);
        assert!(outcome.report.cancelled);
        assert_eq!(outcome.report.attempted, 2);
        assert_eq!(outcome.report.scored, 2);
        assert_eq!(
            outcome.report.unprocessed,
            vec![PropertyId::from("P3"), PropertyId::from("P4")]
        );
        assert!(store.get(&PropertyId::from("P2")).is_some());
        assert!(store.get(&PropertyId::from("P3")).is_none());
    }

    #[rstest]
    fn panics_in_several_shards_are_reported_once(fixture: Fixture) {
        let model = PanickingModel {
            schema: fixture.features.schema().clone(),
        };
        let inputs = ScoringInputs {
            model: &model,
            ..fixture.inputs()
        };
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            workers: NonZeroUsize::new(2),
            ..OrchestratorConfig::default()
        })
        .expect("valid config");

        let result = orchestrator.run_epoch(
            &request(&["P1", "P2"]),
            &inputs,
            &StateSnapshot::new(),
            &CancellationToken::new(),
        );

        assert!(matches!(result, Err(RunError::WorkerPanicked)));
    }
}
