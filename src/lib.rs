//! Facade crate for the nuisance risk engine.
//!
//! This crate re-exports the core domain types and exposes the logistic
//! model, the file-backed data layer and the SQLite state store behind
//! feature flags.

#![forbid(unsafe_code)]

pub use nuisance_core::{
    AlertEvent, AlertReason, CancellationToken, CanonicalRecord, ChangeMonitor, ConfigError,
    Epoch, EpochOutcome, EpochRequest, FeatureBuilder, FeatureConfig, FeatureConfigError,
    FeatureSchema, FeatureVector, FieldKind, FieldValue, LabelledExample, MemoryStateStore,
    MonitorPolicy, Orchestrator, OrchestratorConfig, Probability, PropertyId, PropertyRiskState,
    ProviderError, RawRecord, RawValue, RecordProvider, RecordType, RiskCategory, RiskModel,
    RunError, RunReport, SchemaMap, ScoreResult, ScoringEngine, ScoringInputs, SourceSchema,
    StateStore, StoreError, ThresholdBand, ThresholdConfig, TimeWindow, Trainer, normalize,
};

#[cfg(feature = "store-sqlite")]
pub use nuisance_core::SqliteStateStore;

#[cfg(feature = "model-logistic")]
pub use nuisance_model::{
    EvaluationReport, LogisticModel, LogisticTrainer, evaluate, load_model, save_model,
    split_train_test,
};

#[cfg(feature = "data")]
pub use nuisance_data::{
    CityConfig, EpochSummary, FileRecordProvider, SyntheticConfig, build_training_examples,
    export_epoch, generate_city, load_labels, write_synthetic_city,
};
