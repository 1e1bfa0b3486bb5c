//! Data access for the nuisance risk engine.
//!
//! Responsibilities:
//! - Load city configuration from YAML ([`CityConfig`]).
//! - Read raw JSON Lines datasets and serve them through
//!   [`FileRecordProvider`].
//! - Assemble labelled training examples from outcome files.
//! - Export scores, alerts and run summaries after an epoch.
//! - Generate seeded synthetic cities for development.
//!
//! Boundaries:
//! - Domain rules live in `nuisance-core`; this crate only moves data in and
//!   out of it.
//! - Model training and persistence live in `nuisance-model`.

#![forbid(unsafe_code)]

pub mod config;
pub mod dataset;
pub mod export;
pub mod labels;
pub mod provider;
pub mod synthetic;

pub use config::{CityConfig, CityConfigError, DEFAULT_DATASET_CATEGORY, DatasetConfig, LabelsConfig};
pub use dataset::{DatasetError, encode_jsonl, load_jsonl, load_jsonl_as, write_jsonl};
pub use export::{CategoryCount, EpochSummary, ExportError, ExportedFiles, export_epoch};
pub use labels::{
    LabelError, OutcomeLabel, TrainingWindow, build_training_examples, load_labels,
};
pub use provider::FileRecordProvider;
pub use synthetic::{
    CITY_FILE, ComplaintRow, DEFAULT_SEED, EnforcementRow, ParcelRow, PermitRow, SyntheticCity,
    SyntheticConfig, SyntheticError, generate_city, write_synthetic_city,
};
