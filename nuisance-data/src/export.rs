//! Files written after a scoring epoch.
//!
//! For epoch `E` the exporter writes, into one output directory:
//!
//! - `scores_E.jsonl`: every [`ScoreResult`], ordered by property id.
//! - `high_risk_E.jsonl`: the scores that landed in the top category.
//! - `alerts_E.jsonl`: every alert raised by the change monitor.
//! - `report_E.json`: an [`EpochSummary`] with per-category counts.
//!
//! Characters outside `[A-Za-z0-9_-]` in the epoch label are replaced with
//! `_` in file names. Every file is replaced atomically.

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use nuisance_core::{Epoch, EpochOutcome, RunReport, ScoreResult, ThresholdConfig};
use serde::Serialize;
use thiserror::Error;

use crate::dataset::{DatasetError, write_jsonl};

/// Errors raised while exporting an epoch.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A JSON Lines file could not be written.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// The summary could not be serialised.
    #[error("failed to serialise epoch summary for {path}")]
    Serialise {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// The summary could not be written.
    #[error("failed to write epoch summary at {path}")]
    Write {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
}

/// Number of properties that landed in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    /// Category name.
    pub category: String,
    /// Properties assigned to it.
    pub properties: usize,
}

/// Headline figures for one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochSummary {
    /// City that was scored.
    pub city_name: String,
    /// Scoring period.
    pub epoch: Epoch,
    /// Version of the model behind the scores, absent when nothing scored.
    pub model_version: Option<String>,
    /// Counts for every configured category, lowest risk first.
    pub categories: Vec<CategoryCount>,
    /// Scores in the top category.
    pub high_risk: usize,
    /// Alerts raised.
    pub alerts: usize,
    /// Run report from the orchestrator.
    pub report: RunReport,
}

impl EpochSummary {
    /// Summarise `outcome` against the bands in `thresholds`.
    #[must_use]
    pub fn new(city_name: &str, outcome: &EpochOutcome, thresholds: &ThresholdConfig) -> Self {
        let categories = thresholds
            .bands()
            .iter()
            .map(|band| CategoryCount {
                category: band.name.clone(),
                properties: outcome
                    .results
                    .iter()
                    .filter(|result| result.category.name() == band.name)
                    .count(),
            })
            .collect();
        Self {
            city_name: city_name.to_owned(),
            epoch: outcome.report.epoch.clone(),
            model_version: outcome
                .results
                .first()
                .map(|result| result.model_version.clone()),
            categories,
            high_risk: high_risk(outcome, thresholds).len(),
            alerts: outcome.alerts.len(),
            report: outcome.report.clone(),
        }
    }
}

/// Paths written by [`export_epoch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFiles {
    /// Every score.
    pub scores: Utf8PathBuf,
    /// Top-category scores.
    pub high_risk: Utf8PathBuf,
    /// Alerts.
    pub alerts: Utf8PathBuf,
    /// Epoch summary.
    pub summary: Utf8PathBuf,
}

impl ExportedFiles {
    fn in_dir(dir: &Utf8Path, epoch: &Epoch) -> Self {
        let label = file_label(epoch);
        Self {
            scores: dir.join(format!("scores_{label}.jsonl")),
            high_risk: dir.join(format!("high_risk_{label}.jsonl")),
            alerts: dir.join(format!("alerts_{label}.jsonl")),
            summary: dir.join(format!("report_{label}.json")),
        }
    }
}

/// Write the scores, alerts and summary of an epoch into `dir`.
///
/// # Errors
/// Returns [`ExportError`] when any file cannot be written.
pub fn export_epoch(
    dir: &Utf8Path,
    city_name: &str,
    outcome: &EpochOutcome,
    thresholds: &ThresholdConfig,
) -> Result<ExportedFiles, ExportError> {
    let files = ExportedFiles::in_dir(dir, &outcome.report.epoch);
    let top = high_risk(outcome, thresholds);
    write_jsonl(&files.scores, &outcome.results)?;
    write_jsonl(&files.high_risk, &top)?;
    write_jsonl(&files.alerts, &outcome.alerts)?;

    let summary = EpochSummary::new(city_name, outcome, thresholds);
    let bytes = serde_json::to_vec_pretty(&summary).map_err(|source| ExportError::Serialise {
        path: files.summary.clone(),
        source,
    })?;
    nuisance_fs::write_atomic(&files.summary, &bytes).map_err(|source| ExportError::Write {
        path: files.summary.clone(),
        source,
    })?;

    info!(
        "exported epoch {} for {city_name}: {} scores, {} high risk, {} alerts",
        summary.epoch,
        outcome.results.len(),
        summary.high_risk,
        summary.alerts
    );
    Ok(files)
}

fn high_risk<'a>(outcome: &'a EpochOutcome, thresholds: &ThresholdConfig) -> Vec<&'a ScoreResult> {
    outcome
        .results
        .iter()
        .filter(|result| thresholds.is_top(&result.category))
        .collect()
}

fn file_label(epoch: &Epoch) -> String {
    epoch
        .as_str()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
