//! Seeded synthetic city for development and tests.
//!
//! Each property draws a latent complaint rate from a gamma distribution.
//! Its complaint count is Poisson with that rate and its nuisance outcome is
//! Bernoulli with a probability that grows with the rate, so complaint
//! history carries real signal for a model to learn. The same seed always
//! yields the same city.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use log::info;
use nuisance_core::{FieldKind, MAX_LOOKBACK_DAYS, PropertyId, RecordType, SourceSchema};
use rand::distributions::{Bernoulli, Distribution};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Gamma, Poisson};
use serde::Serialize;
use thiserror::Error;

use crate::config::{CityConfig, DatasetConfig, LabelsConfig};
use crate::dataset::{DatasetError, write_jsonl};
use crate::labels::OutcomeLabel;

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 42;

/// File name of the generated city configuration.
pub const CITY_FILE: &str = "city.yaml";

const COMPLAINT_TYPES: [&str; 4] = ["Noise", "Parking", "Trash", "Party"];
const PROPERTY_TYPES: [&str; 3] = ["Single Family", "Condo", "Townhouse"];
const ZONING: [&str; 3] = ["Residential", "Mixed Use", "Commercial"];
const PERMIT_TYPES: [&str; 3] = ["renovation", "str_license", "pool"];
const OPEN_COMPLAINT_SHARE: f64 = 0.2;
const OWNER_OCCUPIED_SHARE: f64 = 0.3;
const RATE_SHAPE: f64 = 2.0;
const MAX_COMPLAINTS: f64 = 60.0;
const ENFORCEMENT_WINDOW_DAYS: i64 = 365;
/// 2024-06-01T00:00:00Z.
const DEFAULT_AS_OF_SECONDS: i64 = 1_717_200_000;

/// Shape of the generated city.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// City name written to the configuration.
    pub city_name: String,
    /// Random seed.
    pub seed: u64,
    /// Number of properties.
    pub properties: usize,
    /// Mean complaints per property over the whole span.
    pub mean_complaints: f64,
    /// Days of history before `as_of`.
    pub span_days: u32,
    /// Last instant of generated history.
    pub as_of: DateTime<Utc>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            city_name: "Synthetic City".to_owned(),
            seed: DEFAULT_SEED,
            properties: 1000,
            mean_complaints: 3.0,
            span_days: 730,
            as_of: DateTime::from_timestamp(DEFAULT_AS_OF_SECONDS, 0).unwrap_or_default(),
        }
    }
}

/// Errors raised while generating a synthetic city.
#[derive(Debug, Error)]
pub enum SyntheticError {
    /// A generator setting was out of range.
    #[error("invalid synthetic setting {name}: {value}")]
    InvalidParameter {
        /// Setting name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
    /// A dataset could not be written.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// The city configuration could not be serialised.
    #[error("failed to serialise city configuration for {path}")]
    Serialise {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from `serde_yaml`.
        #[source]
        source: serde_yaml::Error,
    },
    /// The city configuration could not be written.
    #[error("failed to write city configuration at {path}")]
    Write {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
}

/// Complaint row as a city portal would publish it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplaintRow {
    /// Complaint identifier.
    pub complaint_id: String,
    /// Subject property.
    pub property_id: String,
    /// Date the complaint was filed.
    pub complaint_date: String,
    /// Complaint type, e.g. `Noise`.
    pub complaint_type: String,
    /// `Open` or `Closed`.
    pub status: String,
}

/// Parcel attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParcelRow {
    /// Property identifier.
    pub property_id: String,
    /// Date the attributes were recorded.
    pub recorded_at: String,
    /// Bedroom count.
    pub bedrooms: i64,
    /// Dwelling type.
    pub property_type: String,
    /// Zoning class.
    pub zoning: String,
    /// Whether the owner lives on site.
    pub owner_occupied: bool,
}

/// Issued permit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermitRow {
    /// Permit identifier.
    pub permit_id: String,
    /// Subject property.
    pub property_id: String,
    /// Issue date.
    pub issued_on: String,
    /// Permit type.
    pub permit_type: String,
}

/// Enforcement action taken against a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforcementRow {
    /// Case identifier.
    pub case_id: String,
    /// Subject property.
    pub property_id: String,
    /// Date of the action.
    pub action_date: String,
    /// Severity from 1 (warning) to 3 (citation).
    pub severity: i64,
}

/// Every dataset of a generated city.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyntheticCity {
    /// Complaints.
    pub complaints: Vec<ComplaintRow>,
    /// One parcel row per property.
    pub parcels: Vec<ParcelRow>,
    /// Permits.
    pub permits: Vec<PermitRow>,
    /// Enforcement actions.
    pub enforcement: Vec<EnforcementRow>,
    /// One outcome per property.
    pub labels: Vec<OutcomeLabel>,
}

impl SyntheticConfig {
    fn validate(&self) -> Result<(), SyntheticError> {
        if self.properties == 0 {
            return Err(invalid("properties", self.properties.to_string()));
        }
        if !(self.mean_complaints.is_finite() && self.mean_complaints > 0.0) {
            return Err(invalid("mean_complaints", self.mean_complaints.to_string()));
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.span_days) {
            return Err(invalid("span_days", self.span_days.to_string()));
        }
        Ok(())
    }
}

const fn invalid(name: &'static str, value: String) -> SyntheticError {
    SyntheticError::InvalidParameter { name, value }
}

/// `days` before `as_of`, saturating at the earliest representable instant.
fn days_back(as_of: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    as_of
        .checked_sub_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn day(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn pick<'a>(rng: &mut ChaCha8Rng, options: &[&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

/// Generate a city.
///
/// # Errors
/// Returns [`SyntheticError::InvalidParameter`] for an empty city, a
/// non-positive complaint mean, or a span of zero days or more than
/// [`MAX_LOOKBACK_DAYS`].
///
/// # Examples
/// ```
/// use nuisance_data::{SyntheticConfig, generate_city};
///
/// let config = SyntheticConfig { properties: 20, ..SyntheticConfig::default() };
/// let city = generate_city(&config).unwrap();
/// assert_eq!(city.parcels.len(), 20);
/// assert_eq!(city, generate_city(&config).unwrap());
/// ```
#[expect(
    clippy::float_arithmetic,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "rates are sampled as floats and complaint counts are clamped before casting"
)]
pub fn generate_city(config: &SyntheticConfig) -> Result<SyntheticCity, SyntheticError> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let rates = Gamma::new(RATE_SHAPE, config.mean_complaints / RATE_SHAPE)
        .map_err(|_| invalid("mean_complaints", config.mean_complaints.to_string()))?;
    let span = i64::from(config.span_days);
    let mut city = SyntheticCity::default();

    for index in 0..config.properties {
        let property_id = format!("P{:05}", index + 1);
        let rate: f64 = rates.sample(&mut rng);
        let count = Poisson::new(rate.max(f64::MIN_POSITIVE))
            .map_or(0.0, |poisson| -> f64 { poisson.sample(&mut rng) })
            .min(MAX_COMPLAINTS) as usize;
        let nuisance_probability = (rate / (rate + config.mean_complaints)).clamp(0.02, 0.98);

        for complaint in 0..count {
            let filed = days_back(config.as_of, rng.gen_range(0..span));
            city.complaints.push(ComplaintRow {
                complaint_id: format!("{property_id}-C{complaint:03}"),
                property_id: property_id.clone(),
                complaint_date: day(filed),
                complaint_type: pick(&mut rng, &COMPLAINT_TYPES).to_owned(),
                status: if rng.gen_bool(OPEN_COMPLAINT_SHARE) {
                    "Open"
                } else {
                    "Closed"
                }
                .to_owned(),
            });
        }

        city.parcels.push(ParcelRow {
            property_id: property_id.clone(),
            recorded_at: day(days_back(config.as_of, span)),
            bedrooms: rng.gen_range(2..=5),
            property_type: pick(&mut rng, &PROPERTY_TYPES).to_owned(),
            zoning: pick(&mut rng, &ZONING).to_owned(),
            owner_occupied: rng.gen_bool(OWNER_OCCUPIED_SHARE),
        });

        for permit in 0..rng.gen_range(0..=2_u32) {
            let issued = days_back(config.as_of, rng.gen_range(0..span));
            city.permits.push(PermitRow {
                permit_id: format!("{property_id}-B{permit}"),
                property_id: property_id.clone(),
                issued_on: day(issued),
                permit_type: pick(&mut rng, &PERMIT_TYPES).to_owned(),
            });
        }

        let enforced = Bernoulli::new(nuisance_probability * 0.5)
            .map_err(|_| invalid("enforcement_probability", nuisance_probability.to_string()))?;
        if enforced.sample(&mut rng) {
            let window = ENFORCEMENT_WINDOW_DAYS.min(span);
            city.enforcement.push(EnforcementRow {
                case_id: format!("{property_id}-E0"),
                property_id: property_id.clone(),
                action_date: day(days_back(config.as_of, rng.gen_range(0..window))),
                severity: rng.gen_range(1..=3),
            });
        }

        let outcome = Bernoulli::new(nuisance_probability)
            .map_err(|_| invalid("nuisance_probability", nuisance_probability.to_string()))?;
        city.labels.push(OutcomeLabel {
            property_id: PropertyId::new(property_id),
            outcome: outcome.sample(&mut rng),
        });
    }

    info!(
        "generated {} properties with {} complaints for {}",
        config.properties,
        city.complaints.len(),
        config.city_name
    );
    Ok(city)
}

impl SyntheticCity {
    /// City configuration describing the generated datasets.
    ///
    /// Dataset paths are file names relative to the configuration file.
    #[must_use]
    pub fn city_config(&self, config: &SyntheticConfig) -> CityConfig {
        let dataset = |path: &str, category: &str, description: &str, schema: SourceSchema| {
            DatasetConfig {
                path: Utf8PathBuf::from(path),
                category: category.to_owned(),
                description: Some(description.to_owned()),
                schema,
            }
        };
        let datasets = BTreeMap::from([
            (
                "complaints".to_owned(),
                dataset(
                    "complaints.jsonl",
                    "complaints",
                    "Code enforcement complaints",
                    SourceSchema::fixed(RecordType::Complaint, "property_id", "complaint_date")
                        .with_field("complaint_type", "category", FieldKind::Text)
                        .with_field("status", "status", FieldKind::Text),
                ),
            ),
            (
                "parcels".to_owned(),
                dataset(
                    "parcels.jsonl",
                    "properties",
                    "Assessor parcel attributes",
                    SourceSchema::fixed(
                        RecordType::PropertyAttribute,
                        "property_id",
                        "recorded_at",
                    )
                    .with_field("bedrooms", "bedrooms", FieldKind::Integer)
                    .with_field("property_type", "property_type", FieldKind::Text)
                    .with_field("zoning", "zoning", FieldKind::Text)
                    .with_field("owner_occupied", "owner_occupied", FieldKind::Boolean),
                ),
            ),
            (
                "permits".to_owned(),
                dataset(
                    "permits.jsonl",
                    "permits",
                    "Building and rental permits",
                    SourceSchema::fixed(RecordType::Permit, "property_id", "issued_on")
                        .with_field("permit_type", "permit_type", FieldKind::Text),
                ),
            ),
            (
                "enforcement".to_owned(),
                dataset(
                    "enforcement.jsonl",
                    "enforcement",
                    "Warnings and citations",
                    SourceSchema::fixed(
                        RecordType::EnforcementAction,
                        "property_id",
                        "action_date",
                    )
                    .with_field("severity", "severity", FieldKind::Integer),
                ),
            ),
        ]);
        CityConfig {
            city_name: config.city_name.clone(),
            datasets,
            features: nuisance_core::FeatureConfig::default(),
            thresholds: nuisance_core::ThresholdConfig::default(),
            monitor: nuisance_core::MonitorPolicy::default(),
            orchestrator: nuisance_core::OrchestratorConfig::default(),
            labels: Some(LabelsConfig {
                path: Utf8PathBuf::from("labels.jsonl"),
                as_of: config.as_of,
                epoch: Some("training".to_owned()),
            }),
        }
    }
}

/// Generate a city and write its datasets, labels and `city.yaml` into
/// `dir`.
///
/// Returns the path of the configuration file.
///
/// # Errors
/// Returns [`SyntheticError`] when generation or any write fails.
pub fn write_synthetic_city(
    dir: &Utf8Path,
    config: &SyntheticConfig,
) -> Result<Utf8PathBuf, SyntheticError> {
    let city = generate_city(config)?;
    write_jsonl(&dir.join("complaints.jsonl"), &city.complaints)?;
    write_jsonl(&dir.join("parcels.jsonl"), &city.parcels)?;
    write_jsonl(&dir.join("permits.jsonl"), &city.permits)?;
    write_jsonl(&dir.join("enforcement.jsonl"), &city.enforcement)?;
    write_jsonl(&dir.join("labels.jsonl"), &city.labels)?;

    let path = dir.join(CITY_FILE);
    let yaml = serde_yaml::to_string(&city.city_config(config)).map_err(|source| {
        SyntheticError::Serialise {
            path: path.clone(),
            source,
        }
    })?;
    nuisance_fs::write_atomic(&path, yaml.as_bytes()).map_err(|source| SyntheticError::Write {
        path: path.clone(),
        source,
    })?;
    info!("wrote synthetic city to {dir}");
    Ok(path)
}
