//! Bucket probabilities into ordered risk categories.
//!
//! A [`ThresholdConfig`] is a list of contiguous bands covering `[0, 1]`.
//! Every band is half-open `[lower, upper)` except the last, which is closed
//! at `1.0`, so a probability sitting exactly on a boundary belongs to the
//! higher-risk band.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Probability;

/// A named risk bucket and its position in the ordering.
///
/// Rank `0` is the lowest-risk category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RiskCategory {
    name: String,
    rank: usize,
}

impl RiskCategory {
    /// Build a category.
    pub fn new(name: impl Into<String>, rank: usize) -> Self {
        Self {
            name: name.into(),
            rank,
        }
    }

    /// Category name, e.g. `high`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the ordering; higher means riskier.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One `[lower, upper)` band of a [`ThresholdConfig`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdBand {
    /// Category name assigned to probabilities in this band.
    pub name: String,
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound; inclusive for the last band.
    pub upper: f64,
}

impl ThresholdBand {
    /// Build a band.
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
        }
    }
}

/// Serialized shape of a [`ThresholdConfig`].
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ThresholdConfigRepr {
    boundaries: Vec<ThresholdBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score_delta_alert_threshold: Option<f64>,
}

/// Validated, ordered risk bands.
///
/// # Examples
/// ```
/// use nuisance_core::{Probability, ThresholdConfig};
///
/// let thresholds = ThresholdConfig::default();
/// let category = thresholds.classify(Probability::new(0.3).unwrap());
/// assert_eq!(category.name(), "medium");
/// assert_eq!(category.rank(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "ThresholdConfigRepr", into = "ThresholdConfigRepr")
)]
pub struct ThresholdConfig {
    bands: Vec<ThresholdBand>,
    score_delta_alert_threshold: Option<f64>,
}

impl ThresholdConfig {
    /// Validate `bands` and build a configuration.
    ///
    /// Bands must be listed from lowest to highest risk.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the bands are empty, a name is blank or
    /// repeated, a bound is not finite, a band is empty or inverted, the
    /// bands do not start at `0` and end at `1`, or neighbouring bands leave
    /// a gap or overlap.
    pub fn new(bands: Vec<ThresholdBand>) -> Result<Self, ConfigError> {
        validate_bands(&bands)?;
        Ok(Self {
            bands,
            score_delta_alert_threshold: None,
        })
    }

    /// Attach a score-delta alert threshold.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidDeltaThreshold`] unless `delta` lies in
    /// `(0, 1]`.
    pub fn with_delta_threshold(mut self, delta: f64) -> Result<Self, ConfigError> {
        if !(delta.is_finite() && delta > 0.0 && delta <= 1.0) {
            return Err(ConfigError::InvalidDeltaThreshold { value: delta });
        }
        self.score_delta_alert_threshold = Some(delta);
        Ok(self)
    }

    /// Bands from lowest to highest risk.
    #[must_use]
    pub fn bands(&self) -> &[ThresholdBand] {
        &self.bands
    }

    /// Minimum probability change that raises a delta alert within an
    /// unchanged category.
    #[must_use]
    pub const fn score_delta_alert_threshold(&self) -> Option<f64> {
        self.score_delta_alert_threshold
    }

    /// Map a probability to its category.
    #[must_use]
    pub fn classify(&self, probability: Probability) -> RiskCategory {
        let value = probability.get();
        let top = self.top_rank();
        let rank = self
            .bands
            .iter()
            .position(|band| value >= band.lower && value < band.upper)
            .unwrap_or(top);
        self.category_at(rank)
    }

    /// The highest-risk category.
    #[must_use]
    pub fn top_category(&self) -> RiskCategory {
        self.category_at(self.top_rank())
    }

    /// Look up a category by name.
    #[must_use]
    pub fn category(&self, name: &str) -> Option<RiskCategory> {
        self.bands
            .iter()
            .position(|band| band.name == name)
            .map(|rank| self.category_at(rank))
    }

    /// Report whether `category` is the highest-risk category.
    #[must_use]
    pub fn is_top(&self, category: &RiskCategory) -> bool {
        category.rank() == self.top_rank()
    }

    fn top_rank(&self) -> usize {
        self.bands.len().saturating_sub(1)
    }

    fn category_at(&self, rank: usize) -> RiskCategory {
        let name = self
            .bands
            .get(rank)
            .map_or_else(String::new, |band| band.name.clone());
        RiskCategory::new(name, rank)
    }
}

impl Default for ThresholdConfig {
    /// Low `[0, 0.3)`, medium `[0.3, 0.7)`, high `[0.7, 1]`.
    fn default() -> Self {
        Self {
            bands: vec![
                ThresholdBand::new("low", 0.0, 0.3),
                ThresholdBand::new("medium", 0.3, 0.7),
                ThresholdBand::new("high", 0.7, 1.0),
            ],
            score_delta_alert_threshold: None,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<ThresholdConfigRepr> for ThresholdConfig {
    type Error = ConfigError;

    fn try_from(repr: ThresholdConfigRepr) -> Result<Self, Self::Error> {
        let config = Self::new(repr.boundaries)?;
        match repr.score_delta_alert_threshold {
            Some(delta) => config.with_delta_threshold(delta),
            None => Ok(config),
        }
    }
}

#[cfg(feature = "serde")]
impl From<ThresholdConfig> for ThresholdConfigRepr {
    fn from(config: ThresholdConfig) -> Self {
        Self {
            boundaries: config.bands,
            score_delta_alert_threshold: config.score_delta_alert_threshold,
        }
    }
}

#[expect(clippy::float_cmp, reason = "outer bounds must be exactly 0 and 1")]
fn validate_bands(bands: &[ThresholdBand]) -> Result<(), ConfigError> {
    let (Some(first), Some(last)) = (bands.first(), bands.last()) else {
        return Err(ConfigError::EmptyBands);
    };
    for (index, band) in bands.iter().enumerate() {
        if band.name.trim().is_empty() {
            return Err(ConfigError::BlankName { index });
        }
        if bands
            .iter()
            .take(index)
            .any(|earlier| earlier.name == band.name)
        {
            return Err(ConfigError::DuplicateName {
                name: band.name.clone(),
            });
        }
        if !(band.lower.is_finite() && band.upper.is_finite()) {
            return Err(ConfigError::NonFiniteBound {
                name: band.name.clone(),
            });
        }
        if band.lower >= band.upper {
            return Err(ConfigError::EmptyBand {
                name: band.name.clone(),
                lower: band.lower,
                upper: band.upper,
            });
        }
    }
    if first.lower != 0.0 {
        return Err(ConfigError::DoesNotStartAtZero { lower: first.lower });
    }
    if last.upper != 1.0 {
        return Err(ConfigError::DoesNotEndAtOne { upper: last.upper });
    }
    for pair in bands.windows(2) {
        let [below, above] = pair else { continue };
        if above.lower > below.upper {
            return Err(ConfigError::Gap {
                below: below.name.clone(),
                above: above.name.clone(),
                from: below.upper,
                to: above.lower,
            });
        }
        if above.lower < below.upper {
            return Err(ConfigError::Overlap {
                below: below.name.clone(),
                above: above.name.clone(),
            });
        }
    }
    Ok(())
}

/// Error raised for invalid threshold or monitoring configuration.
///
/// These errors are fatal for a run and surface when configuration loads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// No bands were configured.
    #[error("threshold configuration has no bands")]
    EmptyBands,
    /// A band has an empty name.
    #[error("band {index} has a blank name")]
    BlankName {
        /// Zero-based position of the band.
        index: usize,
    },
    /// Two bands share a name.
    #[error("band name '{name}' is used more than once")]
    DuplicateName {
        /// Repeated name.
        name: String,
    },
    /// A bound is NaN or infinite.
    #[error("band '{name}' has a non-finite bound")]
    NonFiniteBound {
        /// Offending band.
        name: String,
    },
    /// A band's lower bound is not below its upper bound.
    #[error("band '{name}' is empty: lower {lower} must be below upper {upper}")]
    EmptyBand {
        /// Offending band.
        name: String,
        /// Configured lower bound.
        lower: f64,
        /// Configured upper bound.
        upper: f64,
    },
    /// The lowest band does not start at zero.
    #[error("lowest band must start at 0, found {lower}")]
    DoesNotStartAtZero {
        /// Configured lower bound.
        lower: f64,
    },
    /// The highest band does not end at one.
    #[error("highest band must end at 1, found {upper}")]
    DoesNotEndAtOne {
        /// Configured upper bound.
        upper: f64,
    },
    /// Neighbouring bands leave part of `[0, 1]` uncovered.
    #[error("gap between '{below}' and '{above}': [{from}, {to}) is not covered")]
    Gap {
        /// Lower-risk band.
        below: String,
        /// Higher-risk band.
        above: String,
        /// Start of the uncovered range.
        from: f64,
        /// End of the uncovered range.
        to: f64,
    },
    /// Neighbouring bands overlap or are listed out of order.
    #[error("bands '{below}' and '{above}' overlap")]
    Overlap {
        /// Lower-risk band.
        below: String,
        /// Higher-risk band.
        above: String,
    },
    /// The tolerated failure fraction is outside `[0, 1]`.
    #[error("max failure fraction must be in [0, 1], found {value}")]
    InvalidFailureFraction {
        /// Configured fraction.
        value: f64,
    },
    /// The record lookback is zero days or beyond the supported range.
    #[error("lookback must be between 1 and {max} days, found {value}", max = crate::MAX_LOOKBACK_DAYS)]
    InvalidLookback {
        /// Configured lookback in days.
        value: u32,
    },
    /// The score-delta alert threshold is outside `(0, 1]`.
    #[error("score delta alert threshold must be in (0, 1], found {value}")]
    InvalidDeltaThreshold {
        /// Configured threshold.
        value: f64,
    },
}
