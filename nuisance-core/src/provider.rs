//! Raw record retrieval.
//!
//! The orchestrator asks a [`RecordProvider`] for each property's raw
//! records within a [`TimeWindow`]. Providers may be backed by files, a
//! database or a remote API; retries and timeouts are their concern.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{PropertyId, RawRecord};

/// Closed interval `[start, end]` of event timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// Earliest timestamp included.
    pub start: DateTime<Utc>,
    /// Latest timestamp included.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window ending at `end` and reaching back `lookback_days`.
    ///
    /// # Examples
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use nuisance_core::TimeWindow;
    ///
    /// let end = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    /// let window = TimeWindow::lookback(end, 30);
    /// assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    /// ```
    ///
    /// A start earlier than the representable range saturates to
    /// [`DateTime::<Utc>::MIN_UTC`].
    #[must_use]
    pub fn lookback(end: DateTime<Utc>, lookback_days: u32) -> Self {
        Self {
            start: days_before(end, lookback_days),
            end,
        }
    }

    /// Window holding every event up to and including `end`.
    #[must_use]
    pub const fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end,
        }
    }

    /// Bounded window when `lookback_days` is set, otherwise all history
    /// up to `end`.
    #[must_use]
    pub fn history(end: DateTime<Utc>, lookback_days: Option<u32>) -> Self {
        lookback_days.map_or_else(|| Self::until(end), |days| Self::lookback(end, days))
    }

    /// Report whether `timestamp` falls inside the window.
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Longest lookback accepted by configuration, roughly a thousand years.
pub const MAX_LOOKBACK_DAYS: u32 = 365_000;

/// Instant `days` before `end`, saturating at the earliest representable
/// timestamp.
#[must_use]
pub fn days_before(end: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    end.checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Error raised when raw records cannot be retrieved for a property.
///
/// Retrieval failures affect a single property; the run records them and
/// carries on.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backing source could not be read.
    #[error("failed to read records for {property_id}")]
    Unavailable {
        /// Property being fetched.
        property_id: PropertyId,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The provider gave up waiting for the source.
    #[error("timed out fetching records for {property_id}")]
    Timeout {
        /// Property being fetched.
        property_id: PropertyId,
    },
}

/// Source of raw records for the scoring pipeline.
///
/// Implementations are shared by scoring threads and must be
/// `Send + Sync`.
pub trait RecordProvider: Send + Sync {
    /// Fetch raw records for `property_id` with timestamps in `window`.
    ///
    /// Records whose timestamp cannot be determined may be returned; the
    /// normalizer rejects them.
    ///
    /// # Errors
    /// Returns [`ProviderError`] when the records cannot be retrieved.
    fn fetch(
        &self,
        property_id: &PropertyId,
        window: TimeWindow,
    ) -> Result<Vec<RawRecord>, ProviderError>;
}

impl<P: RecordProvider + ?Sized> RecordProvider for &P {
    fn fetch(
        &self,
        property_id: &PropertyId,
        window: TimeWindow,
    ) -> Result<Vec<RawRecord>, ProviderError> {
        (**self).fetch(property_id, window)
    }
}
