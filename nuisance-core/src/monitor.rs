//! Track category changes across epochs and raise alerts.
//!
//! [`ChangeMonitor::observe`] is pure: it takes the persisted
//! [`PropertyRiskState`] (if any) and a fresh [`ScoreResult`] and returns the
//! next state together with the [`AlertEvent`]s the change warrants. Nothing
//! is written anywhere; the orchestrator decides when states are committed.

use std::fmt;

use log::warn;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Epoch, Probability, PropertyId, RiskCategory, ScoreResult, ThresholdConfig};

/// Why an alert was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum AlertReason {
    /// The property entered the highest-risk category.
    NewHighRisk,
    /// The property moved to a higher-risk category.
    CategoryEscalation,
    /// The property moved to a lower-risk category.
    CategoryDeescalation,
    /// The probability moved by more than the configured delta within the
    /// same category.
    ScoreDeltaExceeded,
}

impl AlertReason {
    /// Return the reason as a `snake_case` `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewHighRisk => "new_high_risk",
            Self::CategoryEscalation => "category_escalation",
            Self::CategoryDeescalation => "category_deescalation",
            Self::ScoreDeltaExceeded => "score_delta_exceeded",
        }
    }
}

impl fmt::Display for AlertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A qualifying change for one property.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlertEvent {
    /// Affected property.
    pub property_id: PropertyId,
    /// Category before the change; absent for a first observation.
    pub from_category: Option<String>,
    /// Category after the change.
    pub to_category: String,
    /// Epoch that produced the change.
    pub epoch: Epoch,
    /// Why the alert fired.
    pub reason: AlertReason,
    /// Probability recorded in the prior state, if any.
    pub previous_probability: Option<Probability>,
    /// Probability that triggered the alert.
    pub probability: Probability,
}

/// One `(epoch, category)` entry in a property's history.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryEntry {
    /// Epoch of the observation.
    pub epoch: Epoch,
    /// Category assigned in that epoch.
    pub category: String,
}

/// Risk state carried forward between runs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PropertyRiskState {
    /// Tracked property.
    pub property_id: PropertyId,
    /// Category from the most recent observation.
    pub last_category: String,
    /// Probability from the most recent observation.
    pub last_probability: Probability,
    /// Epoch of the most recent observation.
    pub last_epoch: Epoch,
    /// Categories by epoch, oldest first.
    pub category_history: Vec<HistoryEntry>,
}

/// Next state and alerts produced by an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to persist once the run commits.
    pub state: PropertyRiskState,
    /// Alerts in emission order.
    pub alerts: Vec<AlertEvent>,
}

/// Tunable alerting behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct MonitorPolicy {
    /// Emit `new_high_risk` when a property's first-ever score lands in the
    /// highest category.
    pub alert_on_first_top_category: bool,
}

/// Compares scores with prior state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeMonitor {
    policy: MonitorPolicy,
}

impl ChangeMonitor {
    /// Create a monitor with `policy`.
    #[must_use]
    pub const fn new(policy: MonitorPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> MonitorPolicy {
        self.policy
    }

    /// Derive the next state and alerts for `result`.
    ///
    /// - No prior state: record the score; alert only when the policy asks
    ///   for first-observation alerts and the category is the highest.
    /// - Same category: alert when the probability moved by strictly more
    ///   than the configured delta threshold.
    /// - Higher category: `category_escalation`, followed by
    ///   `new_high_risk` when the property just reached the top.
    /// - Lower category: `category_deescalation`.
    ///
    /// A prior category unknown to `thresholds` is treated as a first
    /// observation. Observing the same epoch twice replaces that epoch's
    /// history entry rather than appending a second one.
    ///
    /// # Examples
    /// ```
    /// use nuisance_core::{
    ///     AlertReason, ChangeMonitor, Epoch, Probability, PropertyId, ScoreResult, ThresholdConfig,
    /// };
    ///
    /// let thresholds = ThresholdConfig::default();
    /// let score = |epoch: &str, p: f64| {
    ///     let probability = Probability::new(p).unwrap();
    ///     ScoreResult {
    ///         property_id: PropertyId::from("P1"),
    ///         epoch: Epoch::from(epoch),
    ///         probability,
    ///         category: thresholds.classify(probability),
    ///         model_version: "m".into(),
    ///     }
    /// };
    /// let monitor = ChangeMonitor::default();
    /// let first = monitor.observe(None, &score("2024-05", 0.45), &thresholds);
    /// assert!(first.alerts.is_empty());
    /// let second = monitor.observe(Some(&first.state), &score("2024-06", 0.72), &thresholds);
    /// let reasons: Vec<_> = second.alerts.iter().map(|a| a.reason).collect();
    /// assert_eq!(reasons, [AlertReason::CategoryEscalation, AlertReason::NewHighRisk]);
    /// ```
    #[must_use]
    pub fn observe(
        &self,
        prior: Option<&PropertyRiskState>,
        result: &ScoreResult,
        thresholds: &ThresholdConfig,
    ) -> Transition {
        let previous = prior.and_then(|state| {
            let category = thresholds.category(&state.last_category);
            if category.is_none() {
                warn!(
                    "Unknown prior category: property={}, category={}",
                    state.property_id, state.last_category
                );
            }
            category.map(|known| (state, known))
        });

        let alerts = match previous {
            None => self.first_observation(result, thresholds),
            Some((state, from)) => compare(state, &from, result, thresholds),
        };

        Transition {
            state: next_state(prior, result),
            alerts,
        }
    }

    fn first_observation(
        &self,
        result: &ScoreResult,
        thresholds: &ThresholdConfig,
    ) -> Vec<AlertEvent> {
        if self.policy.alert_on_first_top_category && thresholds.is_top(&result.category) {
            vec![alert(result, None, None, AlertReason::NewHighRisk)]
        } else {
            Vec::new()
        }
    }
}

fn compare(
    state: &PropertyRiskState,
    from: &RiskCategory,
    result: &ScoreResult,
    thresholds: &ThresholdConfig,
) -> Vec<AlertEvent> {
    let to = &result.category;
    let previous = Some(state.last_probability);
    let from_name = Some(from.name());
    let mut alerts = Vec::new();
    match to.rank().cmp(&from.rank()) {
        std::cmp::Ordering::Greater => {
            alerts.push(alert(
                result,
                from_name,
                previous,
                AlertReason::CategoryEscalation,
            ));
            if thresholds.is_top(to) && !thresholds.is_top(from) {
                alerts.push(alert(result, from_name, previous, AlertReason::NewHighRisk));
            }
        }
        std::cmp::Ordering::Less => alerts.push(alert(
            result,
            from_name,
            previous,
            AlertReason::CategoryDeescalation,
        )),
        std::cmp::Ordering::Equal => {
            let exceeded = thresholds
                .score_delta_alert_threshold()
                .is_some_and(|limit| {
                    delta(state.last_probability, result.probability) > limit
                });
            if exceeded {
                alerts.push(alert(
                    result,
                    from_name,
                    previous,
                    AlertReason::ScoreDeltaExceeded,
                ));
            }
        }
    }
    alerts
}

#[expect(clippy::float_arithmetic, reason = "absolute probability change")]
fn delta(before: Probability, after: Probability) -> f64 {
    (after.get() - before.get()).abs()
}

fn alert(
    result: &ScoreResult,
    from: Option<&str>,
    previous_probability: Option<Probability>,
    reason: AlertReason,
) -> AlertEvent {
    AlertEvent {
        property_id: result.property_id.clone(),
        from_category: from.map(str::to_owned),
        to_category: result.category.name().to_owned(),
        epoch: result.epoch.clone(),
        reason,
        previous_probability,
        probability: result.probability,
    }
}

fn next_state(prior: Option<&PropertyRiskState>, result: &ScoreResult) -> PropertyRiskState {
    let mut category_history = prior
        .map(|state| state.category_history.clone())
        .unwrap_or_default();
    let entry = HistoryEntry {
        epoch: result.epoch.clone(),
        category: result.category.name().to_owned(),
    };
    match category_history.last_mut() {
        Some(last) if last.epoch == result.epoch => *last = entry,
        _ => category_history.push(entry),
    }
    PropertyRiskState {
        property_id: result.property_id.clone(),
        last_category: result.category.name().to_owned(),
        last_probability: result.probability,
        last_epoch: result.epoch.clone(),
        category_history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn thresholds() -> ThresholdConfig {
        ThresholdConfig::default()
            .with_delta_threshold(0.1)
            .expect("valid delta")
    }

    fn score(thresholds: &ThresholdConfig, epoch: &str, value: f64) -> ScoreResult {
        let probability = Probability::new(value).expect("probability in range");
        ScoreResult {
            property_id: PropertyId::from("P1"),
            epoch: Epoch::from(epoch),
            probability,
            category: thresholds.classify(probability),
            model_version: "test".into(),
        }
    }

    fn state(category: &str, probability: f64, epoch: &str) -> PropertyRiskState {
        PropertyRiskState {
            property_id: PropertyId::from("P1"),
            last_category: category.into(),
            last_probability: Probability::new(probability).expect("probability in range"),
            last_epoch: Epoch::from(epoch),
            category_history: vec![HistoryEntry {
                epoch: Epoch::from(epoch),
                category: category.into(),
            }],
        }
    }

    fn reasons(transition: &Transition) -> Vec<AlertReason> {
        transition.alerts.iter().map(|event| event.reason).collect()
    }

    #[rstest]
    fn first_observation_is_silent(thresholds: ThresholdConfig) {
        let transition =
            ChangeMonitor::default().observe(None, &score(&thresholds, "e1", 0.9), &thresholds);
        assert!(transition.alerts.is_empty());
        assert_eq!(transition.state.last_category, "high");
        assert_eq!(transition.state.category_history.len(), 1);
    }

    #[rstest]
    fn first_top_observation_alerts_when_enabled(thresholds: ThresholdConfig) {
        let monitor = ChangeMonitor::new(MonitorPolicy {
            alert_on_first_top_category: true,
        });
        let transition = monitor.observe(None, &score(&thresholds, "e1", 0.9), &thresholds);
        assert_eq!(reasons(&transition), vec![AlertReason::NewHighRisk]);
        let event = transition.alerts.first().expect("one alert");
        assert_eq!(event.from_category, None);
        assert_eq!(event.previous_probability, None);
    }

    #[rstest]
    fn escalation_to_top_emits_both_alerts(thresholds: ThresholdConfig) {
        let prior = state("medium", 0.45, "e1");
        let transition = ChangeMonitor::default().observe(
            Some(&prior),
            &score(&thresholds, "e2", 0.72),
            &thresholds,
        );
        assert_eq!(
            reasons(&transition),
            vec![AlertReason::CategoryEscalation, AlertReason::NewHighRisk]
        );
        let event = transition.alerts.first().expect("alert");
        assert_eq!(event.from_category.as_deref(), Some("medium"));
        assert_eq!(event.to_category, "high");
        assert_eq!(transition.state.category_history.len(), 2);
    }

    #[rstest]
    #[case("low", 0.1, 0.5, vec![AlertReason::CategoryEscalation])]
    #[case("high", 0.9, 0.5, vec![AlertReason::CategoryDeescalation])]
    #[case("medium", 0.4, 0.55, vec![AlertReason::ScoreDeltaExceeded])]
    #[case("medium", 0.4, 0.5, vec![])]
    #[case("medium", 0.4, 0.45, vec![])]
    fn compares_with_prior(
        thresholds: ThresholdConfig,
        #[case] category: &str,
        #[case] before: f64,
        #[case] after: f64,
        #[case] expected: Vec<AlertReason>,
    ) {
        let prior = state(category, before, "e1");
        let transition = ChangeMonitor::default().observe(
            Some(&prior),
            &score(&thresholds, "e2", after),
            &thresholds,
        );
        assert_eq!(reasons(&transition), expected);
    }

    #[rstest]
    fn no_delta_alerts_without_threshold() {
        let thresholds = ThresholdConfig::default();
        let prior = state("medium", 0.31, "e1");
        let transition = ChangeMonitor::default().observe(
            Some(&prior),
            &score(&thresholds, "e2", 0.69),
            &thresholds,
        );
        assert!(transition.alerts.is_empty());
    }

    #[rstest]
    fn unknown_prior_category_counts_as_first(thresholds: ThresholdConfig) {
        let prior = state("severe", 0.95, "e1");
        let transition = ChangeMonitor::default().observe(
            Some(&prior),
            &score(&thresholds, "e2", 0.2),
            &thresholds,
        );
        assert!(transition.alerts.is_empty());
        assert_eq!(transition.state.category_history.len(), 2);
    }

    #[rstest]
    fn same_epoch_replaces_history_entry(thresholds: ThresholdConfig) {
        let monitor = ChangeMonitor::default();
        let result = score(&thresholds, "e1", 0.5);
        let first = monitor.observe(None, &result, &thresholds);
        let again = monitor.observe(Some(&first.state), &result, &thresholds);
        assert!(again.alerts.is_empty());
        assert_eq!(again.state, first.state);
    }
}
