//! Indicators from longitudinal behavior.
//!
//! Four independent conditions are checked over a subject's recent history:
//! a worsening assessment trend, a mood decline, a sudden drop in activity
//! and the absence of social interaction. Each true condition yields one
//! indicator; enough of them together add a combined-pattern indicator.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{IndicatorSource, RiskIndicator};

/// Samples needed for the assessment trend.
const TREND_SAMPLES: usize = 3;
/// Recent mood samples compared against the prior ones.
const MOOD_RECENT: usize = 3;
/// Prior mood samples.
const MOOD_PRIOR: usize = 2;

/// A subject's recent history. Sample vectors are oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorHistory {
    /// Assessment totals, higher is worse.
    #[serde(default)]
    pub assessment_scores: Vec<f64>,
    /// Self-reported mood on a 1-10 scale, higher is better.
    #[serde(default)]
    pub mood_scores: Vec<f64>,
    /// Timestamps of any activity (messages, check-ins, logins).
    #[serde(default)]
    pub activity: Vec<DateTime<Utc>>,
    /// Timestamps of social or peer interactions.
    #[serde(default)]
    pub social_interactions: Vec<DateTime<Utc>>,
    /// The instant the history is evaluated at.
    pub as_of: DateTime<Utc>,
}

impl BehaviorHistory {
    /// Creates an empty history evaluated at `as_of`.
    #[must_use]
    pub const fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            assessment_scores: Vec::new(),
            mood_scores: Vec::new(),
            activity: Vec::new(),
            social_interactions: Vec::new(),
            as_of,
        }
    }

    /// Sets the assessment scores.
    #[must_use]
    pub fn with_assessment_scores(mut self, scores: Vec<f64>) -> Self {
        self.assessment_scores = scores;
        self
    }

    /// Sets the mood scores.
    #[must_use]
    pub fn with_mood_scores(mut self, scores: Vec<f64>) -> Self {
        self.mood_scores = scores;
        self
    }

    /// Sets the activity timestamps.
    #[must_use]
    pub fn with_activity(mut self, activity: Vec<DateTime<Utc>>) -> Self {
        self.activity = activity;
        self
    }

    /// Sets the social interaction timestamps.
    #[must_use]
    pub fn with_social_interactions(mut self, interactions: Vec<DateTime<Utc>>) -> Self {
        self.social_interactions = interactions;
        self
    }
}

/// Thresholds and weights for the behavioral extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorPolicy {
    /// Length of the recent and prior activity windows.
    pub window_days: i64,
    /// Minimum drop of the recent mood average below the prior average.
    pub mood_drop: f64,
    /// Recent activity below this fraction of prior activity is a drop.
    pub activity_drop_ratio: f64,
    /// Weight of a worsening assessment trend.
    pub worsening_weight: u32,
    /// Weight of a mood decline.
    pub mood_weight: u32,
    /// Weight of an activity drop.
    pub activity_weight: u32,
    /// Weight of social isolation.
    pub isolation_weight: u32,
    /// Number of true conditions that adds the combined indicator.
    pub combined_min_conditions: usize,
    /// Weight of the combined indicator.
    pub combined_weight: u32,
}

impl Default for BehaviorPolicy {
    fn default() -> Self {
        Self {
            window_days: 7,
            mood_drop: 1.0,
            activity_drop_ratio: 0.5,
            worsening_weight: 4,
            mood_weight: 4,
            activity_weight: 3,
            isolation_weight: 3,
            combined_min_conditions: 3,
            combined_weight: 7,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn worsening_trend(scores: &[f64]) -> bool {
    if scores.len() < TREND_SAMPLES {
        return false;
    }
    let recent = &scores[scores.len() - TREND_SAMPLES..];
    recent.iter().all(|s| s.is_finite()) && recent.windows(2).all(|w| w[1] > w[0])
}

fn mood_decline(moods: &[f64], drop: f64) -> bool {
    if moods.len() < MOOD_RECENT + MOOD_PRIOR {
        return false;
    }
    let tail = &moods[moods.len() - MOOD_RECENT - MOOD_PRIOR..];
    if !tail.iter().all(|m| m.is_finite() && (1.0..=10.0).contains(m)) {
        return false;
    }
    let (prior, recent) = tail.split_at(MOOD_PRIOR);
    mean(recent) <= mean(prior) - drop
}

fn count_between(events: &[DateTime<Utc>], from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
    events.iter().filter(|t| **t > from && **t <= to).count()
}

/// Start of the prior and the recent window, or `None` when the window is
/// empty or reaches outside the representable time range.
fn trailing_windows(as_of: DateTime<Utc>, days: i64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if days <= 0 {
        return None;
    }
    let window = Duration::try_days(days)?;
    let recent_start = as_of.checked_sub_signed(window)?;
    let prior_start = recent_start.checked_sub_signed(window)?;
    Some((prior_start, recent_start))
}

/// Evaluates a history and returns one indicator per true condition.
#[must_use]
pub fn extract_behavior(history: &BehaviorHistory, policy: &BehaviorPolicy) -> Vec<RiskIndicator> {
    let mut indicators = Vec::new();

    if worsening_trend(&history.assessment_scores) {
        indicators.push(RiskIndicator::new(
            IndicatorSource::Behavior,
            policy.worsening_weight,
            "worsening_assessment_trend",
        ));
    }

    if mood_decline(&history.mood_scores, policy.mood_drop) {
        indicators.push(RiskIndicator::new(
            IndicatorSource::Behavior,
            policy.mood_weight,
            "declining_mood",
        ));
    }

    if let Some((prior_start, recent_start)) =
        trailing_windows(history.as_of, policy.window_days)
    {
        let recent = count_between(&history.activity, recent_start, history.as_of);
        let prior = count_between(&history.activity, prior_start, recent_start);

        if prior > 0 && (recent as f64) < (prior as f64) * policy.activity_drop_ratio {
            indicators.push(RiskIndicator::new(
                IndicatorSource::Behavior,
                policy.activity_weight,
                format!("activity_drop: {recent} vs {prior}"),
            ));
        }

        let social = count_between(&history.social_interactions, recent_start, history.as_of);
        if recent + prior > 0 && social == 0 {
            indicators.push(RiskIndicator::new(
                IndicatorSource::Behavior,
                policy.isolation_weight,
                "social_isolation",
            ));
        }
    }

    if policy.combined_min_conditions > 0 && indicators.len() >= policy.combined_min_conditions {
        let labels: Vec<&str> = indicators
            .iter()
            .map(|i| i.label.split(':').next().unwrap_or_default())
            .collect();
        let label = format!("combined_behavior_pattern: {}", labels.join("+"));
        indicators.push(RiskIndicator::new(
            IndicatorSource::Behavior,
            policy.combined_weight,
            label,
        ));
    }

    indicators
}
