//! Severity classification.
//!
//! The strongest indicator sets the base weight (max, not sum), contextual
//! modifiers are added on top, and the result is bucketed into a
//! [`Severity`]. An empty indicator set is always `Low` and not alertable;
//! modifiers never create risk on their own.

use serde::{Deserialize, Serialize};

use crate::types::{RiskIndicator, Severity, TriggerType};

/// Caller-supplied context for a classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationContext {
    /// A prior or contextual score, e.g. the latest assessment total.
    pub prior_score: Option<f64>,
    /// Number of alerts previously raised for the subject.
    pub prior_alert_count: Option<u32>,
    /// Duration of the session the signal came from.
    pub session_duration_secs: Option<u64>,
}

impl ClassificationContext {
    /// Creates an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prior_score: None,
            prior_alert_count: None,
            session_duration_secs: None,
        }
    }

    /// Sets the prior score.
    #[must_use]
    pub const fn with_prior_score(mut self, score: f64) -> Self {
        self.prior_score = Some(score);
        self
    }

    /// Sets the prior alert count.
    #[must_use]
    pub const fn with_prior_alert_count(mut self, count: u32) -> Self {
        self.prior_alert_count = Some(count);
        self
    }

    /// Sets the session duration.
    #[must_use]
    pub const fn with_session_duration_secs(mut self, secs: u64) -> Self {
        self.session_duration_secs = Some(secs);
        self
    }
}

/// Thresholds and modifier bonuses for the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierPolicy {
    /// Weight at or above which the result is critical.
    pub critical_weight: u32,
    /// Weight at or above which the result is high.
    pub high_weight: u32,
    /// Weight at or above which the result is medium.
    pub medium_weight: u32,
    /// Prior score at or above which the high bonus applies.
    pub context_high_threshold: f64,
    /// Prior score at or above which the medium bonus applies.
    pub context_medium_threshold: f64,
    /// Bonus for a prior score at the high threshold.
    pub context_high_bonus: u32,
    /// Bonus for a prior score at the medium threshold only.
    pub context_medium_bonus: u32,
    /// Prior alert count above which the repeat bonus applies.
    pub repeat_alert_threshold: u32,
    /// Bonus for repeat alerts.
    pub repeat_alert_bonus: u32,
    /// Sessions shorter than this get the short-session bonus.
    pub short_session_secs: u64,
    /// Bonus for a short session.
    pub short_session_bonus: u32,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            critical_weight: 10,
            high_weight: 7,
            medium_weight: 4,
            context_high_threshold: 9.0,
            context_medium_threshold: 6.0,
            context_high_bonus: 3,
            context_medium_bonus: 1,
            repeat_alert_threshold: 2,
            repeat_alert_bonus: 2,
            short_session_secs: 60,
            short_session_bonus: 1,
        }
    }
}

impl ClassifierPolicy {
    /// Buckets a final weight into a severity.
    #[must_use]
    pub const fn severity_for(&self, weight: u32) -> Severity {
        if weight >= self.critical_weight {
            Severity::Critical
        } else if weight >= self.high_weight {
            Severity::High
        } else if weight >= self.medium_weight {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// The result of classifying one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// The assigned severity.
    pub severity: Severity,
    /// Strongest indicator weight.
    pub base_weight: u32,
    /// Base weight plus modifiers.
    pub weight: u32,
    /// Indicator labels followed by applied modifiers.
    pub risk_factors: Vec<String>,
    /// Trigger type of the strongest indicator.
    pub trigger_type: Option<TriggerType>,
}

impl Classification {
    /// A classification with no detected risk.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            severity: Severity::Low,
            base_weight: 0,
            weight: 0,
            risk_factors: Vec::new(),
            trigger_type: None,
        }
    }

    /// Returns true if this result should be persisted as an alert.
    #[must_use]
    pub fn is_alertable(&self) -> bool {
        self.trigger_type.is_some() && !self.risk_factors.is_empty()
    }

    /// Combines two classifications of the same event.
    ///
    /// The higher severity wins; ties go to the higher weight, then to
    /// `self`. Risk factors of both are kept, winner's first.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        let other_wins = (other.severity, other.weight) > (self.severity, self.weight);
        let (mut winner, loser) = if other_wins { (other, self) } else { (self, other) };
        for factor in loser.risk_factors {
            if !winner.risk_factors.contains(&factor) {
                winner.risk_factors.push(factor);
            }
        }
        if winner.trigger_type.is_none() {
            winner.trigger_type = loser.trigger_type;
        }
        winner
    }
}

/// Classifies indicator sets into severities.
#[derive(Debug, Clone, Default)]
pub struct SeverityClassifier {
    policy: ClassifierPolicy,
}

impl SeverityClassifier {
    /// Creates a classifier with the given policy.
    #[must_use]
    pub const fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// Classifies an indicator set in context.
    #[must_use]
    pub fn classify(
        &self,
        indicators: &[RiskIndicator],
        context: &ClassificationContext,
    ) -> Classification {
        let Some(strongest) = indicators.iter().max_by_key(|i| i.weight) else {
            return Classification::none();
        };
        let base_weight = strongest.weight;
        let mut weight = base_weight;

        let mut risk_factors: Vec<String> = Vec::with_capacity(indicators.len() + 3);
        for indicator in indicators {
            if !risk_factors.contains(&indicator.label) {
                risk_factors.push(indicator.label.clone());
            }
        }

        let policy = &self.policy;
        if let Some(score) = context.prior_score.filter(|s| s.is_finite()) {
            if score >= policy.context_high_threshold {
                weight = weight.saturating_add(policy.context_high_bonus);
                risk_factors.push(format!("high_context_score: {score}"));
            } else if score >= policy.context_medium_threshold {
                weight = weight.saturating_add(policy.context_medium_bonus);
                risk_factors.push(format!("elevated_context_score: {score}"));
            }
        }
        if let Some(count) = context.prior_alert_count {
            if count > policy.repeat_alert_threshold {
                weight = weight.saturating_add(policy.repeat_alert_bonus);
                risk_factors.push(format!("repeat_alerts: {count}"));
            }
        }
        if let Some(secs) = context.session_duration_secs {
            if secs < policy.short_session_secs {
                weight = weight.saturating_add(policy.short_session_bonus);
                risk_factors.push(format!("short_session: {secs}s"));
            }
        }

        Classification {
            severity: policy.severity_for(weight),
            base_weight,
            weight,
            risk_factors,
            trigger_type: Some(strongest.source.trigger_type()),
        }
    }
}
