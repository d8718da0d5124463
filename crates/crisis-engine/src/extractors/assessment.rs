//! Indicators from structured assessment scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{IndicatorSource, RiskIndicator};

/// A named subscale and the score at which it counts as elevated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscaleRule {
    /// Subscale name, matched case-insensitively.
    pub name: String,
    /// Score at or above which the subscale is elevated.
    pub threshold: f64,
    /// Weight of the indicator produced when elevated.
    pub weight: u32,
}

impl SubscaleRule {
    /// Creates a new subscale rule.
    #[must_use]
    pub fn new(name: impl Into<String>, threshold: f64, weight: u32) -> Self {
        Self {
            name: name.into(),
            threshold,
            weight,
        }
    }
}

/// Thresholds and weights for the assessment extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentPolicy {
    /// Total score at or above which the result is critical.
    pub critical_total: f64,
    /// Total score at or above which the result is high.
    pub high_total: f64,
    /// Total score at or above which the result is medium.
    pub medium_total: f64,
    /// Weight of a critical total.
    pub critical_weight: u32,
    /// Weight of a high total.
    pub high_weight: u32,
    /// Weight of a medium total.
    pub medium_weight: u32,
    /// Subscale rules.
    pub subscales: Vec<SubscaleRule>,
    /// Number of elevated subscales that adds the combined indicator.
    pub combined_min_elevated: usize,
    /// Weight of the combined indicator.
    pub combined_weight: u32,
}

impl Default for AssessmentPolicy {
    fn default() -> Self {
        Self {
            critical_total: 11.0,
            high_total: 9.0,
            medium_total: 6.0,
            critical_weight: 10,
            high_weight: 7,
            medium_weight: 4,
            subscales: vec![
                SubscaleRule::new("depression", 3.0, 4),
                SubscaleRule::new("anxiety", 3.0, 4),
                SubscaleRule::new("stress", 3.0, 4),
            ],
            combined_min_elevated: 2,
            combined_weight: 7,
        }
    }
}

fn usable(score: f64) -> bool {
    score.is_finite() && score >= 0.0
}

/// Maps an assessment total and its subscales to indicators.
///
/// Non-finite or negative scores are ignored. Subscales without a rule
/// are ignored.
#[must_use]
pub fn extract_assessment(
    total_score: f64,
    subscales: &BTreeMap<String, f64>,
    policy: &AssessmentPolicy,
) -> Vec<RiskIndicator> {
    let mut indicators = Vec::new();

    if usable(total_score) {
        let tier = if total_score >= policy.critical_total {
            Some(("critical", policy.critical_weight))
        } else if total_score >= policy.high_total {
            Some(("high", policy.high_weight))
        } else if total_score >= policy.medium_total {
            Some(("medium", policy.medium_weight))
        } else {
            None
        };
        if let Some((name, weight)) = tier {
            indicators.push(RiskIndicator::new(
                IndicatorSource::Assessment,
                weight,
                format!("{name}_assessment_total: {total_score}"),
            ));
        }
    }

    let mut elevated = Vec::new();
    for rule in &policy.subscales {
        let score = subscales
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(&rule.name))
            .map(|(_, score)| *score);
        if let Some(score) = score.filter(|s| usable(*s) && *s >= rule.threshold) {
            indicators.push(RiskIndicator::new(
                IndicatorSource::Assessment,
                rule.weight,
                format!("elevated_{}: {score}", rule.name),
            ));
            elevated.push(rule.name.as_str());
        }
    }

    if policy.combined_min_elevated > 0 && elevated.len() >= policy.combined_min_elevated {
        indicators.push(RiskIndicator::new(
            IndicatorSource::Assessment,
            policy.combined_weight,
            format!("combined_subscale_risk: {}", elevated.join("+")),
        ));
    }

    indicators
}
