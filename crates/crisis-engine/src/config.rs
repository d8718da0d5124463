//! Engine configuration.
//!
//! Every section has defaults, so a configuration file only needs to name
//! the values it changes. Configuration files are JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classifier::ClassifierPolicy;
use crate::error::{CrisisError, Result};
use crate::escalation::{EscalationPolicy, MAX_DEADLINE_SECS};
use crate::extractors::{AssessmentPolicy, BehaviorPolicy, KeywordPolicy};
use crate::reporting::ReportingConfig;
use crate::types::Severity;

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the alert snapshot file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/alerts.json"),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Escalation deadlines and sweep interval.
    pub escalation: EscalationPolicy,
    /// Rollup interval and window.
    pub reporting: ReportingConfig,
    /// Severity thresholds and context modifiers.
    pub classifier: ClassifierPolicy,
    /// Keyword lexicons and tier weights.
    pub keywords: KeywordPolicy,
    /// Assessment thresholds and subscale rules.
    pub assessment: AssessmentPolicy,
    /// Behavioral pattern windows and weights.
    pub behavior: BehaviorPolicy,
    /// Alert storage.
    pub store: StoreConfig,
}

fn invalid(reason: impl Into<String>) -> CrisisError {
    CrisisError::InvalidConfig {
        reason: reason.into(),
    }
}

impl EngineConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::InvalidConfig` if the file cannot be read,
    /// parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            invalid(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::InvalidConfig` if the JSON is invalid or the
    /// values fail validation.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| invalid(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::Serialization` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sets the escalation policy.
    #[must_use]
    pub fn with_escalation(mut self, escalation: EscalationPolicy) -> Self {
        self.escalation = escalation;
        self
    }

    /// Sets the reporting configuration.
    #[must_use]
    pub fn with_reporting(mut self, reporting: ReportingConfig) -> Self {
        self.reporting = reporting;
        self
    }

    /// Sets the classifier policy.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ClassifierPolicy) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the store path.
    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store.path = path.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::InvalidConfig` naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.validate_escalation()?;
        self.validate_reporting()?;
        self.validate_classifier()?;
        self.validate_extractors()?;

        if self.store.path.as_os_str().is_empty() {
            return Err(invalid("store.path cannot be empty"));
        }
        Ok(())
    }

    fn validate_escalation(&self) -> Result<()> {
        let escalation = &self.escalation;
        if escalation.sweep_interval_secs == 0 {
            return Err(invalid("escalation.sweep_interval_secs must be greater than 0"));
        }
        for severity in Severity::ALL {
            let secs = escalation.deadlines.secs(severity);
            if secs == 0 {
                return Err(invalid(format!(
                    "escalation.deadlines.{severity}_secs must be greater than 0"
                )));
            }
            if secs > MAX_DEADLINE_SECS {
                return Err(invalid(format!(
                    "escalation.deadlines.{severity}_secs cannot exceed {MAX_DEADLINE_SECS}"
                )));
            }
        }
        if !escalation.deadlines.is_ordered() {
            return Err(invalid(
                "escalation deadlines must not grow shorter as severity falls",
            ));
        }

        let shortest = Severity::ALL
            .iter()
            .map(|s| escalation.deadlines.secs(*s))
            .min()
            .unwrap_or(u64::MAX);
        if escalation.sweep_interval_secs > shortest / 2 {
            warn!(
                sweep_interval_secs = escalation.sweep_interval_secs,
                shortest_deadline_secs = shortest,
                "sweep interval is more than half the shortest deadline; escalations may lag"
            );
        }
        Ok(())
    }

    fn validate_reporting(&self) -> Result<()> {
        if self.reporting.interval_secs == 0 {
            return Err(invalid("reporting.interval_secs must be greater than 0"));
        }
        if self.reporting.window_secs == 0 {
            return Err(invalid("reporting.window_secs must be greater than 0"));
        }
        if self.reporting.window_secs > MAX_DEADLINE_SECS {
            return Err(invalid(format!(
                "reporting.window_secs cannot exceed {MAX_DEADLINE_SECS}"
            )));
        }
        Ok(())
    }

    fn validate_classifier(&self) -> Result<()> {
        let c = &self.classifier;
        if c.medium_weight == 0
            || c.medium_weight > c.high_weight
            || c.high_weight > c.critical_weight
        {
            return Err(invalid(
                "classifier weights must satisfy 0 < medium <= high <= critical",
            ));
        }
        if !c.context_medium_threshold.is_finite() || !c.context_high_threshold.is_finite() {
            return Err(invalid("classifier context thresholds must be finite"));
        }
        if c.context_medium_threshold > c.context_high_threshold {
            return Err(invalid(
                "classifier.context_medium_threshold cannot exceed context_high_threshold",
            ));
        }
        Ok(())
    }

    fn validate_extractors(&self) -> Result<()> {
        let a = &self.assessment;
        if !(a.medium_total.is_finite()
            && a.high_total.is_finite()
            && a.critical_total.is_finite())
        {
            return Err(invalid("assessment totals must be finite"));
        }
        if a.medium_total > a.high_total || a.high_total > a.critical_total {
            return Err(invalid(
                "assessment totals must satisfy medium <= high <= critical",
            ));
        }
        if a.subscales.iter().any(|s| s.name.trim().is_empty()) {
            return Err(invalid("assessment subscale names cannot be empty"));
        }

        if !(1..=365).contains(&self.behavior.window_days) {
            return Err(invalid("behavior.window_days must be between 1 and 365"));
        }
        if !(0.0..=1.0).contains(&self.behavior.activity_drop_ratio) {
            return Err(invalid("behavior.activity_drop_ratio must be between 0 and 1"));
        }

        if self.keywords.default_language.trim().is_empty() {
            return Err(invalid("keywords.default_language cannot be empty"));
        }
        Ok(())
    }
}
