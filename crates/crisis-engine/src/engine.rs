//! The engine facade.
//!
//! [`CrisisEngine`] wires the extractors, the classifier, the store and the
//! dispatcher into the entry points upstream callers use. Each analysis is
//! independent: it extracts indicators, classifies them, persists an alert
//! if anything was detected and sends the immediate wave for high and
//! critical alerts. Store failures on `create` always reach the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::channels::Notifier;
use crate::classifier::{Classification, ClassificationContext, SeverityClassifier};
use crate::config::EngineConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::Result;
use crate::extractors::{
    AssessmentPolicy, BehaviorHistory, BehaviorPolicy, KeywordPolicy, extract_assessment,
    extract_behavior, extract_keywords,
};
use crate::store::AlertStore;
use crate::types::{AlertDraft, AlertId, CrisisAlert, Severity, SubjectId, TriggerType};

/// A free-text message to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSignal {
    /// The message.
    pub text: String,
    /// BCP-47 style language tag, e.g. `en` or `es-MX`.
    pub language: String,
}

impl TextSignal {
    /// Creates a text signal.
    #[must_use]
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
        }
    }
}

/// A scored assessment to analyze.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssessmentSignal {
    /// The total score.
    pub total_score: f64,
    /// Named subscale scores.
    #[serde(default)]
    pub subscales: BTreeMap<String, f64>,
}

impl AssessmentSignal {
    /// Creates an assessment signal with no subscales.
    #[must_use]
    pub const fn new(total_score: f64) -> Self {
        Self {
            total_score,
            subscales: BTreeMap::new(),
        }
    }

    /// Adds a subscale score.
    #[must_use]
    pub fn subscale(mut self, name: impl Into<String>, score: f64) -> Self {
        self.subscales.insert(name.into(), score);
        self
    }
}

/// Signals observed together in one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Message text, if any.
    pub text: Option<TextSignal>,
    /// Assessment result, if any.
    pub assessment: Option<AssessmentSignal>,
}

/// The crisis detection engine.
#[derive(Debug, Clone)]
pub struct CrisisEngine {
    classifier: SeverityClassifier,
    keywords: KeywordPolicy,
    assessment: AssessmentPolicy,
    behavior: BehaviorPolicy,
    store: Arc<dyn AlertStore>,
    dispatcher: NotificationDispatcher,
}

impl CrisisEngine {
    /// Creates an engine from configuration and its collaborators.
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let dispatcher = NotificationDispatcher::new(Arc::clone(&store), notifier);
        Self {
            classifier: SeverityClassifier::new(config.classifier.clone()),
            keywords: config.keywords.clone(),
            assessment: config.assessment.clone(),
            behavior: config.behavior.clone(),
            store,
            dispatcher,
        }
    }

    /// Returns the alert store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn AlertStore> {
        Arc::clone(&self.store)
    }

    /// Returns the notification dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Classifies a message without persisting anything.
    #[must_use]
    pub fn classify_text(
        &self,
        text: &str,
        language: &str,
        context: &ClassificationContext,
    ) -> Classification {
        let indicators = extract_keywords(text, language, &self.keywords);
        self.classifier.classify(&indicators, context)
    }

    /// Classifies an assessment without persisting anything.
    #[must_use]
    pub fn classify_assessment(
        &self,
        total_score: f64,
        subscales: &BTreeMap<String, f64>,
    ) -> Classification {
        let indicators = extract_assessment(total_score, subscales, &self.assessment);
        self.classifier.classify(&indicators, &ClassificationContext::new())
    }

    /// Analyzes a message and raises an alert if it carries risk.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be persisted.
    pub fn analyze_text(
        &self,
        subject_id: &SubjectId,
        text: &str,
        language: &str,
        context: &ClassificationContext,
    ) -> Result<Option<CrisisAlert>> {
        let started = Instant::now();
        let classification = self.classify_text(text, language, context);
        self.raise(subject_id, classification, Some(text), context.prior_score, started)
    }

    /// Analyzes an assessment result and raises an alert if it carries risk.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be persisted.
    pub fn analyze_assessment(
        &self,
        subject_id: &SubjectId,
        total_score: f64,
        subscales: &BTreeMap<String, f64>,
    ) -> Result<Option<CrisisAlert>> {
        let started = Instant::now();
        let classification = self.classify_assessment(total_score, subscales);
        let score = total_score.is_finite().then_some(total_score);
        self.raise(subject_id, classification, None, score, started)
    }

    /// Analyzes a behavioral history and raises an alert if it shows a
    /// risk pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be persisted.
    pub fn analyze_behavior(
        &self,
        subject_id: &SubjectId,
        history: &BehaviorHistory,
    ) -> Result<Option<CrisisAlert>> {
        let started = Instant::now();
        let indicators = extract_behavior(history, &self.behavior);
        let classification = self
            .classifier
            .classify(&indicators, &ClassificationContext::new());
        self.raise(subject_id, classification, None, None, started)
    }

    /// Analyzes every signal in an event and raises at most one alert with
    /// the higher of the classifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be persisted.
    pub fn analyze_event(
        &self,
        subject_id: &SubjectId,
        event: &SignalEvent,
        context: &ClassificationContext,
    ) -> Result<Option<CrisisAlert>> {
        let started = Instant::now();
        let text = event
            .text
            .as_ref()
            .map(|t| self.classify_text(&t.text, &t.language, context));
        let assessment = event
            .assessment
            .as_ref()
            .map(|a| self.classify_assessment(a.total_score, &a.subscales));

        let classification = match (text, assessment) {
            (Some(t), Some(a)) => t.combine(a),
            (Some(c), None) | (None, Some(c)) => c,
            (None, None) => Classification::none(),
        };
        let score = event
            .assessment
            .as_ref()
            .map(|a| a.total_score)
            .filter(|s| s.is_finite())
            .or(context.prior_score);
        let excerpt = event.text.as_ref().map(|t| t.text.as_str());
        self.raise(subject_id, classification, excerpt, score, started)
    }

    /// Raises an alert on an operator's judgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be persisted.
    pub fn raise_manual(
        &self,
        subject_id: &SubjectId,
        severity: Severity,
        reason: &str,
        raised_by: &str,
    ) -> Result<CrisisAlert> {
        let draft = AlertDraft::new(subject_id.clone(), severity, TriggerType::Manual)
            .risk_factor(format!("manual: {reason}"))
            .risk_factor(format!("raised_by: {raised_by}"));
        self.persist(draft)
    }

    /// Resolves an alert. Resolving twice is a no-op that returns true.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert does not exist or the change could not
    /// be persisted.
    pub fn resolve(&self, id: AlertId, resolved_by: &str) -> Result<bool> {
        self.store.resolve(id, resolved_by)
    }

    /// Lists unresolved alerts, most severe and most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub fn list_active(&self) -> Result<Vec<CrisisAlert>> {
        self.store.list_active()
    }

    fn raise(
        &self,
        subject_id: &SubjectId,
        classification: Classification,
        excerpt: Option<&str>,
        context_score: Option<f64>,
        started: Instant,
    ) -> Result<Option<CrisisAlert>> {
        let trigger_type = match classification.trigger_type {
            Some(trigger_type) if classification.is_alertable() => trigger_type,
            _ => {
                debug!(subject_id = %subject_id, "no risk detected");
                return Ok(None);
            }
        };

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut draft = AlertDraft::new(subject_id.clone(), classification.severity, trigger_type)
            .risk_factors(classification.risk_factors)
            .detection_latency_ms(latency_ms);
        if let Some(text) = excerpt {
            draft = draft.excerpt(text);
        }
        if let Some(score) = context_score {
            draft = draft.context_score(score);
        }
        self.persist(draft).map(Some)
    }

    fn persist(&self, draft: AlertDraft) -> Result<CrisisAlert> {
        let subject_id = draft.subject_id.clone();
        let severity = draft.severity;
        let mut alert = self.store.create(draft).map_err(|e| {
            error!(
                subject_id = %subject_id,
                severity = %severity,
                error = %e,
                "FAILED TO PERSIST CRISIS ALERT"
            );
            e
        })?;

        if alert.severity.is_urgent() {
            let report = self.dispatcher.dispatch_immediate(&alert);
            alert.record_notifications(&report.delivered);
        }
        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            latency_ms = alert.detection_latency_ms,
            "crisis alert raised"
        );
        Ok(alert)
    }
}
