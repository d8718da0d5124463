//! Core types for the crisis engine.
//!
//! This module provides the fundamental types shared by every component:
//! - [`Severity`]: The ordered severity tier of a detected risk
//! - [`TriggerType`]: What kind of signal produced an alert
//! - [`RiskIndicator`]: A transient weighted signal produced by an extractor
//! - [`SubjectId`] / [`AlertId`]: Opaque identifiers
//! - [`Channel`]: A notification channel identifier
//! - [`AlertDraft`] / [`CrisisAlert`]: An alert before and after persistence

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CrisisError, Result};

/// Maximum number of characters kept in an alert excerpt.
pub const MAX_EXCERPT_CHARS: usize = 500;

/// The severity tier of an alert, ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low risk, reviewed within hours.
    #[default]
    Low,
    /// Medium risk, should be reviewed within the hour.
    Medium,
    /// High risk, requires prompt human attention.
    High,
    /// Critical risk, requires immediate attention.
    Critical,
}

impl Severity {
    /// All tiers in ascending order.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns the priority of this severity (higher = more urgent).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Returns true if alerts of this tier get the immediate notification wave.
    #[must_use]
    pub const fn is_urgent(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CrisisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(CrisisError::InvalidConfig {
                reason: format!("unknown severity '{other}'"),
            }),
        }
    }
}

/// The kind of signal that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Risk language found in free text.
    Keyword,
    /// A structured assessment crossed a threshold.
    AssessmentScore,
    /// A longitudinal behavioral trend.
    BehavioralPattern,
    /// Raised by a person.
    Manual,
}

impl TriggerType {
    /// Returns the trigger type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::AssessmentScore => "assessment_score",
            Self::BehavioralPattern => "behavioral_pattern",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which extractor produced a [`RiskIndicator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorSource {
    /// Keyword extractor.
    Keyword,
    /// Assessment extractor.
    Assessment,
    /// Behavioral extractor.
    Behavior,
}

impl IndicatorSource {
    /// Returns the alert trigger type corresponding to this source.
    #[must_use]
    pub const fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Keyword => TriggerType::Keyword,
            Self::Assessment => TriggerType::AssessmentScore,
            Self::Behavior => TriggerType::BehavioralPattern,
        }
    }
}

/// A weighted risk signal. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskIndicator {
    /// The extractor that produced the indicator.
    pub source: IndicatorSource,
    /// Policy weight of the indicator.
    pub weight: u32,
    /// Human-readable reason, copied into the alert's risk factors.
    pub label: String,
}

impl RiskIndicator {
    /// Creates a new indicator.
    #[must_use]
    pub fn new(source: IndicatorSource, weight: u32, label: impl Into<String>) -> Self {
        Self {
            source,
            weight,
            label: label.into(),
        }
    }
}

/// Opaque identifier of the person an alert concerns.
///
/// Must never be a raw contact address; use [`SubjectId::anonymize`] to
/// derive one from a phone number or e-mail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Wraps an already-anonymized identifier.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::InvalidSubject` if the value is empty or looks
    /// like an e-mail address or phone number.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CrisisError::InvalidSubject {
                reason: "subject id cannot be empty".to_string(),
            });
        }
        if trimmed.contains('@') {
            return Err(CrisisError::InvalidSubject {
                reason: "subject id looks like an e-mail address".to_string(),
            });
        }
        let digits = trimmed.chars().filter(char::is_ascii_digit).count();
        let phone_like = trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
        if phone_like && digits >= 7 {
            return Err(CrisisError::InvalidSubject {
                reason: "subject id looks like a phone number".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Derives an opaque identifier from a raw contact address.
    ///
    /// The contact is normalised (trimmed, lowercased) and hashed with a
    /// keyed BLAKE3 hash derived from `salt`.
    #[must_use]
    pub fn anonymize(contact: &str, salt: &str) -> Self {
        let key = blake3::derive_key("crisis-engine subject id v1", salt.as_bytes());
        let normalized = contact.trim().to_lowercase();
        let hash = blake3::keyed_hash(&key, normalized.as_bytes());
        Self(format!("subj_{}", &hash.to_hex()[..32]))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique alert identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub Uuid);

impl AlertId {
    /// Generates a new random alert ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AlertId {
    type Err = CrisisError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| CrisisError::InvalidAlertId { id: s.to_string() })
    }
}

/// A notification channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Crisis hotline callout.
    Hotline,
    /// SMS to on-call administrators.
    AdminSms,
    /// E-mail to administrators.
    AdminEmail,
    /// Urgent message in the staff chat.
    ChatUrgent,
    /// Escalation team page.
    EscalationTeam,
    /// The subject's registered emergency contact.
    EmergencyContact,
}

impl Channel {
    /// Returns the channel identifier as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hotline => "hotline",
            Self::AdminSms => "admin_sms",
            Self::AdminEmail => "admin_email",
            Self::ChatUrgent => "chat_urgent",
            Self::EscalationTeam => "escalation_team",
            Self::EmergencyContact => "emergency_contact",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Truncates `text` to at most [`MAX_EXCERPT_CHARS`] characters.
#[must_use]
pub fn truncate_excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// An alert that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDraft {
    /// The subject the alert concerns.
    pub subject_id: SubjectId,
    /// The assigned severity.
    pub severity: Severity,
    /// What produced the alert.
    pub trigger_type: TriggerType,
    /// Ordered, de-duplicated reasons.
    pub risk_factors: Vec<String>,
    /// Truncated snippet of the triggering content.
    pub excerpt: Option<String>,
    /// Score that contributed, if any.
    pub context_score: Option<f64>,
    /// Time spent producing the alert.
    pub detection_latency_ms: u64,
}

impl AlertDraft {
    /// Creates a new draft with no risk factors.
    #[must_use]
    pub fn new(subject_id: SubjectId, severity: Severity, trigger_type: TriggerType) -> Self {
        Self {
            subject_id,
            severity,
            trigger_type,
            risk_factors: Vec::new(),
            excerpt: None,
            context_score: None,
            detection_latency_ms: 0,
        }
    }

    /// Appends a risk factor, ignoring duplicates.
    #[must_use]
    pub fn risk_factor(mut self, factor: impl Into<String>) -> Self {
        let factor = factor.into();
        if !self.risk_factors.contains(&factor) {
            self.risk_factors.push(factor);
        }
        self
    }

    /// Appends several risk factors, ignoring duplicates.
    #[must_use]
    pub fn risk_factors<I, S>(self, factors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        factors
            .into_iter()
            .fold(self, |draft, factor| draft.risk_factor(factor))
    }

    /// Sets the excerpt, truncated to [`MAX_EXCERPT_CHARS`].
    #[must_use]
    pub fn excerpt(mut self, text: &str) -> Self {
        self.excerpt = Some(truncate_excerpt(text));
        self
    }

    /// Sets the contributing score.
    #[must_use]
    pub const fn context_score(mut self, score: f64) -> Self {
        self.context_score = Some(score);
        self
    }

    /// Sets the detection latency.
    #[must_use]
    pub const fn detection_latency_ms(mut self, ms: u64) -> Self {
        self.detection_latency_ms = ms;
        self
    }
}

/// A persisted crisis alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisAlert {
    /// Unique identifier, immutable.
    pub id: AlertId,
    /// The subject the alert concerns.
    pub subject_id: SubjectId,
    /// Severity assigned at creation, never lowered.
    pub severity: Severity,
    /// What produced the alert.
    pub trigger_type: TriggerType,
    /// Ordered reasons for the severity, for audit.
    pub risk_factors: Vec<String>,
    /// Truncated snippet of the triggering content.
    pub excerpt: Option<String>,
    /// Score that contributed, if any.
    pub context_score: Option<f64>,
    /// When the alert was created.
    pub created_at: DateTime<Utc>,
    /// Whether a human has resolved the alert.
    pub resolved: bool,
    /// When the alert was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved the alert.
    pub resolved_by: Option<String>,
    /// Whether the alert has been escalated.
    pub escalated: bool,
    /// When the alert was escalated.
    #[serde(default)]
    pub escalated_at: Option<DateTime<Utc>>,
    /// Time taken to produce the alert.
    pub detection_latency_ms: u64,
    /// Channels that were successfully notified, in order.
    pub notifications_sent: Vec<Channel>,
}

impl CrisisAlert {
    /// Materialises a draft into a new unresolved alert.
    #[must_use]
    pub fn from_draft(draft: AlertDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::new(),
            subject_id: draft.subject_id,
            severity: draft.severity,
            trigger_type: draft.trigger_type,
            risk_factors: draft.risk_factors,
            excerpt: draft.excerpt.as_deref().map(truncate_excerpt),
            context_score: draft.context_score,
            created_at,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            escalated: false,
            escalated_at: None,
            detection_latency_ms: draft.detection_latency_ms,
            notifications_sent: Vec::new(),
        }
    }

    /// Marks the alert resolved.
    ///
    /// Returns `false` if it was already resolved; the original
    /// `resolved_at`/`resolved_by` are kept in that case.
    pub fn resolve(&mut self, resolved_by: &str, at: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(at);
        self.resolved_by = Some(resolved_by.to_string());
        true
    }

    /// Marks the alert escalated.
    ///
    /// Returns `false` if it is already resolved or already escalated.
    pub fn escalate(&mut self, at: DateTime<Utc>) -> bool {
        if self.resolved || self.escalated {
            return false;
        }
        self.escalated = true;
        self.escalated_at = Some(at);
        true
    }

    /// Appends channels not yet recorded. Returns how many were added.
    pub fn record_notifications(&mut self, channels: &[Channel]) -> usize {
        let mut added = 0;
        for channel in channels {
            if !self.notifications_sent.contains(channel) {
                self.notifications_sent.push(*channel);
                added += 1;
            }
        }
        added
    }

    /// Returns true if the alert still awaits a human.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.resolved
    }

    /// Returns how long the alert has existed at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn subject() -> SubjectId {
        SubjectId::new("subj_test").unwrap()
    }

    fn alert(severity: Severity) -> CrisisAlert {
        CrisisAlert::from_draft(
            AlertDraft::new(subject(), severity, TriggerType::Keyword),
            Utc::now(),
        )
    }

    mod severity_tests {
        use super::*;

        #[test]
        fn severity_ordering() {
            assert!(Severity::Low < Severity::Medium);
            assert!(Severity::Medium < Severity::High);
            assert!(Severity::High < Severity::Critical);
            assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
        }

        #[test]
        fn severity_as_str_and_parse() {
            for severity in Severity::ALL {
                assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
            }
            assert!("urgent".parse::<Severity>().is_err());
        }

        #[test]
        fn severity_urgency() {
            assert!(!Severity::Low.is_urgent());
            assert!(!Severity::Medium.is_urgent());
            assert!(Severity::High.is_urgent());
            assert!(Severity::Critical.is_urgent());
        }

        #[test]
        fn severity_serialization() {
            let json = serde_json::to_string(&Severity::Critical).unwrap();
            assert_eq!(json, "\"critical\"");
        }
    }

    mod subject_tests {
        use super::*;

        #[test]
        fn accepts_opaque_id() {
            let id = SubjectId::new("  user-7f3a  ").unwrap();
            assert_eq!(id.as_str(), "user-7f3a");
        }

        #[test]
        fn rejects_empty() {
            assert!(matches!(
                SubjectId::new("   "),
                Err(CrisisError::InvalidSubject { .. })
            ));
        }

        #[test]
        fn rejects_email() {
            assert!(SubjectId::new("someone@example.com").is_err());
        }

        #[test]
        fn rejects_phone_number() {
            assert!(SubjectId::new("+1 (555) 010-9999").is_err());
            assert!(SubjectId::new("5550109999").is_err());
        }

        #[test]
        fn short_numeric_ids_are_allowed() {
            assert!(SubjectId::new("12345").is_ok());
        }

        #[test]
        fn anonymize_is_stable_and_normalised() {
            let a = SubjectId::anonymize("Someone@Example.com ", "salt");
            let b = SubjectId::anonymize("someone@example.com", "salt");
            assert_eq!(a, b);
            assert!(a.as_str().starts_with("subj_"));
            assert!(!a.as_str().contains('@'));
            assert!(SubjectId::new(a.as_str()).is_ok());
        }

        #[test]
        fn anonymize_depends_on_salt() {
            let a = SubjectId::anonymize("+15550109999", "one");
            let b = SubjectId::anonymize("+15550109999", "two");
            assert_ne!(a, b);
        }
    }

    mod alert_id_tests {
        use super::*;

        #[test]
        fn parse_round_trip() {
            let id = AlertId::new();
            assert_eq!(id.to_string().parse::<AlertId>().unwrap(), id);
        }

        #[test]
        fn parse_garbage_fails() {
            let err = "not-a-uuid".parse::<AlertId>().unwrap_err();
            assert!(matches!(err, CrisisError::InvalidAlertId { ref id } if id == "not-a-uuid"));
        }
    }

    mod draft_tests {
        use super::*;

        #[test]
        fn risk_factors_are_deduplicated_in_order() {
            let draft = AlertDraft::new(subject(), Severity::High, TriggerType::Keyword)
                .risk_factor("b")
                .risk_factors(["a", "b", "c"]);
            assert_eq!(draft.risk_factors, vec!["b", "a", "c"]);
        }

        #[test]
        fn excerpt_is_truncated() {
            let long = "x".repeat(2000);
            let draft =
                AlertDraft::new(subject(), Severity::High, TriggerType::Keyword).excerpt(&long);
            assert_eq!(draft.excerpt.map(|e| e.chars().count()), Some(500));
        }

        #[test]
        fn excerpt_truncation_respects_char_boundaries() {
            let text = "é".repeat(600);
            let excerpt = truncate_excerpt(&text);
            assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn new_alert_is_unresolved_and_unescalated() {
            let alert = alert(Severity::High);
            assert!(alert.is_active());
            assert!(!alert.escalated);
            assert!(alert.resolved_at.is_none());
            assert!(alert.notifications_sent.is_empty());
        }

        #[test]
        fn resolve_sets_fields_once() {
            let mut alert = alert(Severity::High);
            let first = Utc::now();
            assert!(alert.resolve("counselor-1", first));
            assert!(!alert.resolve("counselor-2", first + Duration::minutes(5)));
            assert_eq!(alert.resolved_at, Some(first));
            assert_eq!(alert.resolved_by.as_deref(), Some("counselor-1"));
        }

        #[test]
        fn escalate_only_once() {
            let mut alert = alert(Severity::Critical);
            assert!(alert.escalate(Utc::now()));
            assert!(!alert.escalate(Utc::now()));
            assert!(alert.escalated);
            assert_eq!(alert.severity, Severity::Critical);
        }

        #[test]
        fn resolved_alert_cannot_escalate() {
            let mut alert = alert(Severity::Medium);
            alert.resolve("counselor-1", Utc::now());
            assert!(!alert.escalate(Utc::now()));
            assert!(!alert.escalated);
        }

        #[test]
        fn notifications_are_append_only_and_deduplicated() {
            let mut alert = alert(Severity::Critical);
            assert_eq!(
                alert.record_notifications(&[Channel::Hotline, Channel::AdminSms]),
                2
            );
            assert_eq!(
                alert.record_notifications(&[Channel::Hotline, Channel::EscalationTeam]),
                1
            );
            assert_eq!(
                alert.notifications_sent,
                vec![Channel::Hotline, Channel::AdminSms, Channel::EscalationTeam]
            );
        }

        #[test]
        fn alert_serialization_round_trip() {
            let alert = alert(Severity::High);
            let json = serde_json::to_string(&alert).unwrap();
            assert!(json.contains("\"severity\":\"high\""));
            assert!(json.contains("\"trigger_type\":\"keyword\""));
            let parsed: CrisisAlert = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, alert);
        }
    }

    proptest! {
        #[test]
        fn prop_excerpt_never_exceeds_limit(text in ".{0,800}") {
            let excerpt = truncate_excerpt(&text);
            prop_assert!(excerpt.chars().count() <= MAX_EXCERPT_CHARS);
            prop_assert!(text.starts_with(&excerpt));
        }
    }
}
