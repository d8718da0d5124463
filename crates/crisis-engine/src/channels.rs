//! Notification collaborators.
//!
//! This module provides the [`Notifier`] trait, the engine's only view of
//! how a channel is delivered, plus two implementations: [`TracingNotifier`]
//! which writes every send to the log, and [`RoutingNotifier`] which routes
//! each [`Channel`] to its own transport.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{CrisisError, Result};
use crate::types::{AlertId, Channel, CrisisAlert, Severity, SubjectId, TriggerType};

/// The lifecycle event a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    /// Sent when a high or critical alert is created.
    Immediate,
    /// Sent when an alert passes its response deadline unresolved.
    Escalation,
}

impl fmt::Display for Wave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Escalation => write!(f, "escalation"),
        }
    }
}

/// What a channel receives. Carries the excerpt, never the full message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// The wave this payload belongs to.
    pub wave: Wave,
    /// The alert being notified.
    pub alert_id: AlertId,
    /// The subject of the alert.
    pub subject_id: SubjectId,
    /// The alert severity.
    pub severity: Severity,
    /// What produced the alert.
    pub trigger_type: TriggerType,
    /// Reasons for the severity.
    pub risk_factors: Vec<String>,
    /// Truncated triggering content.
    pub excerpt: Option<String>,
    /// When the alert was created.
    pub created_at: DateTime<Utc>,
}

impl NotificationPayload {
    /// Builds the payload for an alert.
    #[must_use]
    pub fn for_alert(alert: &CrisisAlert, wave: Wave) -> Self {
        Self {
            wave,
            alert_id: alert.id,
            subject_id: alert.subject_id.clone(),
            severity: alert.severity,
            trigger_type: alert.trigger_type,
            risk_factors: alert.risk_factors.clone(),
            excerpt: alert.excerpt.clone(),
            created_at: alert.created_at,
        }
    }

    /// Serializes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::Serialization` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(CrisisError::from)
    }
}

/// Trait for notification collaborators.
///
/// Implementations decide how a channel is reached (call, SMS, e-mail,
/// chat webhook). The engine only requires that each send fails
/// independently.
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Sends a payload to one channel.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::NotificationFailed` if the channel cannot be
    /// reached.
    fn send(&self, channel: Channel, payload: &NotificationPayload) -> Result<()>;
}

/// A notifier that logs every send through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    disabled: Vec<Channel>,
}

impl TracingNotifier {
    /// Creates a new tracing notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a channel as unavailable; sends to it fail.
    #[must_use]
    pub fn disable(mut self, channel: Channel) -> Self {
        if !self.disabled.contains(&channel) {
            self.disabled.push(channel);
        }
        self
    }
}

impl Notifier for TracingNotifier {
    fn send(&self, channel: Channel, payload: &NotificationPayload) -> Result<()> {
        if self.disabled.contains(&channel) {
            return Err(CrisisError::NotificationFailed {
                channel: channel.to_string(),
                reason: "channel disabled".to_string(),
            });
        }

        match payload.severity {
            Severity::Critical | Severity::High => error!(
                %channel,
                wave = %payload.wave,
                alert_id = %payload.alert_id,
                subject_id = %payload.subject_id,
                severity = %payload.severity,
                risk_factors = ?payload.risk_factors,
                "CRISIS ALERT"
            ),
            Severity::Medium | Severity::Low => warn!(
                %channel,
                wave = %payload.wave,
                alert_id = %payload.alert_id,
                subject_id = %payload.subject_id,
                severity = %payload.severity,
                "crisis alert"
            ),
        }
        Ok(())
    }
}

/// Routes each channel to its own notifier.
///
/// Channels without a route go to the fallback, or fail if there is none.
#[derive(Debug, Default)]
pub struct RoutingNotifier {
    routes: HashMap<Channel, Box<dyn Notifier>>,
    fallback: Option<Box<dyn Notifier>>,
}

impl RoutingNotifier {
    /// Creates a router with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `channel` to `notifier`.
    #[must_use]
    pub fn route(mut self, channel: Channel, notifier: Box<dyn Notifier>) -> Self {
        self.routes.insert(channel, notifier);
        self
    }

    /// Sets the notifier used for unrouted channels.
    #[must_use]
    pub fn fallback(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.fallback = Some(notifier);
        self
    }

    /// Returns true if `channel` can be delivered.
    #[must_use]
    pub fn handles(&self, channel: Channel) -> bool {
        self.fallback.is_some() || self.routes.contains_key(&channel)
    }
}

impl Notifier for RoutingNotifier {
    fn send(&self, channel: Channel, payload: &NotificationPayload) -> Result<()> {
        match self.routes.get(&channel).or(self.fallback.as_ref()) {
            Some(notifier) => {
                debug!(%channel, alert_id = %payload.alert_id, "routing notification");
                notifier.send(channel, payload)
            }
            None => Err(CrisisError::NotificationFailed {
                channel: channel.to_string(),
                reason: "no route configured".to_string(),
            }),
        }
    }
}
