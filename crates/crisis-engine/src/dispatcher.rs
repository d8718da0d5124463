//! Notification dispatch.
//!
//! The [`NotificationDispatcher`] sends one wave of notifications for an
//! alert. Channels are attempted independently: a failed channel is logged
//! and reported, never allowed to block the rest of the wave. Channels that
//! were delivered are appended to the alert's `notifications_sent`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channels::{NotificationPayload, Notifier, Wave};
use crate::store::AlertStore;
use crate::types::{AlertId, Channel, CrisisAlert, Severity};

/// Channels notified when an alert is escalated.
pub const ESCALATION_CHANNELS: [Channel; 2] = [Channel::EscalationTeam, Channel::EmergencyContact];

/// Channels notified when an alert of `severity` is created.
#[must_use]
pub const fn immediate_channels(severity: Severity) -> &'static [Channel] {
    match severity {
        Severity::Critical => &[Channel::Hotline, Channel::AdminSms, Channel::AdminEmail],
        Severity::High => &[Channel::AdminEmail, Channel::ChatUrgent],
        Severity::Medium | Severity::Low => &[],
    }
}

/// Outcome of one notification wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaveReport {
    /// The alert notified.
    pub alert_id: AlertId,
    /// Which wave was sent.
    pub wave: Wave,
    /// Channels that accepted the payload.
    pub delivered: Vec<Channel>,
    /// Channels that failed, with the reason.
    pub failed: Vec<(Channel, String)>,
}

impl WaveReport {
    fn new(alert_id: AlertId, wave: Wave) -> Self {
        Self {
            alert_id,
            wave,
            delivered: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Returns true if every attempted channel was delivered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends notification waves and records delivered channels.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Sends the immediate wave for a newly created alert.
    ///
    /// Medium and low alerts have no immediate channels and produce an
    /// empty report.
    pub fn dispatch_immediate(&self, alert: &CrisisAlert) -> WaveReport {
        self.dispatch(alert, Wave::Immediate, immediate_channels(alert.severity))
    }

    /// Sends the escalation wave for an alert that was just escalated.
    pub fn dispatch_escalation(&self, alert: &CrisisAlert) -> WaveReport {
        self.dispatch(alert, Wave::Escalation, &ESCALATION_CHANNELS)
    }

    fn dispatch(&self, alert: &CrisisAlert, wave: Wave, channels: &[Channel]) -> WaveReport {
        let mut report = WaveReport::new(alert.id, wave);
        if channels.is_empty() {
            debug!(alert_id = %alert.id, severity = %alert.severity, %wave, "no channels for wave");
            return report;
        }

        let payload = NotificationPayload::for_alert(alert, wave);
        for &channel in channels {
            match self.notifier.send(channel, &payload) {
                Ok(()) => report.delivered.push(channel),
                Err(e) => {
                    warn!(alert_id = %alert.id, %channel, %wave, error = %e, "notification failed");
                    report.failed.push((channel, e.to_string()));
                }
            }
        }

        if !report.delivered.is_empty() {
            if let Err(e) = self.store.record_notifications(alert.id, &report.delivered) {
                warn!(alert_id = %alert.id, error = %e, "failed to record notifications");
            }
        }

        info!(
            alert_id = %alert.id,
            %wave,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "notification wave sent"
        );
        report
    }
}
