//! Time-based escalation.
//!
//! The [`EscalationScheduler`] wakes on a fixed interval and escalates every
//! alert that is still unresolved past the response deadline for its
//! severity. Each alert is escalated through the store's compare-and-set,
//! so an alert resolved between listing and escalation is left alone and an
//! alert is never escalated twice.
//!
//! Sweeps are single-flight: a sweep requested while another is in
//! progress returns [`SweepOutcome::Skipped`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dispatcher::NotificationDispatcher;
use crate::reporting::{MonitorSnapshot, ReportSink};
use crate::store::AlertStore;
use crate::types::{AlertId, Severity};

/// Longest deadline accepted, in seconds (one year).
pub const MAX_DEADLINE_SECS: u64 = 365 * 24 * 60 * 60;

/// Converts whole seconds to a `chrono::Duration`, clamped to one year.
pub(crate) fn clamped_secs(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs.min(MAX_DEADLINE_SECS)).unwrap_or(0))
}

/// Response deadlines per severity, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationDeadlines {
    /// Deadline for critical alerts.
    pub critical_secs: u64,
    /// Deadline for high alerts.
    pub high_secs: u64,
    /// Deadline for medium alerts.
    pub medium_secs: u64,
    /// Deadline for low alerts.
    pub low_secs: u64,
}

impl Default for EscalationDeadlines {
    fn default() -> Self {
        Self {
            critical_secs: 5 * 60,
            high_secs: 15 * 60,
            medium_secs: 60 * 60,
            low_secs: 4 * 60 * 60,
        }
    }
}

impl EscalationDeadlines {
    /// Returns the deadline in seconds for a severity.
    #[must_use]
    pub const fn secs(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical_secs,
            Severity::High => self.high_secs,
            Severity::Medium => self.medium_secs,
            Severity::Low => self.low_secs,
        }
    }

    /// Returns the deadline for a severity.
    #[must_use]
    pub fn deadline(&self, severity: Severity) -> Duration {
        clamped_secs(self.secs(severity))
    }

    /// Returns the shortest deadline across all severities.
    #[must_use]
    pub fn shortest(&self) -> Duration {
        Severity::ALL
            .iter()
            .map(|s| self.deadline(*s))
            .min()
            .unwrap_or_else(Duration::zero)
    }

    /// Returns true if deadlines do not grow as severity rises.
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.critical_secs <= self.high_secs
            && self.high_secs <= self.medium_secs
            && self.medium_secs <= self.low_secs
    }
}

/// Escalation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Seconds between sweeps.
    pub sweep_interval_secs: u64,
    /// Per-severity response deadlines.
    pub deadlines: EscalationDeadlines,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            deadlines: EscalationDeadlines::default(),
        }
    }
}

impl EscalationPolicy {
    /// Returns the sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// An alert the sweep could not escalate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    /// The alert.
    pub alert_id: AlertId,
    /// Why the escalation failed.
    pub reason: String,
}

/// What one sweep did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// The instant the sweep evaluated deadlines against.
    pub started_at: DateTime<Utc>,
    /// Candidates returned by the store.
    pub scanned: usize,
    /// Alerts escalated by this sweep.
    pub escalated: Vec<AlertId>,
    /// Alerts resolved or escalated by someone else in the meantime.
    pub already_handled: usize,
    /// Alerts whose escalation failed; retried on the next sweep.
    pub failed: Vec<SweepFailure>,
    /// Set if the candidate list could not be fetched.
    pub fetch_error: Option<String>,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            scanned: 0,
            escalated: Vec::new(),
            already_handled: 0,
            failed: Vec::new(),
            fetch_error: None,
        }
    }

    /// Returns true if the sweep changed or failed to change anything.
    #[must_use]
    pub fn is_noteworthy(&self) -> bool {
        !self.escalated.is_empty() || !self.failed.is_empty() || self.fetch_error.is_some()
    }
}

/// Result of requesting a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The sweep ran.
    Completed(SweepReport),
    /// Another sweep was in progress.
    Skipped,
}

impl SweepOutcome {
    /// Returns the report if the sweep ran.
    #[must_use]
    pub const fn report(&self) -> Option<&SweepReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically escalates overdue alerts.
#[derive(Debug)]
pub struct EscalationScheduler {
    store: Arc<dyn AlertStore>,
    dispatcher: NotificationDispatcher,
    policy: EscalationPolicy,
    running: AtomicBool,
    sink: Option<Arc<dyn ReportSink>>,
}

impl EscalationScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertStore>,
        dispatcher: NotificationDispatcher,
        policy: EscalationPolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy,
            running: AtomicBool::new(false),
            sink: None,
        }
    }

    /// Publishes noteworthy sweep reports to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Runs one sweep at the current time.
    pub fn sweep(&self) -> SweepOutcome {
        self.sweep_at(Utc::now())
    }

    /// Runs one sweep, evaluating deadlines against `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepOutcome {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("escalation sweep already running, skipping");
            return SweepOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        let report = self.run_sweep(now);
        if report.is_noteworthy() {
            info!(
                scanned = report.scanned,
                escalated = report.escalated.len(),
                failed = report.failed.len(),
                "escalation sweep finished"
            );
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.publish(&MonitorSnapshot::EscalationSweep(report.clone())) {
                    warn!(error = %e, "failed to publish sweep report");
                }
            }
        }
        SweepOutcome::Completed(report)
    }

    fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::new(now);
        let deadlines = &self.policy.deadlines;

        let candidates = match self
            .store
            .list_unresolved_unescalated(deadlines.shortest(), now)
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "failed to list escalation candidates");
                report.fetch_error = Some(e.to_string());
                return report;
            }
        };
        report.scanned = candidates.len();

        for alert in candidates {
            if alert.age(now) <= deadlines.deadline(alert.severity) {
                continue;
            }
            match self.store.escalate(alert.id) {
                Ok(true) => {
                    warn!(
                        alert_id = %alert.id,
                        severity = %alert.severity,
                        age_secs = alert.age(now).num_seconds(),
                        "alert escalated"
                    );
                    self.dispatcher.dispatch_escalation(&alert);
                    report.escalated.push(alert.id);
                }
                Ok(false) => {
                    debug!(alert_id = %alert.id, "alert handled before escalation");
                    report.already_handled += 1;
                }
                Err(e) => {
                    error!(alert_id = %alert.id, error = %e, "failed to escalate alert");
                    report.failed.push(SweepFailure {
                        alert_id: alert.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Sweeps on every interval tick until `shutdown` becomes true.
    ///
    /// The first sweep runs immediately. A tick that falls due while a sweep
    /// is still running is delayed, not queued.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.policy.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.policy.sweep_interval().as_secs(),
            "escalation scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("escalation scheduler stopped");
    }
}
