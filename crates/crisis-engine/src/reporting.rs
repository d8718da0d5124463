//! Monitoring rollups.
//!
//! The [`ReportingAggregator`] periodically summarises the alerts created in
//! a trailing window and publishes the result to a [`ReportSink`]. Sweep
//! reports from the escalation scheduler go to the same sink, so a single
//! consumer sees every monitoring snapshot the engine produces.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::error::Result;
use crate::escalation::{SweepReport, clamped_secs};
use crate::store::AlertStore;
use crate::types::{CrisisAlert, Severity};

/// Reporting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Seconds between rollups.
    pub interval_secs: u64,
    /// Length of the trailing window each rollup covers.
    pub window_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 4 * 60 * 60,
            window_secs: 24 * 60 * 60,
        }
    }
}

/// Alert counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// Critical alerts.
    pub critical: usize,
    /// High alerts.
    pub high: usize,
    /// Medium alerts.
    pub medium: usize,
    /// Low alerts.
    pub low: usize,
}

impl SeverityCounts {
    /// Counts one alert of `severity`.
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    /// Returns the count for `severity`.
    #[must_use]
    pub const fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// Summary of the alerts created in one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRollup {
    /// When the rollup was computed.
    pub generated_at: DateTime<Utc>,
    /// Start of the window (inclusive).
    pub window_start: DateTime<Utc>,
    /// End of the window (inclusive).
    pub window_end: DateTime<Utc>,
    /// Alerts created in the window.
    pub total: usize,
    /// Counts per severity.
    pub by_severity: SeverityCounts,
    /// How many of them are resolved.
    pub resolved: usize,
    /// How many of them were escalated.
    pub escalated: usize,
    /// `resolved / total`, or 0 for an empty window.
    pub resolution_rate: f64,
}

/// Summarises `alerts` created within `[start, end]`.
///
/// Alerts outside the window are ignored.
#[must_use]
pub fn summarize(alerts: &[CrisisAlert], start: DateTime<Utc>, end: DateTime<Utc>) -> AlertRollup {
    let mut by_severity = SeverityCounts::default();
    let mut total = 0;
    let mut resolved = 0;
    let mut escalated = 0;

    for alert in alerts
        .iter()
        .filter(|a| a.created_at >= start && a.created_at <= end)
    {
        total += 1;
        by_severity.add(alert.severity);
        if alert.resolved {
            resolved += 1;
        }
        if alert.escalated {
            escalated += 1;
        }
    }

    let resolution_rate = if total == 0 {
        0.0
    } else {
        resolved as f64 / total as f64
    };

    AlertRollup {
        generated_at: end,
        window_start: start,
        window_end: end,
        total,
        by_severity,
        resolved,
        escalated,
        resolution_rate,
    }
}

/// A monitoring snapshot published to a [`ReportSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorSnapshot {
    /// Periodic alert rollup.
    AlertRollup(AlertRollup),
    /// Result of an escalation sweep.
    EscalationSweep(SweepReport),
}

/// Trait for monitoring consumers.
pub trait ReportSink: Send + Sync + std::fmt::Debug {
    /// Publishes one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be delivered.
    fn publish(&self, snapshot: &MonitorSnapshot) -> Result<()>;
}

/// A sink that logs each snapshot as JSON through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn publish(&self, snapshot: &MonitorSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        match snapshot {
            MonitorSnapshot::AlertRollup(rollup) => info!(
                total = rollup.total,
                resolved = rollup.resolved,
                escalated = rollup.escalated,
                resolution_rate = rollup.resolution_rate,
                snapshot = %json,
                "alert rollup"
            ),
            MonitorSnapshot::EscalationSweep(report) => info!(
                escalated = report.escalated.len(),
                failed = report.failed.len(),
                snapshot = %json,
                "escalation sweep"
            ),
        }
        Ok(())
    }
}

/// Periodically publishes alert rollups.
#[derive(Debug)]
pub struct ReportingAggregator {
    store: Arc<dyn AlertStore>,
    sink: Arc<dyn ReportSink>,
    config: ReportingConfig,
}

impl ReportingAggregator {
    /// Creates an aggregator.
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertStore>,
        sink: Arc<dyn ReportSink>,
        config: ReportingConfig,
    ) -> Self {
        Self { store, sink, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReportingConfig {
        &self.config
    }

    /// Computes the rollup for the window ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub fn rollup_at(&self, now: DateTime<Utc>) -> Result<AlertRollup> {
        let start = now - clamped_secs(self.config.window_secs);
        let alerts = self.store.list_created_since(start)?;
        Ok(summarize(&alerts, start, now))
    }

    /// Computes the rollup ending at `now` and publishes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried or the sink rejects
    /// the snapshot.
    pub fn publish_at(&self, now: DateTime<Utc>) -> Result<AlertRollup> {
        let rollup = self.rollup_at(now)?;
        self.sink
            .publish(&MonitorSnapshot::AlertRollup(rollup.clone()))?;
        Ok(rollup)
    }

    /// Publishes a rollup on every interval tick until `shutdown` becomes
    /// true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = std::time::Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "reporting aggregator started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_at(Utc::now()) {
                        error!(error = %e, "failed to publish alert rollup");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("reporting aggregator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrisisError;
    use crate::store::MemoryAlertStore;
    use crate::types::{AlertDraft, SubjectId, TriggerType};
    use chrono::Duration;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Collector {
        published: Mutex<Vec<MonitorSnapshot>>,
        reject: bool,
    }

    impl ReportSink for Collector {
        fn publish(&self, snapshot: &MonitorSnapshot) -> Result<()> {
            if self.reject {
                return Err(CrisisError::Serialization("sink closed".to_string()));
            }
            self.published.lock().push(snapshot.clone());
            Ok(())
        }
    }

    fn alert_at(severity: Severity, created_at: DateTime<Utc>) -> CrisisAlert {
        CrisisAlert::from_draft(
            AlertDraft::new(
                SubjectId::new("subj_report").unwrap(),
                severity,
                TriggerType::Keyword,
            ),
            created_at,
        )
    }

    mod summarize_tests {
        use super::*;

        #[test]
        fn ten_alerts_six_resolved() {
            let end = Utc::now();
            let start = end - Duration::hours(24);
            let alerts: Vec<CrisisAlert> = (0..10)
                .map(|i| {
                    let mut alert = alert_at(
                        if i % 2 == 0 { Severity::High } else { Severity::Medium },
                        end - Duration::hours(i),
                    );
                    if i < 6 {
                        alert.resolve("counselor-2", end);
                    }
                    alert
                })
                .collect();

            let rollup = summarize(&alerts, start, end);
            assert_eq!(rollup.total, 10);
            assert_eq!(rollup.resolved, 6);
            assert!((rollup.resolution_rate - 0.6).abs() < f64::EPSILON);
            assert_eq!(rollup.by_severity.get(Severity::High), 5);
            assert_eq!(rollup.by_severity.get(Severity::Medium), 5);
        }

        #[test]
        fn empty_window_has_zero_rate() {
            let end = Utc::now();
            let rollup = summarize(&[], end - Duration::hours(24), end);
            assert_eq!(rollup.total, 0);
            assert!(rollup.resolution_rate.abs() < f64::EPSILON);
        }

        #[test]
        fn alerts_outside_window_are_ignored() {
            let end = Utc::now();
            let alerts = vec![
                alert_at(Severity::Critical, end - Duration::hours(30)),
                alert_at(Severity::Critical, end - Duration::hours(1)),
            ];
            let rollup = summarize(&alerts, end - Duration::hours(24), end);
            assert_eq!(rollup.total, 1);
            assert_eq!(rollup.by_severity.critical, 1);
        }

        #[test]
        fn escalations_are_counted() {
            let end = Utc::now();
            let mut alert = alert_at(Severity::Critical, end - Duration::hours(2));
            alert.escalate(end);
            let rollup = summarize(&[alert], end - Duration::hours(24), end);
            assert_eq!(rollup.escalated, 1);
        }
    }

    mod snapshot_tests {
        use super::*;

        #[test]
        fn snapshot_is_tagged() {
            let now = Utc::now();
            let snapshot = MonitorSnapshot::AlertRollup(summarize(&[], now, now));
            let json = serde_json::to_value(&snapshot).unwrap();
            assert_eq!(json["kind"], "alert_rollup");
            assert_eq!(json["total"], 0);
        }

        #[test]
        fn tracing_sink_accepts_snapshots() {
            let now = Utc::now();
            let sink = TracingReportSink;
            assert!(sink.publish(&MonitorSnapshot::AlertRollup(summarize(&[], now, now))).is_ok());
        }
    }

    mod aggregator_tests {
        use super::*;

        #[test]
        fn publish_uses_trailing_window() {
            let store = Arc::new(MemoryAlertStore::new());
            let now = Utc::now();
            store.insert(alert_at(Severity::High, now - Duration::hours(2)));
            store.insert(alert_at(Severity::Low, now - Duration::hours(48)));
            let sink = Arc::new(Collector::default());
            let aggregator =
                ReportingAggregator::new(store, sink.clone(), ReportingConfig::default());

            let rollup = aggregator.publish_at(now).unwrap();
            assert_eq!(rollup.total, 1);
            assert_eq!(rollup.window_start, now - Duration::hours(24));
            assert_eq!(sink.published.lock().len(), 1);
        }

        #[test]
        fn sink_failure_propagates() {
            let sink = Arc::new(Collector {
                reject: true,
                ..Collector::default()
            });
            let aggregator = ReportingAggregator::new(
                Arc::new(MemoryAlertStore::new()),
                sink,
                ReportingConfig::default(),
            );
            assert!(aggregator.publish_at(Utc::now()).is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn run_publishes_each_interval() {
            let sink = Arc::new(Collector::default());
            let aggregator = Arc::new(ReportingAggregator::new(
                Arc::new(MemoryAlertStore::new()),
                sink.clone(),
                ReportingConfig {
                    interval_secs: 60,
                    window_secs: 3600,
                },
            ));

            let (tx, rx) = watch::channel(false);
            let handle = tokio::spawn(Arc::clone(&aggregator).run(rx));
            tokio::time::sleep(std::time::Duration::from_secs(150)).await;
            tx.send(true).unwrap();
            handle.await.unwrap();

            assert_eq!(sink.published.lock().len(), 3);
        }
    }
}
