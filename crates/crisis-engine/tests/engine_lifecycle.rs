//! End-to-end tests for the crisis engine.
//!
//! These tests verify:
//! 1. Analysis entry points raise alerts with the right severity
//! 2. Immediate notification waves and per-channel failure isolation
//! 3. The no-alert floor for signals without risk
//! 4. Deadline-driven escalation through the scheduler
//! 5. Reporting rollups over the same store
//! 6. Persistence failures reaching the caller

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crisis_engine::{
    AlertDraft, AlertId, AlertStore, AssessmentSignal, Channel, ClassificationContext,
    CrisisAlert, CrisisEngine, CrisisError, EngineConfig, EscalationScheduler, FileAlertStore,
    MemoryAlertStore, MonitorSnapshot, NotificationPayload, Notifier, ReportSink,
    ReportingAggregator, Result, Severity, SignalEvent, SubjectId, TextSignal, TriggerType, Wave,
};
use parking_lot::Mutex;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Default)]
struct RecordingNotifier {
    failing: Vec<Channel>,
    sent: Mutex<Vec<(AlertId, Channel, Wave)>>,
}

impl RecordingNotifier {
    fn failing(channels: &[Channel]) -> Self {
        Self {
            failing: channels.to_vec(),
            ..Self::default()
        }
    }

    fn channels_for(&self, id: AlertId, wave: Wave) -> Vec<Channel> {
        self.sent
            .lock()
            .iter()
            .filter(|(a, _, w)| *a == id && *w == wave)
            .map(|(_, c, _)| *c)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, channel: Channel, payload: &NotificationPayload) -> Result<()> {
        if self.failing.contains(&channel) {
            return Err(CrisisError::NotificationFailed {
                channel: channel.to_string(),
                reason: "provider timeout".to_string(),
            });
        }
        self.sent.lock().push((payload.alert_id, channel, payload.wave));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CollectingSink {
    snapshots: Mutex<Vec<MonitorSnapshot>>,
}

impl ReportSink for CollectingSink {
    fn publish(&self, snapshot: &MonitorSnapshot) -> Result<()> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

#[derive(Debug)]
struct UnavailableStore;

impl AlertStore for UnavailableStore {
    fn create(&self, _draft: AlertDraft) -> Result<CrisisAlert> {
        Err(CrisisError::Persistence {
            reason: "database unavailable".to_string(),
        })
    }
    fn get(&self, _id: AlertId) -> Result<Option<CrisisAlert>> {
        Ok(None)
    }
    fn resolve(&self, id: AlertId, _resolved_by: &str) -> Result<bool> {
        Err(CrisisError::AlertNotFound { id: id.to_string() })
    }
    fn escalate(&self, _id: AlertId) -> Result<bool> {
        Ok(false)
    }
    fn record_notifications(&self, _id: AlertId, _channels: &[Channel]) -> Result<()> {
        Ok(())
    }
    fn list_unresolved_unescalated(
        &self,
        _older_than: Duration,
        _now: DateTime<Utc>,
    ) -> Result<Vec<CrisisAlert>> {
        Ok(Vec::new())
    }
    fn list_active(&self) -> Result<Vec<CrisisAlert>> {
        Ok(Vec::new())
    }
    fn list_created_since(&self, _since: DateTime<Utc>) -> Result<Vec<CrisisAlert>> {
        Ok(Vec::new())
    }
}

struct Harness {
    store: Arc<MemoryAlertStore>,
    notifier: Arc<RecordingNotifier>,
    engine: CrisisEngine,
}

fn harness_with(notifier: RecordingNotifier) -> Harness {
    let store = Arc::new(MemoryAlertStore::new());
    let notifier = Arc::new(notifier);
    let engine = CrisisEngine::new(&EngineConfig::default(), store.clone(), notifier.clone());
    Harness {
        store,
        notifier,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(RecordingNotifier::default())
}

fn subject() -> SubjectId {
    SubjectId::anonymize("+1 555 010 2030", "integration-salt")
}

fn scheduler_for(h: &Harness) -> EscalationScheduler {
    let config = EngineConfig::default();
    EscalationScheduler::new(h.engine.store(), h.engine.dispatcher().clone(), config.escalation)
}

// ============================================================================
// Analysis Tests
// ============================================================================

#[test]
fn test_critical_keyword_alert_notifies_hotline() {
    let h = harness();

    let alert = h
        .engine
        .analyze_text(
            &subject(),
            "Honestly I think everyone would be better off dead without me",
            "en",
            &ClassificationContext::new(),
        )
        .unwrap()
        .expect("critical language must raise an alert");

    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.trigger_type, TriggerType::Keyword);
    let immediate = h.notifier.channels_for(alert.id, Wave::Immediate);
    assert!(immediate.contains(&Channel::Hotline));
    assert_eq!(
        immediate,
        vec![Channel::Hotline, Channel::AdminSms, Channel::AdminEmail]
    );

    let stored = h.store.get(alert.id).unwrap().unwrap();
    assert_eq!(stored.notifications_sent, alert.notifications_sent);
}

#[test]
fn test_spanish_critical_keyword() {
    let h = harness();
    let alert = h
        .engine
        .analyze_text(&subject(), "Ya no quiero vivir", "es-MX", &ClassificationContext::new())
        .unwrap()
        .expect("spanish critical language must raise an alert");
    assert_eq!(alert.severity, Severity::Critical);
}

#[test]
fn test_assessment_total_twelve_is_critical() {
    let h = harness();
    let alert = h
        .engine
        .analyze_assessment(&subject(), 12.0, &BTreeMap::new())
        .unwrap()
        .unwrap();
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.trigger_type, TriggerType::AssessmentScore);
}

#[test]
fn test_combined_subscales_reach_high() {
    let h = harness();
    let subscales = BTreeMap::from([
        ("depression".to_string(), 4.0),
        ("anxiety".to_string(), 4.0),
    ]);

    let alert = h
        .engine
        .analyze_assessment(&subject(), 7.0, &subscales)
        .unwrap()
        .unwrap();

    assert!(alert.severity >= Severity::High);
    assert!(
        alert
            .risk_factors
            .iter()
            .any(|f| f.starts_with("combined_subscale_risk"))
    );
}

#[test]
fn test_no_risk_is_never_persisted() {
    let h = harness();

    let text = h
        .engine
        .analyze_text(
            &subject(),
            "see you at practice tomorrow",
            "en",
            &ClassificationContext::new(),
        )
        .unwrap();
    let assessment = h
        .engine
        .analyze_assessment(&subject(), 1.0, &BTreeMap::new())
        .unwrap();
    let event = h
        .engine
        .analyze_event(&subject(), &SignalEvent::default(), &ClassificationContext::new())
        .unwrap();

    assert!(text.is_none());
    assert!(assessment.is_none());
    assert!(event.is_none());
    assert!(h.store.is_empty());
    assert!(h.notifier.sent.lock().is_empty());
}

#[test]
fn test_event_keeps_higher_severity() {
    let h = harness();
    let event = SignalEvent {
        text: Some(TextSignal::new("I've been so overwhelmed lately", "en")),
        assessment: Some(
            AssessmentSignal::new(9.5)
                .subscale("depression", 5.0)
                .subscale("stress", 6.0),
        ),
    };

    let alert = h
        .engine
        .analyze_event(&subject(), &event, &ClassificationContext::new())
        .unwrap()
        .unwrap();

    assert_eq!(alert.severity, Severity::High);
    assert!(alert.risk_factors.iter().any(|f| f.contains("overwhelmed")));
    assert!(alert.risk_factors.iter().any(|f| f.contains("assessment_total")));
}

#[test]
fn test_repeat_alerts_raise_severity() {
    let h = harness();
    let context = ClassificationContext::new().with_prior_alert_count(3);

    let alert = h
        .engine
        .analyze_text(&subject(), "i feel worthless", "en", &context)
        .unwrap()
        .unwrap();

    assert_eq!(alert.severity, Severity::Medium);
    assert!(alert.risk_factors.iter().any(|f| f.starts_with("repeat_alerts")));
}

// ============================================================================
// Notification Tests
// ============================================================================

#[test]
fn test_failed_channel_does_not_block_wave() {
    let h = harness_with(RecordingNotifier::failing(&[Channel::Hotline]));

    let alert = h
        .engine
        .analyze_text(&subject(), "thinking about suicide", "en", &ClassificationContext::new())
        .unwrap()
        .unwrap();

    assert_eq!(
        alert.notifications_sent,
        vec![Channel::AdminSms, Channel::AdminEmail]
    );
    let stored = h.store.get(alert.id).unwrap().unwrap();
    assert_eq!(stored.notifications_sent, alert.notifications_sent);
}

#[test]
fn test_medium_alert_has_no_immediate_wave() {
    let h = harness();
    let alert = h
        .engine
        .analyze_text(&subject(), "i feel so alone", "en", &ClassificationContext::new())
        .unwrap()
        .unwrap();
    assert_eq!(alert.severity, Severity::Medium);
    assert!(alert.notifications_sent.is_empty());
    assert!(h.notifier.sent.lock().is_empty());
}

// ============================================================================
// Escalation Tests
// ============================================================================

#[test]
fn test_high_alert_escalates_after_fifteen_minutes() {
    let h = harness();
    let scheduler = scheduler_for(&h);
    let alert = h
        .engine
        .raise_manual(&subject(), Severity::High, "student disclosed plan", "counselor-4")
        .unwrap();

    let early = scheduler.sweep_at(alert.created_at + Duration::minutes(15));
    assert!(early.report().unwrap().escalated.is_empty());
    assert!(h.notifier.channels_for(alert.id, Wave::Escalation).is_empty());

    let late = scheduler.sweep_at(alert.created_at + Duration::minutes(16));
    assert_eq!(late.report().unwrap().escalated, vec![alert.id]);

    let stored = h.store.get(alert.id).unwrap().unwrap();
    assert!(stored.escalated);
    assert_eq!(
        stored.notifications_sent,
        vec![
            Channel::AdminEmail,
            Channel::ChatUrgent,
            Channel::EscalationTeam,
            Channel::EmergencyContact
        ]
    );

    let again = scheduler.sweep_at(alert.created_at + Duration::minutes(30));
    assert!(again.report().unwrap().escalated.is_empty());
}

#[test]
fn test_resolution_before_deadline_prevents_escalation() {
    let h = harness();
    let scheduler = scheduler_for(&h);
    let alert = h
        .engine
        .raise_manual(&subject(), Severity::Critical, "call received", "hotline")
        .unwrap();

    assert!(h.engine.resolve(alert.id, "counselor-2").unwrap());
    let outcome = scheduler.sweep_at(alert.created_at + Duration::hours(1));

    assert!(outcome.report().unwrap().escalated.is_empty());
    assert!(h.notifier.channels_for(alert.id, Wave::Escalation).is_empty());
    assert!(!h.store.get(alert.id).unwrap().unwrap().escalated);
}

#[test]
fn test_resolve_is_idempotent() {
    let h = harness();
    let alert = h
        .engine
        .raise_manual(&subject(), Severity::Low, "check in", "counselor-5")
        .unwrap();

    assert!(h.engine.resolve(alert.id, "counselor-5").unwrap());
    let first = h.store.get(alert.id).unwrap().unwrap();
    assert!(h.engine.resolve(alert.id, "counselor-6").unwrap());
    let second = h.store.get(alert.id).unwrap().unwrap();

    assert!(second.resolved);
    assert_eq!(first.resolved_at, second.resolved_at);
    assert_eq!(second.resolved_by.as_deref(), Some("counselor-5"));
}

#[test]
fn test_resolve_unknown_alert_fails() {
    let h = harness();
    let err = h.engine.resolve(AlertId::new(), "counselor-1").unwrap_err();
    assert!(matches!(err, CrisisError::AlertNotFound { .. }));
}

// ============================================================================
// Reporting Tests
// ============================================================================

#[test]
fn test_rollup_resolution_rate() {
    let h = harness();
    let mut ids = Vec::new();
    for i in 0..10 {
        let alert = h
            .engine
            .raise_manual(&subject(), Severity::Medium, &format!("case {i}"), "ops")
            .unwrap();
        ids.push(alert.id);
    }
    for id in ids.iter().take(6) {
        h.engine.resolve(*id, "counselor-1").unwrap();
    }

    let sink = Arc::new(CollectingSink::default());
    let aggregator = ReportingAggregator::new(
        h.engine.store(),
        sink.clone(),
        EngineConfig::default().reporting,
    );
    let rollup = aggregator.publish_at(Utc::now()).unwrap();

    assert_eq!(rollup.total, 10);
    assert_eq!(rollup.resolved, 6);
    assert!((rollup.resolution_rate - 0.6).abs() < f64::EPSILON);
    assert_eq!(sink.snapshots.lock().len(), 1);
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[test]
fn test_persistence_failure_reaches_caller() {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = CrisisEngine::new(
        &EngineConfig::default(),
        Arc::new(UnavailableStore),
        notifier.clone(),
    );

    let err = engine
        .analyze_text(&subject(), "I want to die", "en", &ClassificationContext::new())
        .unwrap_err();

    assert!(matches!(err, CrisisError::Persistence { .. }));
    assert!(notifier.sent.lock().is_empty());
}

#[test]
fn test_file_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts.json");
    let notifier = Arc::new(RecordingNotifier::default());

    let alert = {
        let store = Arc::new(FileAlertStore::open(&path).unwrap());
        let engine = CrisisEngine::new(&EngineConfig::default(), store, notifier.clone());
        engine
            .analyze_assessment(&subject(), 11.0, &BTreeMap::new())
            .unwrap()
            .unwrap()
    };

    let store = Arc::new(FileAlertStore::open(&path).unwrap());
    let engine = CrisisEngine::new(&EngineConfig::default(), store, notifier);
    let active = engine.list_active().unwrap();

    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, alert.id);
    assert_eq!(active[0].notifications_sent, alert.notifications_sent);
}

#[test]
fn test_operator_changes_on_shared_file_are_seen_by_daemon() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts.json");
    let notifier = Arc::new(RecordingNotifier::default());
    let config = EngineConfig::default();

    let daemon = CrisisEngine::new(
        &config,
        Arc::new(FileAlertStore::open(&path).unwrap()),
        notifier.clone(),
    );
    let scheduler = EscalationScheduler::new(
        daemon.store(),
        daemon.dispatcher().clone(),
        EngineConfig::default().escalation,
    );
    let alert = daemon
        .raise_manual(&subject(), Severity::High, "student disclosed plan", "counselor-4")
        .unwrap();

    let operator = FileAlertStore::open(&path).unwrap();
    assert!(operator.resolve(alert.id, "counselor-1").unwrap());

    let sweep = scheduler.sweep_at(alert.created_at + Duration::minutes(16));
    assert!(sweep.report().unwrap().escalated.is_empty());
    assert!(notifier.channels_for(alert.id, Wave::Escalation).is_empty());

    let cli = CrisisEngine::new(
        &config,
        Arc::new(FileAlertStore::open(&path).unwrap()),
        notifier.clone(),
    );
    let later = cli
        .raise_manual(&subject(), Severity::Medium, "missed check-ins", "counselor-1")
        .unwrap();
    let sweep = scheduler.sweep_at(later.created_at + Duration::hours(2));
    assert_eq!(sweep.report().unwrap().escalated, vec![later.id]);

    let stored = FileAlertStore::open(&path).unwrap();
    let resolved = stored.get(alert.id).unwrap().unwrap();
    assert!(resolved.resolved);
    assert!(!resolved.escalated);
    assert!(stored.get(later.id).unwrap().unwrap().escalated);
}
