//! Crisis risk detection and time-based escalation.
//!
//! `crisis-engine` turns raw signals about a subject (free-text messages,
//! scored assessments, behavioral history) into severity-graded alerts,
//! notifies responders for urgent alerts, and escalates alerts nobody acted
//! on within their severity's response deadline.
//!
//! # Features
//!
//! - **Signal Extractors**: Pure keyword, assessment and behavior extractors
//!   producing weighted risk indicators
//! - **Severity Classifier**: Strongest-signal classification with
//!   contextual modifiers
//! - **Alert Store**: Compare-and-set lifecycle transitions over an in-memory
//!   or JSON-file backend
//! - **Notification Waves**: Per-channel failure isolation for immediate and
//!   escalation notifications
//! - **Escalation Scheduler**: Single-flight periodic sweeps against
//!   per-severity deadlines
//! - **Reporting**: Periodic rollups published as typed snapshots
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use crisis_engine::{
//!     ClassificationContext, CrisisEngine, EngineConfig, MemoryAlertStore, Severity,
//!     SubjectId, TracingNotifier,
//! };
//!
//! # fn main() -> crisis_engine::Result<()> {
//! let engine = CrisisEngine::new(
//!     &EngineConfig::default(),
//!     Arc::new(MemoryAlertStore::new()),
//!     Arc::new(TracingNotifier::new()),
//! );
//!
//! let subject = SubjectId::anonymize("student@example.org", "district-salt");
//! let alert = engine
//!     .analyze_text(&subject, "I want to end my life", "en", &ClassificationContext::new())?
//!     .expect("critical language raises an alert");
//!
//! assert_eq!(alert.severity, Severity::Critical);
//! assert!(engine.resolve(alert.id, "counselor-1")?);
//! # Ok(())
//! # }
//! ```
//!
//! # Running the loops
//!
//! The scheduler and the aggregator are driven by tokio and stop when their
//! shutdown watch flips to `true`:
//!
//! ```rust,ignore
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(Arc::new(scheduler).run(shutdown_rx.clone()));
//! tokio::spawn(Arc::new(aggregator).run(shutdown_rx));
//! // ...
//! shutdown_tx.send(true)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod extractors;
pub mod file_store;
pub mod reporting;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use channels::{NotificationPayload, Notifier, RoutingNotifier, TracingNotifier, Wave};
pub use classifier::{Classification, ClassificationContext, ClassifierPolicy, SeverityClassifier};
pub use config::{EngineConfig, StoreConfig};
pub use dispatcher::{ESCALATION_CHANNELS, NotificationDispatcher, WaveReport, immediate_channels};
pub use engine::{AssessmentSignal, CrisisEngine, SignalEvent, TextSignal};
pub use error::{CrisisError, Result};
pub use escalation::{
    EscalationDeadlines, EscalationPolicy, EscalationScheduler, SweepFailure, SweepOutcome,
    SweepReport,
};
pub use extractors::{AssessmentPolicy, BehaviorHistory, BehaviorPolicy, KeywordPolicy};
pub use file_store::FileAlertStore;
pub use reporting::{
    AlertRollup, MonitorSnapshot, ReportSink, ReportingAggregator, ReportingConfig,
    SeverityCounts, TracingReportSink, summarize,
};
pub use store::{AlertStore, MemoryAlertStore};
pub use types::{
    AlertDraft, AlertId, Channel, CrisisAlert, RiskIndicator, Severity, SubjectId, TriggerType,
};
