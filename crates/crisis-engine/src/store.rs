//! Alert persistence.
//!
//! This module provides the [`AlertStore`] trait, the seam to the
//! persistence collaborator, and [`MemoryAlertStore`], an in-process
//! implementation. Every mutating operation is a single conditional update
//! under one write lock, so concurrent escalations and resolutions of the
//! same alert cannot both win.
//!
//! See [`crate::file_store`] for the durable JSON-file backend.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{CrisisError, Result};
use crate::types::{AlertDraft, AlertId, Channel, CrisisAlert};

/// Trait for alert storage backends.
///
/// `create` must be durable before it returns. `resolve` and `escalate`
/// must each behave as one compare-and-set on the stored flags.
pub trait AlertStore: Send + Sync + std::fmt::Debug {
    /// Assigns an id and timestamp to the draft, persists it and returns
    /// the stored alert.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::Persistence` if the alert could not be stored.
    fn create(&self, draft: AlertDraft) -> Result<CrisisAlert>;

    /// Gets an alert by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, id: AlertId) -> Result<Option<CrisisAlert>>;

    /// Resolves an alert. Idempotent: an already-resolved alert returns
    /// `true` and keeps its original resolution fields.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::AlertNotFound` for an unknown id, or
    /// `CrisisError::Persistence` if the change could not be stored.
    fn resolve(&self, id: AlertId, resolved_by: &str) -> Result<bool>;

    /// Escalates an alert. Returns `false` if it is already resolved or
    /// already escalated at the time of the check.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::AlertNotFound` for an unknown id, or
    /// `CrisisError::Persistence` if the change could not be stored.
    fn escalate(&self, id: AlertId) -> Result<bool>;

    /// Appends channels to the alert's `notifications_sent`, skipping
    /// channels already recorded.
    ///
    /// # Errors
    ///
    /// Returns `CrisisError::AlertNotFound` for an unknown id, or
    /// `CrisisError::Persistence` if the change could not be stored.
    fn record_notifications(&self, id: AlertId, channels: &[Channel]) -> Result<()>;

    /// Lists alerts that are unresolved, unescalated and older than
    /// `older_than` at `now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_unresolved_unescalated(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<CrisisAlert>>;

    /// Lists unresolved alerts by severity descending, then newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_active(&self) -> Result<Vec<CrisisAlert>>;

    /// Lists alerts created at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_created_since(&self, since: DateTime<Utc>) -> Result<Vec<CrisisAlert>>;
}

/// What a conditional update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// The stored alert changed and must be persisted.
    Applied,
    /// The guard did not hold; nothing changed.
    Unchanged,
}

/// The alert table shared by the store backends.
#[derive(Debug, Default, Clone)]
pub(crate) struct AlertTable {
    alerts: HashMap<AlertId, CrisisAlert>,
}

impl AlertTable {
    pub(crate) fn from_alerts(alerts: Vec<CrisisAlert>) -> Self {
        Self {
            alerts: alerts.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.alerts.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<CrisisAlert> {
        let mut alerts: Vec<_> = self.alerts.values().cloned().collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        alerts
    }

    pub(crate) fn get(&self, id: AlertId) -> Option<&CrisisAlert> {
        self.alerts.get(&id)
    }

    pub(crate) fn insert(&mut self, alert: CrisisAlert) {
        self.alerts.insert(alert.id, alert);
    }

    /// Applies `f` to the alert; `f` returns whether it changed anything.
    pub(crate) fn update<F>(&mut self, id: AlertId, f: F) -> Result<Transition>
    where
        F: FnOnce(&mut CrisisAlert) -> bool,
    {
        let alert = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| CrisisError::AlertNotFound { id: id.to_string() })?;
        if f(alert) {
            Ok(Transition::Applied)
        } else {
            Ok(Transition::Unchanged)
        }
    }

    pub(crate) fn unresolved_unescalated(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Vec<CrisisAlert> {
        let mut alerts: Vec<_> = self
            .alerts
            .values()
            .filter(|a| !a.resolved && !a.escalated && a.age(now) > older_than)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }

    pub(crate) fn active(&self) -> Vec<CrisisAlert> {
        let mut alerts: Vec<_> = self.alerts.values().filter(|a| a.is_active()).cloned().collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.created_at.cmp(&a.created_at))
        });
        alerts
    }

    pub(crate) fn created_since(&self, since: DateTime<Utc>) -> Vec<CrisisAlert> {
        let mut alerts: Vec<_> = self
            .alerts
            .values()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }
}

/// In-memory alert store.
///
/// Durable only for the life of the process; suitable for tests and for
/// embedders that mirror alerts into their own database.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    table: RwLock<AlertTable>,
}

impl MemoryAlertStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if no alerts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a fully formed alert, replacing any alert with the same id.
    ///
    /// Intended for imports and tests that need control over `created_at`.
    pub fn insert(&self, alert: CrisisAlert) {
        self.table.write().insert(alert);
    }
}

impl AlertStore for MemoryAlertStore {
    fn create(&self, draft: AlertDraft) -> Result<CrisisAlert> {
        let alert = CrisisAlert::from_draft(draft, Utc::now());
        self.table.write().insert(alert.clone());
        info!(
            alert_id = %alert.id,
            subject_id = %alert.subject_id,
            severity = %alert.severity,
            trigger = %alert.trigger_type,
            "alert created"
        );
        Ok(alert)
    }

    fn get(&self, id: AlertId) -> Result<Option<CrisisAlert>> {
        Ok(self.table.read().get(id).cloned())
    }

    fn resolve(&self, id: AlertId, resolved_by: &str) -> Result<bool> {
        let transition = self
            .table
            .write()
            .update(id, |a| a.resolve(resolved_by, Utc::now()))?;
        if transition == Transition::Applied {
            info!(alert_id = %id, resolved_by = %resolved_by, "alert resolved");
        } else {
            debug!(alert_id = %id, "alert already resolved");
        }
        Ok(true)
    }

    fn escalate(&self, id: AlertId) -> Result<bool> {
        let transition = self.table.write().update(id, |a| a.escalate(Utc::now()))?;
        Ok(transition == Transition::Applied)
    }

    fn record_notifications(&self, id: AlertId, channels: &[Channel]) -> Result<()> {
        self.table
            .write()
            .update(id, |a| a.record_notifications(channels) > 0)?;
        Ok(())
    }

    fn list_unresolved_unescalated(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<CrisisAlert>> {
        Ok(self.table.read().unresolved_unescalated(older_than, now))
    }

    fn list_active(&self) -> Result<Vec<CrisisAlert>> {
        Ok(self.table.read().active())
    }

    fn list_created_since(&self, since: DateTime<Utc>) -> Result<Vec<CrisisAlert>> {
        Ok(self.table.read().created_since(since))
    }
}
