//! File-based alert storage.
//!
//! This module provides [`FileAlertStore`], a durable [`AlertStore`] that
//! keeps the alert table in one JSON file shared by every process that opens
//! the same path (the daemon and one-shot operator commands alike).
//!
//! Every operation takes an advisory lock on a sibling `<file>.lock`, shared
//! for reads and exclusive for writes, and reloads the table from disk while
//! holding it. Mutations apply their compare-and-set against that fresh copy
//! and write a new snapshot to `<file>.tmp`, which is synced and renamed over
//! the previous one before the lock is released. A failed write leaves the
//! previous snapshot in place.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fd_lock::RwLock as FileLock;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::error::{CrisisError, Result};
use crate::store::{AlertStore, AlertTable, Transition};
use crate::types::{AlertDraft, AlertId, Channel, CrisisAlert};

/// Durable alert store backed by a JSON file.
#[derive(Debug)]
pub struct FileAlertStore {
    path: PathBuf,
    lock_path: PathBuf,
    // Orders threads of this process before they contend for the file lock.
    local: RwLock<()>,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

impl FileAlertStore {
    /// Opens the store at `path`, validating existing alerts if the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the lock
    /// file cannot be opened, or the existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            lock_path: sibling(&path, ".lock"),
            path,
            local: RwLock::new(()),
        };
        let count = store.read(AlertTable::len)?;
        debug!(path = %store.path.display(), count, "opened alert store");
        Ok(store)
    }

    /// Returns the snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of stored alerts.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn len(&self) -> Result<usize> {
        self.read(AlertTable::len)
    }

    /// Returns true if no alerts are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, ".tmp")
    }

    fn persistence_error(&self, e: &dyn std::fmt::Display) -> CrisisError {
        CrisisError::Persistence {
            reason: format!("{}: {e}", self.path.display()),
        }
    }

    fn open_lock(&self) -> Result<FileLock<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| self.persistence_error(&e))?;
        Ok(FileLock::new(file))
    }

    fn load(&self) -> Result<AlertTable> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AlertTable::default()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(AlertTable::default());
        }
        let alerts: Vec<CrisisAlert> = serde_json::from_str(&content)?;
        Ok(AlertTable::from_alerts(alerts))
    }

    fn persist(&self, table: &AlertTable) -> Result<()> {
        let write = || -> std::io::Result<()> {
            let temp = self.temp_path();
            let file = File::create(&temp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &table.snapshot())?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&temp, &self.path)
        };
        write().map_err(|e| {
            error!(path = %self.path.display(), error = %e, "failed to persist alerts");
            self.persistence_error(&e)
        })
    }

    /// Runs `f` against the current snapshot under a shared file lock.
    fn read<T>(&self, f: impl FnOnce(&AlertTable) -> T) -> Result<T> {
        let _local = self.local.read();
        let lock = self.open_lock()?;
        let _shared = lock.read().map_err(|e| self.persistence_error(&e))?;
        Ok(f(&self.load()?))
    }

    /// Runs `f` against the current snapshot under an exclusive file lock and
    /// persists the table when `f` reports a change.
    fn write<T>(&self, f: impl FnOnce(&mut AlertTable) -> Result<(T, bool)>) -> Result<T> {
        let _local = self.local.write();
        let mut lock = self.open_lock()?;
        let _exclusive = lock.write().map_err(|e| self.persistence_error(&e))?;
        let mut table = self.load()?;
        let (value, changed) = f(&mut table)?;
        if changed {
            self.persist(&table)?;
        }
        Ok(value)
    }

    fn update<F>(&self, id: AlertId, f: F) -> Result<Transition>
    where
        F: FnOnce(&mut CrisisAlert) -> bool,
    {
        self.write(|table| {
            let transition = table.update(id, f)?;
            Ok((transition, transition == Transition::Applied))
        })
    }
}

impl AlertStore for FileAlertStore {
    fn create(&self, draft: AlertDraft) -> Result<CrisisAlert> {
        let alert = CrisisAlert::from_draft(draft, Utc::now());
        self.write(|table| {
            table.insert(alert.clone());
            Ok(((), true))
        })?;
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
        self.read(|table| table.get(id).cloned())
    }

    fn resolve(&self, id: AlertId, resolved_by: &str) -> Result<bool> {
        if self.update(id, |a| a.resolve(resolved_by, Utc::now()))? == Transition::Applied {
            info!(alert_id = %id, resolved_by = %resolved_by, "alert resolved");
        }
        Ok(true)
    }

    fn escalate(&self, id: AlertId) -> Result<bool> {
        Ok(self.update(id, |a| a.escalate(Utc::now()))? == Transition::Applied)
    }

    fn record_notifications(&self, id: AlertId, channels: &[Channel]) -> Result<()> {
        self.update(id, |a| a.record_notifications(channels) > 0)?;
        Ok(())
    }

    fn list_unresolved_unescalated(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<CrisisAlert>> {
        self.read(|table| table.unresolved_unescalated(older_than, now))
    }

    fn list_active(&self) -> Result<Vec<CrisisAlert>> {
        self.read(AlertTable::active)
    }

    fn list_created_since(&self, since: DateTime<Utc>) -> Result<Vec<CrisisAlert>> {
        self.read(|table| table.created_since(since))
    }
}
