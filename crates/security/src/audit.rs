//! Audit logging: a record of every permission decision.
//!
//! Each check the gate resolves (from cache, from policy or from the
//! operator) is recorded with the scope it came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Entries kept in memory by default. Sinks see every entry regardless.
pub const DEFAULT_AUDIT_RETENTION: usize = 1_000;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    /// File path or shell command
    pub resource: String,
    pub outcome: AuditOutcome,
    /// Where the decision came from ("session", "policy", "prompt", ...)
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A file write, edit, directory creation or shell command was checked
    PermissionCheck { operation: String },
    /// A command matched the danger table
    DangerousCommand { description: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Audit logger that forwards entries to sinks and keeps the most recent
/// ones in memory.
pub struct AuditLogger {
    entries: Mutex<VecDeque<AuditEntry>>,
    retention: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("retention", &self.retention)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            retention: DEFAULT_AUDIT_RETENTION,
            sinks,
        }
    }

    /// Keep at most `retention` entries in memory, dropping the oldest.
    /// Zero keeps none.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn log(&self, event: AuditEvent, resource: &str, outcome: AuditOutcome, source: &str) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            resource: resource.into(),
            outcome,
            source: source.into(),
        };

        for sink in &self.sinks {
            sink.record(&entry);
        }
        if self.retention == 0 {
            return;
        }
        let mut entries = self.lock();
        while entries.len() >= self.retention {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn entries_by_outcome(&self, outcome: AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| e.outcome == outcome)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            resource = %entry.resource,
            outcome = ?entry.outcome,
            source = %entry.source,
            "AUDIT"
        );
    }
}
