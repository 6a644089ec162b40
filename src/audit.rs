//! Audit Log
//!
//! One append-only entry per pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    /// Completed with no errored records
    Success,
    /// Completed with errored records, or interrupted between disks
    Partial,
    /// Aborted by an unhandled failure
    Failed,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => f.write_str("success"),
            AuditOutcome::Partial => f.write_str("partial"),
            AuditOutcome::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub errored: usize,
    pub duplicates_found: usize,
    pub sync_changed: usize,
}

impl RunCounts {
    pub fn absorb(&mut self, other: &RunCounts) {
        self.scanned += other.scanned;
        self.created += other.created;
        self.updated += other.updated;
        self.errored += other.errored;
        self.duplicates_found += other.duplicates_found;
        self.sync_changed += other.sync_changed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Token of the run lock held for this run
    pub run_id: String,
    pub command: String,
    /// `key=value` descriptions of the run's inputs
    pub inputs: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub outcome: AuditOutcome,
    pub notes: Vec<String>,
}

/// Accumulates one run's counts and notes until it is sealed into an entry.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    run_id: String,
    command: String,
    inputs: Vec<String>,
    started_at: DateTime<Utc>,
    counts: RunCounts,
    notes: Vec<String>,
    interrupted: bool,
}

impl AuditRecorder {
    pub fn start(run_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            command: command.into(),
            inputs: Vec::new(),
            started_at: Utc::now(),
            counts: RunCounts::default(),
            notes: Vec::new(),
            interrupted: false,
        }
    }

    pub fn input(&mut self, key: &str, value: impl fmt::Display) {
        self.inputs.push(format!("{}={}", key, value));
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn counts_mut(&mut self) -> &mut RunCounts {
        &mut self.counts
    }

    pub fn counts(&self) -> &RunCounts {
        &self.counts
    }

    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
        self.notes.push("Run interrupted between disks".to_string());
    }

    /// Seal the run. The outcome follows from interruption and errored records.
    pub fn finish(self) -> AuditEntry {
        let outcome = if self.interrupted || self.counts.errored > 0 {
            AuditOutcome::Partial
        } else {
            AuditOutcome::Success
        };
        self.finish_with(outcome)
    }

    /// Seal a run that aborted with `error`.
    pub fn fail(mut self, error: impl fmt::Display) -> AuditEntry {
        self.notes.push(format!("Aborted: {}", error));
        self.finish_with(AuditOutcome::Failed)
    }

    fn finish_with(self, outcome: AuditOutcome) -> AuditEntry {
        AuditEntry {
            run_id: self.run_id,
            command: self.command,
            inputs: self.inputs,
            started_at: self.started_at,
            finished_at: Utc::now(),
            counts: self.counts,
            outcome,
            notes: self.notes,
        }
    }
}
