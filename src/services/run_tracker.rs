//! Run tracking for engine invocations.
//!
//! Every facade run gets an id, the date range it covers, timestamped
//! progress logs, and a set of scheduling counters that fill in as the run
//! advances: search iterations and improvements per date, how many
//! surgeries ended up placed or pending, and the schedule version each
//! commit produced. Operators can follow a long optimization without
//! attaching a debugger, and a finished record doubles as an audit entry
//! for the write it performed.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{DateRange, ScheduleVersion};

/// A single log entry with timestamp and message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::NaiveDateTime,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// What the run was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Optimize,
    Emergency,
}

/// Run status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Scheduling counters accumulated while a run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunProgress {
    /// Operational dates fully processed so far.
    pub dates_processed: u32,
    /// Tabu iterations spent across all processed dates.
    pub iterations: u32,
    /// Best-solution improvements across all processed dates.
    pub improvements: u32,
    /// Surgeries holding a slot after the latest processed date.
    pub scheduled_count: usize,
    /// Surgeries still pending after the latest processed date.
    pub pending_count: usize,
    /// Version token of the most recent commit, if any write happened.
    pub committed_version: Option<ScheduleVersion>,
}

/// One tracked engine run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub kind: RunKind,
    pub status: RunStatus,
    /// The dates this run was asked to schedule.
    pub date_range: DateRange,
    pub started_at: chrono::NaiveDateTime,
    pub finished_at: Option<chrono::NaiveDateTime>,
    pub logs: Vec<LogEntry>,
    pub progress: RunProgress,
    /// Set when the run failed before producing a result.
    pub error: Option<String>,
}

/// In-memory run tracker.
#[derive(Clone)]
pub struct RunTracker {
    runs: Arc<RwLock<HashMap<String, RunRecord>>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new run over `range` and return its id.
    pub fn start(&self, kind: RunKind, range: DateRange) -> String {
        let run_id = Uuid::new_v4().to_string();
        let run = RunRecord {
            run_id: run_id.clone(),
            kind,
            status: RunStatus::Running,
            date_range: range,
            started_at: chrono::Local::now().naive_local(),
            finished_at: None,
            logs: vec![],
            progress: RunProgress::default(),
            error: None,
        };
        self.runs.write().insert(run_id.clone(), run);
        run_id
    }

    pub fn log(&self, run_id: &str, level: LogLevel, message: impl Into<String>) {
        let mut runs = self.runs.write();
        if let Some(run) = runs.get_mut(run_id) {
            run.logs.push(LogEntry {
                timestamp: chrono::Local::now().naive_local(),
                level,
                message: message.into(),
            });
        }
    }

    /// Fold one date's search outcome into the run counters.
    pub fn record_search(
        &self,
        run_id: &str,
        iterations: u32,
        improvements: u32,
        scheduled: usize,
        pending: usize,
    ) {
        let mut runs = self.runs.write();
        if let Some(run) = runs.get_mut(run_id) {
            run.progress.dates_processed += 1;
            run.progress.iterations += iterations;
            run.progress.improvements += improvements;
            run.progress.scheduled_count = scheduled;
            run.progress.pending_count = pending;
        }
    }

    /// Record the version token a successful commit produced.
    pub fn record_commit(&self, run_id: &str, version: ScheduleVersion) {
        let mut runs = self.runs.write();
        if let Some(run) = runs.get_mut(run_id) {
            run.progress.committed_version = Some(version);
        }
    }

    pub fn complete(&self, run_id: &str) {
        self.finish(run_id, RunStatus::Completed);
    }

    /// Mark a run cancelled; progress gathered so far stays on the record.
    pub fn cancel(&self, run_id: &str) {
        self.finish(run_id, RunStatus::Cancelled);
    }

    pub fn fail(&self, run_id: &str, error_message: impl Into<String>) {
        let message = error_message.into();
        let mut runs = self.runs.write();
        if let Some(run) = runs.get_mut(run_id) {
            run.status = RunStatus::Failed;
            run.finished_at = Some(chrono::Local::now().naive_local());
            run.error = Some(message.clone());
            run.logs.push(LogEntry {
                timestamp: chrono::Local::now().naive_local(),
                level: LogLevel::Error,
                message,
            });
        }
    }

    fn finish(&self, run_id: &str, status: RunStatus) {
        let mut runs = self.runs.write();
        if let Some(run) = runs.get_mut(run_id) {
            run.status = status;
            run.finished_at = Some(chrono::Local::now().naive_local());
        }
    }

    pub fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.read().get(run_id).cloned()
    }

    /// All tracked runs, most recent first.
    pub fn runs(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.runs.read().values().cloned().collect();
        runs.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        runs
    }

    pub fn get_logs(&self, run_id: &str) -> Vec<LogEntry> {
        self.runs
            .read()
            .get(run_id)
            .map(|run| run.logs.clone())
            .unwrap_or_default()
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}
