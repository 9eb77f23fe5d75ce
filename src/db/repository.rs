//! Repository abstraction the engine consumes.
//!
//! The engine never talks to a database directly: all reads and writes go
//! through [`SchedulingRepository`]. Production deployments wire a real
//! store behind it; tests and local development use the in-memory
//! [`super::LocalRepository`]. Writes are serialized through an optimistic
//! version token.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::constraints::Rule;
use crate::models::{
    Assignment, Equipment, OperatingRoom, SetupTimeMatrix, Staff, Surgery, SurgeryId, SurgeryType,
};

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Monotonic token for optimistic concurrency on schedule writes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
    serde::Deserialize,
)]
pub struct ScheduleVersion(pub u64);

impl ScheduleVersion {
    pub fn initial() -> Self {
        ScheduleVersion(0)
    }

    pub fn next(&self) -> Self {
        ScheduleVersion(self.0 + 1)
    }
}

impl fmt::Display for ScheduleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Inclusive date range of an optimization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let mut current = self.start;
        let end = self.end;
        std::iter::from_fn(move || {
            if current > end {
                None
            } else {
                let day = current;
                current = current.succ_opt()?;
                Some(day)
            }
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The set of changes one run wants to commit for one date: the full
/// replacement assignment list plus the surgeries left pending.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScheduleChangeSet {
    pub date: NaiveDate,
    pub assignments: Vec<Assignment>,
    pub pending: Vec<SurgeryId>,
}

/// Structured context attached to repository errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation being performed (e.g. "persist_assignments").
    pub operation: Option<String>,
    /// The entity type involved (e.g. "schedule", "surgery").
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub details: Option<String>,
    /// Whether retrying the operation may succeed.
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={op}"));
        }
        if let Some(ref entity) = self.entity {
            parts.push(format!("entity={entity}"));
        }
        if let Some(ref id) = self.entity_id {
            parts.push(format!("id={id}"));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={details}"));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Error type for repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Connection failures; typically transient.
    #[error("Connection error: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    /// Query execution failures.
    #[error("Query error: {message} {context}")]
    QueryError {
        message: String,
        context: ErrorContext,
    },

    /// Requested entity was not found.
    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Optimistic concurrency failure: someone else committed first.
    #[error("Version conflict: expected {expected}, store is at {actual}")]
    Conflict {
        expected: ScheduleVersion,
        actual: ScheduleVersion,
    },

    /// Data failed validation before or after a store operation.
    #[error("Data validation error: {message} {context}")]
    ValidationError {
        message: String,
        context: ErrorContext,
    },

    /// Internal/unexpected failures.
    #[error("Internal error: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn not_found(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn query(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::QueryError {
            message: message.into(),
            context,
        }
    }

    pub fn internal(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::InternalError {
            message: message.into(),
            context,
        }
    }

    /// Whether the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::InternalError { context, .. } => context.retryable,
            Self::Conflict { .. } => true,
            _ => false,
        }
    }
}

/// Everything the scheduling engine needs from persistent storage.
#[async_trait]
pub trait SchedulingRepository: Send + Sync {
    /// Surgeries awaiting placement within the range.
    async fn list_pending_surgeries(&self, range: DateRange) -> RepositoryResult<Vec<Surgery>>;

    /// Fetch specific surgeries by id (committed assignments reference
    /// surgeries that are no longer pending). Unknown ids are skipped.
    async fn load_surgeries(&self, ids: Vec<SurgeryId>) -> RepositoryResult<Vec<Surgery>>;

    /// All rooms together with their committed assignments in the range.
    async fn list_rooms_with_schedules(
        &self,
        range: DateRange,
    ) -> RepositoryResult<Vec<(OperatingRoom, Vec<Assignment>)>>;

    /// The current setup-time matrix snapshot.
    async fn load_sdst_snapshot(&self) -> RepositoryResult<SetupTimeMatrix>;

    /// The configured custom rule set.
    async fn load_rule_set(&self) -> RepositoryResult<Vec<Rule>>;

    /// Staff and equipment catalogs.
    async fn load_staff_and_equipment(&self) -> RepositoryResult<(Vec<Staff>, Vec<Equipment>)>;

    /// Surgery type catalog.
    async fn load_surgery_types(&self) -> RepositoryResult<Vec<SurgeryType>>;

    /// The current schedule version token.
    async fn current_version(&self) -> RepositoryResult<ScheduleVersion>;

    /// Atomically replace a date's assignments. Fails with
    /// [`RepositoryError::Conflict`] when `version` is stale; on success the
    /// new version is returned.
    async fn persist_assignments(
        &self,
        changes: ScheduleChangeSet,
        version: ScheduleVersion,
    ) -> RepositoryResult<ScheduleVersion>;

    /// Cheap connectivity probe.
    async fn health_check(&self) -> RepositoryResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new("persist_assignments")
            .with_entity("schedule")
            .with_entity_id(42)
            .retryable();
        let display = ctx.to_string();
        assert!(display.contains("operation=persist_assignments"));
        assert!(display.contains("entity=schedule"));
        assert!(display.contains("id=42"));
        assert!(display.contains("retryable=true"));
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = RepositoryError::Conflict {
            expected: ScheduleVersion(1),
            actual: ScheduleVersion(2),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        let err = RepositoryError::not_found("no such schedule", ErrorContext::new("get"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_date_range_days() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        );
        assert_eq!(range.days().count(), 3);
        assert!(range.is_valid());
    }

    #[test]
    fn test_date_range_inverted_invalid() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        );
        assert!(!range.is_valid());
        assert_eq!(range.days().count(), 0);
    }

    #[test]
    fn test_version_progression() {
        let v = ScheduleVersion::initial();
        assert_eq!(v.next(), ScheduleVersion(1));
        assert_eq!(v.next().to_string(), "v1");
    }
}
