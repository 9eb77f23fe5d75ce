//! Violation reporting types.
//!
//! Constraint failures are data, not errors: the checker collects them into
//! a [`Verdict`] and callers decide what to do. Only a malformed schedule
//! (negative durations, inverted intervals) is treated as a programming
//! error upstream and surfaces as `InvariantViolation`.

use serde::{Deserialize, Serialize};

use crate::models::{EquipmentId, RoomId, StaffId, SurgeryId};

/// Fixed severity scale. `Critical` blocks scheduling; the rest are
/// advisory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// What category of constraint was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    RoomAvailability,
    RoomHours,
    EquipmentAvailability,
    SurgeonAvailability,
    StaffAvailability,
    Qualification,
    SetupTime,
    TimeWindow,
    ResourceRestriction,
    DurationBound,
    ForbiddenTransition,
    Custom,
}

/// A single constraint violation with enough context to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Id of the custom rule that produced this, if any. Built-in hard
    /// constraints leave it unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surgery_id: Option<SurgeryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_id: Option<EquipmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<StaffId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

impl Violation {
    pub fn new(kind: ViolationKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            rule_id: None,
            kind,
            severity,
            description: description.into(),
            surgery_id: None,
            room_id: None,
            equipment_id: None,
            staff_id: None,
            suggested_actions: Vec::new(),
        }
    }

    pub fn critical(kind: ViolationKind, description: impl Into<String>) -> Self {
        Self::new(kind, Severity::Critical, description)
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_surgery(mut self, id: SurgeryId) -> Self {
        self.surgery_id = Some(id);
        self
    }

    pub fn with_room(mut self, id: RoomId) -> Self {
        self.room_id = Some(id);
        self
    }

    pub fn with_equipment(mut self, id: EquipmentId) -> Self {
        self.equipment_id = Some(id);
        self
    }

    pub fn with_staff(mut self, id: StaffId) -> Self {
        self.staff_id = Some(id);
        self
    }

    pub fn suggest(mut self, action: impl Into<String>) -> Self {
        self.suggested_actions.push(action.into());
        self
    }
}

/// Outcome of checking one placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub feasible: bool,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl Verdict {
    pub fn feasible() -> Self {
        Self {
            feasible: true,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a violation: critical ones block, the rest become warnings.
    pub fn record(&mut self, violation: Violation) {
        if violation.severity == Severity::Critical {
            self.violations.push(violation);
            self.feasible = false;
        } else {
            self.warnings.push(violation);
        }
    }

    pub fn merge(&mut self, other: Verdict) {
        self.feasible = self.feasible && other.feasible;
        self.violations.extend(other.violations);
        self.warnings.extend(other.warnings);
    }

    pub fn has_critical(&self) -> bool {
        !self.violations.is_empty()
    }
}
