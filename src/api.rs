//! Request/response contracts of the engine facade.
//!
//! These are the serde types an embedding transport (HTTP, queue, CLI)
//! exchanges with the engine. Field names follow the published camelCase
//! wire contract; timestamps are ISO-8601 local (no timezone suffix).

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::CostWeights;
use crate::constraints::Violation;
use crate::engine::InsertionStrategy;
use crate::models::{
    Assignment, EquipmentId, RoomId, StaffId, SurgeryId, SurgeryTypeId, Urgency,
};

/// Ask the facade to optimize a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    pub date_range_start: NaiveDate,
    pub date_range_end: NaiveDate,
    /// Override `tabu.max_iterations` for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Override the tabu tenure for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabu_tenure: Option<u32>,
    /// Override the objective weights for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<CostWeights>,
    /// Reserved for randomized variants; the default search is
    /// deterministic and ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl OptimizeRequest {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date_range_start: date,
            date_range_end: date,
            max_iterations: None,
            tabu_tenure: None,
            weights: None,
            seed: None,
        }
    }
}

/// One placed surgery on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDto {
    pub surgery_id: SurgeryId,
    pub room_id: RoomId,
    pub setup_start: NaiveDateTime,
    pub operation_start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub applied_setup_minutes: i64,
}

impl From<&Assignment> for AssignmentDto {
    fn from(a: &Assignment) -> Self {
        Self {
            surgery_id: a.surgery_id,
            room_id: a.room_id,
            setup_start: a.setup_start,
            operation_start: a.operation_start,
            end: a.end,
            applied_setup_minutes: a.setup_minutes,
        }
    }
}

impl From<AssignmentDto> for Assignment {
    fn from(dto: AssignmentDto) -> Self {
        Assignment {
            surgery_id: dto.surgery_id,
            room_id: dto.room_id,
            setup_start: dto.setup_start,
            operation_start: dto.operation_start,
            end: dto.end,
            setup_minutes: dto.applied_setup_minutes,
        }
    }
}

/// Aggregate numbers of one optimization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationMetrics {
    pub makespan: i64,
    pub total_sdst: i64,
    pub total_idle: i64,
    pub total_overtime: i64,
    pub unplaced_count: usize,
    pub iterations: u32,
    pub improvement_count: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    pub assignments: Vec<AssignmentDto>,
    pub metrics: OptimizationMetrics,
    pub message: String,
    pub cancelled: bool,
}

/// An urgent case to be inserted into the running schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    /// Surgery identity assigned by intake.
    pub surgery_id: SurgeryId,
    pub surgery_type: SurgeryTypeId,
    pub priority: Urgency,
    pub duration_minutes: i64,
    pub arrival: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_surgeon: Option<StaffId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_equipment: Vec<EquipmentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_staff_roles: Vec<String>,
    #[serde(default)]
    pub allow_bumping: bool,
    #[serde(default)]
    pub allow_overtime: bool,
    #[serde(default)]
    pub allow_backup_rooms: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyInsertionResult {
    pub success: bool,
    pub surgery_id: SurgeryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<NaiveDateTime>,
    #[serde(default)]
    pub bumped_surgery_ids: Vec<SurgeryId>,
    pub overtime_minutes: i64,
    pub wait_minutes: i64,
    pub disruption_score: f64,
    pub strategy_used: InsertionStrategy,
    /// Explanation, always present when the case needs manual review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Which checker families to run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeasibilityChecks {
    #[serde(default = "default_check")]
    pub equipment: bool,
    #[serde(default = "default_check")]
    pub staff: bool,
    #[serde(default = "default_check")]
    pub specialization: bool,
    #[serde(default = "default_check")]
    pub custom: bool,
}

fn default_check() -> bool {
    true
}

impl Default for FeasibilityChecks {
    fn default() -> Self {
        Self {
            equipment: true,
            staff: true,
            specialization: true,
            custom: true,
        }
    }
}

/// Probe a single placement without committing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeasibilityRequest {
    pub surgery_id: SurgeryId,
    pub room_id: RoomId,
    pub start_time: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub checks: FeasibilityChecks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeasibilityResponse {
    pub is_feasible: bool,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
    pub check_duration_ms: u64,
    pub recommendations: Vec<String>,
}

/// Per-room load summary inside a schedule report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUtilization {
    pub room_id: RoomId,
    pub assignment_count: usize,
    pub busy_minutes: i64,
    pub setup_minutes: i64,
    pub idle_minutes: i64,
    pub overtime_minutes: i64,
}

/// Whole-day validation and utilization report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReport {
    pub date: NaiveDate,
    pub feasible: bool,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
    pub rooms: Vec<RoomUtilization>,
    pub assignment_count: usize,
    pub pending_count: usize,
}
