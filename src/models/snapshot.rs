//! Immutable per-run planning snapshot.
//!
//! The facade materializes one snapshot per optimization run from repository
//! data: catalogs, the setup matrix, the rule set, and the effective
//! configuration. Components share it read-only; mutable state (tabu memory,
//! the current solution) stays strictly per-run.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use super::ids::{EquipmentId, RoomId, StaffId, SurgeryId, SurgeryTypeId};
use super::resources::{Equipment, OperatingRoom, Staff};
use super::sdst::SetupTimeMatrix;
use super::surgery::{Surgery, SurgeryType, Urgency};
use crate::config::SchedulerConfig;
use crate::constraints::Rule;

/// Raised when repository data is structurally broken. This is a programming
/// or data-integrity error upstream, not a scheduling outcome.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("surgery {0} has non-positive duration")]
    NonPositiveDuration(SurgeryId),
    #[error("room {0} has an empty or inverted operational window")]
    InvalidRoomWindow(RoomId),
    #[error("surgery {surgery} references unknown surgery type {surgery_type}")]
    UnknownSurgeryType {
        surgery: SurgeryId,
        surgery_type: SurgeryTypeId,
    },
}

/// Read-only context shared by the checker, the utilities, and the
/// optimizer for a single run.
#[derive(Debug, Clone)]
pub struct PlanningSnapshot {
    pub date: NaiveDate,
    pub surgeries: BTreeMap<SurgeryId, Surgery>,
    pub surgery_types: BTreeMap<SurgeryTypeId, SurgeryType>,
    pub rooms: BTreeMap<RoomId, OperatingRoom>,
    pub staff: BTreeMap<StaffId, Staff>,
    pub equipment: BTreeMap<EquipmentId, Equipment>,
    pub sdst: SetupTimeMatrix,
    pub rules: Vec<Rule>,
    pub config: SchedulerConfig,
}

impl PlanningSnapshot {
    pub fn builder(date: NaiveDate) -> SnapshotBuilder {
        SnapshotBuilder::new(date)
    }

    pub fn surgery(&self, id: SurgeryId) -> Option<&Surgery> {
        self.surgeries.get(&id)
    }

    pub fn room(&self, id: RoomId) -> Option<&OperatingRoom> {
        self.rooms.get(&id)
    }

    pub fn staff_member(&self, id: StaffId) -> Option<&Staff> {
        self.staff.get(&id)
    }

    pub fn equipment_unit(&self, id: EquipmentId) -> Option<&Equipment> {
        self.equipment.get(&id)
    }

    pub fn surgery_type(&self, id: SurgeryTypeId) -> Option<&SurgeryType> {
        self.surgery_types.get(&id)
    }

    /// The catalog code for a type, or empty when the catalog has no entry.
    pub fn type_code(&self, id: SurgeryTypeId) -> &str {
        self.surgery_types
            .get(&id)
            .map(|t| t.code.as_str())
            .unwrap_or("")
    }

    pub fn staff_with_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Staff> {
        self.staff.values().filter(move |s| s.role == role)
    }

    pub fn active_rooms(&self) -> impl Iterator<Item = &OperatingRoom> {
        self.rooms.values().filter(|r| r.is_active())
    }

    /// Total active room minutes on the snapshot date; the denominator of
    /// the overtime share in disruption scoring.
    pub fn daily_capacity_minutes(&self) -> i64 {
        self.active_rooms()
            .map(|r| r.window(self.date).duration_minutes())
            .sum()
    }

    pub fn max_wait_minutes(&self, urgency: Urgency) -> i64 {
        self.config.emergency.max_wait_minutes(urgency)
    }
}

/// Builder used by the facade and by tests to assemble validated snapshots.
pub struct SnapshotBuilder {
    date: NaiveDate,
    surgeries: Vec<Surgery>,
    surgery_types: Vec<SurgeryType>,
    rooms: Vec<OperatingRoom>,
    staff: Vec<Staff>,
    equipment: Vec<Equipment>,
    sdst: SetupTimeMatrix,
    rules: Vec<Rule>,
    config: SchedulerConfig,
}

impl SnapshotBuilder {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            surgeries: Vec::new(),
            surgery_types: Vec::new(),
            rooms: Vec::new(),
            staff: Vec::new(),
            equipment: Vec::new(),
            sdst: SetupTimeMatrix::empty(0),
            rules: Vec::new(),
            config: SchedulerConfig::default(),
        }
    }

    pub fn surgery(mut self, surgery: Surgery) -> Self {
        self.surgeries.push(surgery);
        self
    }

    pub fn surgeries(mut self, surgeries: impl IntoIterator<Item = Surgery>) -> Self {
        self.surgeries.extend(surgeries);
        self
    }

    pub fn surgery_type(mut self, surgery_type: SurgeryType) -> Self {
        self.surgery_types.push(surgery_type);
        self
    }

    pub fn room(mut self, room: OperatingRoom) -> Self {
        self.rooms.push(room);
        self
    }

    pub fn staff(mut self, staff: Staff) -> Self {
        self.staff.push(staff);
        self
    }

    pub fn equipment(mut self, equipment: Equipment) -> Self {
        self.equipment.push(equipment);
        self
    }

    pub fn sdst(mut self, sdst: SetupTimeMatrix) -> Self {
        self.sdst = sdst;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<PlanningSnapshot, SnapshotError> {
        let surgery_types: BTreeMap<_, _> =
            self.surgery_types.into_iter().map(|t| (t.id, t)).collect();

        for room in &self.rooms {
            if room.open_time >= room.close_time {
                return Err(SnapshotError::InvalidRoomWindow(room.id));
            }
        }
        for surgery in &self.surgeries {
            if surgery.duration_minutes <= 0 {
                return Err(SnapshotError::NonPositiveDuration(surgery.id));
            }
            // A missing catalog entry is tolerated only when the catalog was
            // not provided at all (tests often skip it).
            if !surgery_types.is_empty() && !surgery_types.contains_key(&surgery.surgery_type) {
                return Err(SnapshotError::UnknownSurgeryType {
                    surgery: surgery.id,
                    surgery_type: surgery.surgery_type,
                });
            }
        }

        Ok(PlanningSnapshot {
            date: self.date,
            surgeries: self.surgeries.into_iter().map(|s| (s.id, s)).collect(),
            surgery_types,
            rooms: self.rooms.into_iter().map(|r| (r.id, r)).collect(),
            staff: self.staff.into_iter().map(|s| (s.id, s)).collect(),
            equipment: self.equipment.into_iter().map(|e| (e.id, e)).collect(),
            sdst: self.sdst,
            rules: self.rules,
            config: self.config,
        })
    }
}
