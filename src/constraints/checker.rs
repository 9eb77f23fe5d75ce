//! Feasibility checking for candidate placements and whole schedules.
//!
//! The checker evaluates the seven built-in hard constraints and then the
//! configurable rule set. Domain-level problems (missing resources, busy
//! surgeons, maintenance clashes) become [`Violation`] values; only a
//! structurally malformed schedule raises [`InvariantViolation`].

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::debug;

use super::rules::RuleContext;
use super::violation::{Severity, Verdict, Violation, ViolationKind};
use crate::models::{
    Assignment, PlanningSnapshot, RoomId, Solution, Surgery, SurgeryId, TimeSlot,
};

/// Internal bug or corrupted upstream data: the inputs break the schedule
/// invariants themselves rather than any scheduling constraint.
#[derive(Debug, Error)]
#[error("schedule invariant violated: {0}")]
pub struct InvariantViolation(pub String);

/// A candidate placement of one surgery into one room at one time.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    pub surgery: &'a Surgery,
    pub room_id: RoomId,
    pub setup_start: NaiveDateTime,
    pub setup_minutes: i64,
}

impl<'a> Placement<'a> {
    pub fn operation_start(&self) -> NaiveDateTime {
        self.setup_start + chrono::Duration::minutes(self.setup_minutes)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.operation_start() + chrono::Duration::minutes(self.surgery.duration_minutes)
    }

    /// Full occupation `[setup_start, end)`.
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.setup_start, self.end())
    }

    /// Operative interval `[operation_start, end)`.
    pub fn operation_slot(&self) -> TimeSlot {
        TimeSlot::new(self.operation_start(), self.end())
    }

    /// Materialize the assignment this placement describes.
    pub fn into_assignment(self) -> Assignment {
        Assignment {
            surgery_id: self.surgery.id,
            room_id: self.room_id,
            setup_start: self.setup_start,
            operation_start: self.operation_start(),
            end: self.end(),
            setup_minutes: self.setup_minutes,
        }
    }
}

/// Switches for a single check call.
#[derive(Debug, Clone, Copy)]
pub struct CheckOptions {
    /// Stop at the first critical violation instead of producing a full
    /// report.
    pub fast_fail: bool,
    /// Placements past closing time degrade from critical to warning.
    pub allow_overtime: bool,
    pub check_equipment: bool,
    pub check_staff: bool,
    pub check_qualifications: bool,
    pub check_rules: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            fast_fail: false,
            allow_overtime: false,
            check_equipment: true,
            check_staff: true,
            check_qualifications: true,
            check_rules: true,
        }
    }
}

impl CheckOptions {
    pub fn fast() -> Self {
        Self {
            fast_fail: true,
            ..Self::default()
        }
    }

    pub fn with_overtime(mut self, allow: bool) -> Self {
        self.allow_overtime = allow;
        self
    }
}

/// Evaluates placements against hard constraints and the rule set.
pub struct FeasibilityChecker<'a> {
    snapshot: &'a PlanningSnapshot,
}

impl<'a> FeasibilityChecker<'a> {
    pub fn new(snapshot: &'a PlanningSnapshot) -> Self {
        Self { snapshot }
    }

    /// Check one placement against the current solution.
    ///
    /// The placement's surgery is always excluded from conflict counting, so
    /// re-checking an already placed assignment judges it against the rest
    /// of the schedule only.
    pub fn check(
        &self,
        placement: &Placement<'_>,
        solution: &Solution,
        options: &CheckOptions,
    ) -> Result<Verdict, InvariantViolation> {
        if placement.surgery.duration_minutes <= 0 {
            return Err(InvariantViolation(format!(
                "surgery {} has non-positive duration",
                placement.surgery.id
            )));
        }
        if placement.setup_minutes < 0 {
            return Err(InvariantViolation(format!(
                "placement for surgery {} has negative setup minutes",
                placement.surgery.id
            )));
        }

        let mut verdict = Verdict::feasible();

        // The operation cannot begin before the patient has arrived; room
        // setup may.
        if let Some(arrival) = placement.surgery.arrival {
            if placement.operation_start() < arrival {
                verdict.record(
                    Violation::critical(
                        ViolationKind::TimeWindow,
                        format!("operation would start before the patient arrives at {arrival}"),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_room(placement.room_id),
                );
                if options.fast_fail {
                    return Ok(verdict);
                }
            }
        }

        self.check_room(placement, options, &mut verdict);
        if verdict.has_critical() && options.fast_fail {
            return Ok(verdict);
        }

        self.check_sequence(placement, solution, &mut verdict);
        if verdict.has_critical() && options.fast_fail {
            return Ok(verdict);
        }

        if options.check_equipment {
            self.check_equipment(placement, solution, &mut verdict);
            if verdict.has_critical() && options.fast_fail {
                return Ok(verdict);
            }
        }

        if options.check_qualifications || options.check_staff {
            self.check_surgeon(placement, solution, options, &mut verdict);
            if verdict.has_critical() && options.fast_fail {
                return Ok(verdict);
            }
        }

        if options.check_staff {
            self.check_staff_roles(placement, solution, &mut verdict);
            if verdict.has_critical() && options.fast_fail {
                return Ok(verdict);
            }
        }

        if options.check_rules {
            self.check_rules(placement, solution, options, &mut verdict);
        }

        Ok(verdict)
    }

    /// Check every assignment of a schedule, merging the verdicts.
    pub fn check_schedule(
        &self,
        solution: &Solution,
        options: &CheckOptions,
    ) -> Result<Verdict, InvariantViolation> {
        let mut verdict = Verdict::feasible();
        for assignment in solution.assignments() {
            self.verify_assignment_shape(assignment)?;
            let Some(surgery) = self.snapshot.surgery(assignment.surgery_id) else {
                verdict.record(
                    Violation::critical(
                        ViolationKind::RoomAvailability,
                        format!("assignment references unknown surgery {}", assignment.surgery_id),
                    )
                    .with_surgery(assignment.surgery_id)
                    .with_room(assignment.room_id),
                );
                continue;
            };
            if (assignment.end - assignment.operation_start).num_minutes()
                != surgery.duration_minutes
            {
                return Err(InvariantViolation(format!(
                    "assignment for surgery {} disagrees with the surgery's duration",
                    assignment.surgery_id
                )));
            }
            let placement = Placement {
                surgery,
                room_id: assignment.room_id,
                setup_start: assignment.setup_start,
                setup_minutes: assignment.setup_minutes,
            };
            verdict.merge(self.check(&placement, solution, options)?);
        }
        Ok(verdict)
    }

    fn verify_assignment_shape(&self, a: &Assignment) -> Result<(), InvariantViolation> {
        if a.setup_minutes < 0 {
            return Err(InvariantViolation(format!(
                "assignment for surgery {} has negative setup minutes",
                a.surgery_id
            )));
        }
        let expected_op = a.setup_start + chrono::Duration::minutes(a.setup_minutes);
        if a.operation_start != expected_op || a.end <= a.operation_start {
            return Err(InvariantViolation(format!(
                "assignment for surgery {} has inconsistent timestamps",
                a.surgery_id
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Built-in hard constraints
    // ------------------------------------------------------------------

    fn check_room(&self, placement: &Placement<'_>, options: &CheckOptions, verdict: &mut Verdict) {
        let slot = placement.slot();
        let Some(room) = self.snapshot.room(placement.room_id) else {
            verdict.record(
                Violation::critical(
                    ViolationKind::RoomAvailability,
                    format!("room {} is not in the catalog", placement.room_id),
                )
                .with_surgery(placement.surgery.id)
                .with_room(placement.room_id),
            );
            return;
        };

        if !room.is_active() {
            verdict.record(
                Violation::critical(
                    ViolationKind::RoomAvailability,
                    format!("room {} is not active", room.name),
                )
                .with_surgery(placement.surgery.id)
                .with_room(room.id)
                .suggest("choose an active room"),
            );
        }

        for window in &room.maintenance_windows {
            if window.overlaps(&slot) {
                verdict.record(
                    Violation::critical(
                        ViolationKind::RoomAvailability,
                        format!("room {} is under maintenance during the placement", room.name),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_room(room.id)
                    .suggest("move the surgery outside the maintenance window"),
                );
            }
        }

        let operational = room.window(self.snapshot.date);
        if slot.start < operational.start {
            verdict.record(
                Violation::critical(
                    ViolationKind::RoomHours,
                    format!("setup starts before room {} opens", room.name),
                )
                .with_surgery(placement.surgery.id)
                .with_room(room.id),
            );
        }
        if slot.end > operational.end {
            let overtime = slot.minutes_past(operational.end);
            let severity = if options.allow_overtime {
                Severity::High
            } else {
                Severity::Critical
            };
            verdict.record(
                Violation::new(
                    ViolationKind::RoomHours,
                    severity,
                    format!(
                        "placement runs {overtime} min past room {} closing time",
                        room.name
                    ),
                )
                .with_surgery(placement.surgery.id)
                .with_room(room.id)
                .suggest("start earlier or authorize overtime"),
            );
        }
    }

    /// Room-sequence coherence: no overlap with neighbors and the applied
    /// setup minutes match the matrix for the actual predecessor.
    fn check_sequence(&self, placement: &Placement<'_>, solution: &Solution, verdict: &mut Verdict) {
        let slot = placement.slot();
        let sequence = solution.room_sequence(placement.room_id);

        let mut previous: Option<&Assignment> = None;
        for other in sequence {
            if other.surgery_id == placement.surgery.id {
                continue;
            }
            if other.slot().overlaps(&slot) {
                verdict.record(
                    Violation::critical(
                        ViolationKind::SetupTime,
                        format!(
                            "placement overlaps surgery {} in the same room",
                            other.surgery_id
                        ),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_room(placement.room_id)
                    .suggest("shift the placement past the conflicting assignment"),
                );
            }
            if other.setup_start < placement.setup_start {
                previous = Some(other);
            }
        }

        if let Some(prev) = previous {
            if placement.setup_start < prev.end {
                verdict.record(
                    Violation::critical(
                        ViolationKind::SetupTime,
                        format!(
                            "setup starts before the previous surgery {} ends",
                            prev.surgery_id
                        ),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_room(placement.room_id),
                );
            }
        }

        let previous_type = previous.and_then(|p| {
            self.snapshot
                .surgery(p.surgery_id)
                .map(|s| s.surgery_type)
        });
        let expected = self
            .snapshot
            .sdst
            .setup_minutes(previous_type, placement.surgery.surgery_type);
        if placement.setup_minutes != expected {
            verdict.record(
                Violation::critical(
                    ViolationKind::SetupTime,
                    format!(
                        "applied setup of {} min does not match the required {} min",
                        placement.setup_minutes, expected
                    ),
                )
                .with_surgery(placement.surgery.id)
                .with_room(placement.room_id)
                .suggest("recompute the room sequence"),
            );
        }
    }

    fn check_equipment(
        &self,
        placement: &Placement<'_>,
        solution: &Solution,
        verdict: &mut Verdict,
    ) {
        let contention = if self
            .snapshot
            .config
            .defaults
            .equipment_contention_includes_setup
        {
            placement.slot()
        } else {
            placement.operation_slot()
        };

        for equipment_id in &placement.surgery.equipment {
            let Some(unit) = self.snapshot.equipment_unit(*equipment_id) else {
                verdict.record(
                    Violation::critical(
                        ViolationKind::EquipmentAvailability,
                        format!("equipment {equipment_id} is not in the catalog"),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_equipment(*equipment_id),
                );
                continue;
            };

            if !unit.available {
                verdict.record(
                    Violation::critical(
                        ViolationKind::EquipmentAvailability,
                        format!("equipment {} is out of service", unit.name),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_equipment(unit.id),
                );
                continue;
            }

            if let Some(bound_room) = unit.room_binding {
                if bound_room != placement.room_id {
                    verdict.record(
                        Violation::critical(
                            ViolationKind::EquipmentAvailability,
                            format!(
                                "equipment {} is fixed to room {bound_room}",
                                unit.name
                            ),
                        )
                        .with_surgery(placement.surgery.id)
                        .with_room(placement.room_id)
                        .with_equipment(unit.id)
                        .suggest(format!("schedule the surgery in room {bound_room}")),
                    );
                }
            }

            if unit.in_maintenance_during(&contention) {
                verdict.record(
                    Violation::critical(
                        ViolationKind::EquipmentAvailability,
                        format!("equipment {} is in maintenance during the placement", unit.name),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_equipment(unit.id)
                    .suggest("pick a slot outside the maintenance window"),
                );
            }

            let concurrent = self
                .overlapping_assignments(solution, placement.surgery.id, |other| {
                    other.equipment.contains(equipment_id)
                })
                .filter(|a| {
                    let other_slot = if self
                        .snapshot
                        .config
                        .defaults
                        .equipment_contention_includes_setup
                    {
                        a.slot()
                    } else {
                        a.operation_slot()
                    };
                    other_slot.overlaps(&contention)
                })
                .count() as u32;
            if concurrent + 1 > unit.concurrency_cap {
                verdict.record(
                    Violation::critical(
                        ViolationKind::EquipmentAvailability,
                        format!(
                            "equipment {} already serves {concurrent} concurrent surgeries (cap {})",
                            unit.name, unit.concurrency_cap
                        ),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_equipment(unit.id)
                    .suggest("wait for the equipment to free up"),
                );
            }
        }
    }

    fn check_surgeon(
        &self,
        placement: &Placement<'_>,
        solution: &Solution,
        options: &CheckOptions,
        verdict: &mut Verdict,
    ) {
        let Some(surgeon_id) = placement.surgery.surgeon else {
            return;
        };
        let operation = placement.operation_slot();

        let Some(surgeon) = self.snapshot.staff_member(surgeon_id) else {
            verdict.record(
                Violation::critical(
                    ViolationKind::SurgeonAvailability,
                    format!("surgeon {surgeon_id} is not in the catalog"),
                )
                .with_surgery(placement.surgery.id)
                .with_staff(surgeon_id),
            );
            return;
        };

        if options.check_staff {
            // Surgeon contention uses the operative interval only; setup does
            // not bind the surgeon.
            let busy = self
                .overlapping_assignments(solution, placement.surgery.id, |other| {
                    other.surgeon == Some(surgeon_id)
                })
                .any(|a| a.operation_slot().overlaps(&operation));
            if busy {
                verdict.record(
                    Violation::critical(
                        ViolationKind::SurgeonAvailability,
                        format!("surgeon {} is operating elsewhere at that time", surgeon.name),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_staff(surgeon_id)
                    .suggest("delay until the surgeon is free"),
                );
            }

            if !surgeon.availability.is_empty() && !surgeon.is_available_for(&operation) {
                verdict.record(
                    Violation::critical(
                        ViolationKind::SurgeonAvailability,
                        format!("surgeon {} is not on duty for the whole operation", surgeon.name),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_staff(surgeon_id),
                );
            }
        }

        if options.check_qualifications {
            let code = self.snapshot.type_code(placement.surgery.surgery_type);
            if !code.is_empty() && !surgeon.is_qualified_for(code) {
                verdict.record(
                    Violation::critical(
                        ViolationKind::Qualification,
                        format!(
                            "surgeon {} is not qualified for procedure type {code}",
                            surgeon.name
                        ),
                    )
                    .with_surgery(placement.surgery.id)
                    .with_staff(surgeon_id)
                    .suggest("assign a qualified surgeon"),
                );
            }
        }
    }

    /// Capacity counting per required role: concurrent demand must not
    /// exceed the number of staff members with the role who are on duty for
    /// the whole operative interval, and total daily demand must fit within
    /// the combined daily-hour caps.
    fn check_staff_roles(
        &self,
        placement: &Placement<'_>,
        solution: &Solution,
        verdict: &mut Verdict,
    ) {
        let operation = placement.operation_slot();
        for role in &placement.surgery.staff_roles {
            let available: Vec<_> = self
                .snapshot
                .staff_with_role(role)
                .filter(|s| s.availability.is_empty() || s.is_available_for(&operation))
                .collect();

            if available.is_empty() {
                verdict.record(
                    Violation::critical(
                        ViolationKind::StaffAvailability,
                        format!("no {role} is available for the whole operation"),
                    )
                    .with_surgery(placement.surgery.id)
                    .suggest(format!("adjust the slot to a {role} shift")),
                );
                continue;
            }

            let concurrent = self
                .overlapping_assignments(solution, placement.surgery.id, |other| {
                    other.staff_roles.contains(role)
                })
                .filter(|a| a.operation_slot().overlaps(&operation))
                .count();
            if concurrent + 1 > available.len() {
                verdict.record(
                    Violation::critical(
                        ViolationKind::StaffAvailability,
                        format!(
                            "all {} available {role} members are already committed",
                            available.len()
                        ),
                    )
                    .with_surgery(placement.surgery.id)
                    .suggest("stagger surgeries that need this role"),
                );
            }

            let demanded_minutes: i64 = solution
                .assignments()
                .filter(|a| a.surgery_id != placement.surgery.id)
                .filter_map(|a| self.snapshot.surgery(a.surgery_id))
                .filter(|s| s.staff_roles.contains(role))
                .map(|s| s.duration_minutes)
                .sum::<i64>()
                + placement.surgery.duration_minutes;
            let cap_minutes: i64 = available.iter().map(|s| s.daily_cap_minutes).sum();
            if demanded_minutes > cap_minutes {
                verdict.record(
                    Violation::critical(
                        ViolationKind::StaffAvailability,
                        format!(
                            "daily {role} demand of {demanded_minutes} min exceeds the combined cap of {cap_minutes} min"
                        ),
                    )
                    .with_surgery(placement.surgery.id),
                );
            }
        }
    }

    fn check_rules(
        &self,
        placement: &Placement<'_>,
        solution: &Solution,
        options: &CheckOptions,
        verdict: &mut Verdict,
    ) {
        let Some(room) = self.snapshot.room(placement.room_id) else {
            return;
        };
        let previous_type = solution
            .room_sequence(placement.room_id)
            .iter()
            .filter(|a| {
                a.surgery_id != placement.surgery.id && a.setup_start < placement.setup_start
            })
            .last()
            .and_then(|a| self.snapshot.surgery(a.surgery_id))
            .map(|s| s.surgery_type);
        let room_booked_minutes: i64 = solution
            .room_sequence(placement.room_id)
            .iter()
            .filter(|a| a.surgery_id != placement.surgery.id)
            .map(|a| a.slot().duration_minutes())
            .sum();

        let ctx = RuleContext {
            surgery: placement.surgery,
            room,
            slot: placement.slot(),
            operation_slot: placement.operation_slot(),
            previous_type,
            room_booked_minutes,
        };

        // Critical rules run first so fast-fail can stop early.
        let mut rules: Vec<_> = self.snapshot.rules.iter().collect();
        rules.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.id.cmp(&b.id)));
        for rule in rules {
            if let Some(violation) = rule.evaluate(&ctx) {
                debug!(rule = %rule.id, surgery = %placement.surgery.id, "rule violated");
                verdict.record(violation);
                if verdict.has_critical() && options.fast_fail {
                    return;
                }
            }
        }
    }

    /// Other placed assignments (excluding `exclude`) whose surgery
    /// satisfies `predicate`.
    fn overlapping_assignments<'s>(
        &'s self,
        solution: &'s Solution,
        exclude: SurgeryId,
        predicate: impl Fn(&Surgery) -> bool + 's,
    ) -> impl Iterator<Item = &'s Assignment> + 's {
        solution
            .assignments()
            .filter(move |a| a.surgery_id != exclude)
            .filter(move |a| {
                self.snapshot
                    .surgery(a.surgery_id)
                    .map(|s| predicate(s))
                    .unwrap_or(false)
            })
    }
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod checker_tests;
