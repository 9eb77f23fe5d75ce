//! Schedule construction and timing utilities.
//!
//! These are the placement primitives everything else builds on: finding the
//! next slot a surgery fits into, re-walking a room after a sequence change,
//! and constructing the initial solution the tabu search starts from. All
//! functions are pure with respect to their inputs.

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::constraints::{CheckOptions, FeasibilityChecker, InvariantViolation, Placement};
use crate::models::{
    Assignment, OperatingRoom, PlanningSnapshot, RoomId, Solution, Surgery, SurgeryId,
};

/// Cap on interval jumps inside [`next_available`]; a day has far fewer
/// distinct release points than this.
const MAX_SLOT_JUMPS: usize = 512;

/// Recompute the timings of a room's sequence after a structural change.
///
/// The sequence keeps its order; applied setup minutes are refreshed from
/// the matrix, each setup start is pushed to `max(previous end, room open)`,
/// and operation/end times follow. Running this twice is a fixed point.
pub fn recompute_room(
    sequence: &[Assignment],
    room: &OperatingRoom,
    snapshot: &PlanningSnapshot,
) -> Result<Vec<Assignment>, InvariantViolation> {
    let open = snapshot.date.and_time(room.open_time);
    let mut result = Vec::with_capacity(sequence.len());
    let mut previous_end: Option<NaiveDateTime> = None;
    let mut previous_type = None;

    for assignment in sequence {
        let surgery = snapshot.surgery(assignment.surgery_id).ok_or_else(|| {
            InvariantViolation(format!(
                "room sequence references unknown surgery {}",
                assignment.surgery_id
            ))
        })?;
        let setup_minutes = snapshot
            .sdst
            .setup_minutes(previous_type, surgery.surgery_type);
        let setup_start = previous_end.map_or(open, |end| end.max(open));
        let operation_start = setup_start + Duration::minutes(setup_minutes);
        let end = operation_start + Duration::minutes(surgery.duration_minutes);

        result.push(Assignment {
            surgery_id: surgery.id,
            room_id: room.id,
            setup_start,
            operation_start,
            end,
            setup_minutes,
        });
        previous_end = Some(end);
        previous_type = Some(surgery.surgery_type);
    }
    Ok(result)
}

/// Earliest feasible setup start for appending `surgery` to `room`.
///
/// The candidate starts at `max(last end, room open)` and jumps forward
/// across resource release points (assignment ends, maintenance window ends,
/// staff shift starts) until the feasibility checker accepts it. Returns
/// `None` when no within-day placement exists.
pub fn next_available(
    room: &OperatingRoom,
    surgery: &Surgery,
    solution: &Solution,
    snapshot: &PlanningSnapshot,
    options: &CheckOptions,
) -> Option<NaiveDateTime> {
    let window = room.window(snapshot.date);
    let sequence = solution.room_sequence(room.id);
    let last = sequence.last();

    let mut candidate = last.map_or(window.start, |a| a.end.max(window.start));
    let previous_type = last
        .and_then(|a| snapshot.surgery(a.surgery_id))
        .map(|s| s.surgery_type);
    let setup_minutes = snapshot
        .sdst
        .setup_minutes(previous_type, surgery.surgery_type);
    let total_minutes = setup_minutes + surgery.duration_minutes;

    // Latest viable setup start within policy.
    let latest = if options.allow_overtime {
        let day_end = snapshot.date.and_hms_opt(23, 59, 0).expect("valid time");
        day_end - Duration::minutes(total_minutes)
    } else {
        window.end - Duration::minutes(total_minutes)
    };

    let checker = FeasibilityChecker::new(snapshot);
    let fast = CheckOptions {
        fast_fail: true,
        ..*options
    };

    for _ in 0..MAX_SLOT_JUMPS {
        if candidate > latest {
            return None;
        }
        let placement = Placement {
            surgery,
            room_id: room.id,
            setup_start: candidate,
            setup_minutes,
        };
        match checker.check(&placement, solution, &fast) {
            Ok(verdict) if verdict.feasible => return Some(candidate),
            Ok(_) => {}
            Err(err) => {
                debug!(surgery = %surgery.id, room = %room.id, %err, "placement check failed");
                return None;
            }
        }
        candidate = next_release_point(candidate, surgery, room, solution, snapshot)?;
    }
    None
}

/// The earliest instant after `candidate` at which some blocking resource
/// may have been released. Jumping between these points skips the dead time
/// a minute-by-minute scan would crawl through.
fn next_release_point(
    candidate: NaiveDateTime,
    surgery: &Surgery,
    room: &OperatingRoom,
    solution: &Solution,
    snapshot: &PlanningSnapshot,
) -> Option<NaiveDateTime> {
    let mut next: Option<NaiveDateTime> = None;
    let mut consider = |instant: NaiveDateTime| {
        if instant > candidate && next.map_or(true, |n| instant < n) {
            next = Some(instant);
        }
    };

    for assignment in solution.assignments() {
        let Some(other) = snapshot.surgery(assignment.surgery_id) else {
            continue;
        };
        let shares_surgeon =
            surgery.surgeon.is_some() && other.surgeon == surgery.surgeon;
        let shares_equipment = !surgery.equipment.is_disjoint(&other.equipment);
        let shares_role = surgery
            .staff_roles
            .iter()
            .any(|r| other.staff_roles.contains(r));
        if assignment.room_id == room.id || shares_surgeon || shares_equipment || shares_role {
            consider(assignment.end);
        }
    }

    // Starting setup at the arrival instant always satisfies the
    // operation-after-arrival gate.
    if let Some(arrival) = surgery.arrival {
        consider(arrival);
    }

    for window in &room.maintenance_windows {
        consider(window.end);
    }
    for equipment_id in &surgery.equipment {
        if let Some(unit) = snapshot.equipment_unit(*equipment_id) {
            for window in &unit.maintenance_windows {
                consider(window.end);
            }
        }
    }
    // Staff and surgeon shifts can begin later in the day.
    if let Some(surgeon) = surgery.surgeon.and_then(|id| snapshot.staff_member(id)) {
        for window in &surgeon.availability {
            consider(window.start);
        }
    }
    for role in &surgery.staff_roles {
        for member in snapshot.staff_with_role(role) {
            for window in &member.availability {
                consider(window.start);
            }
        }
    }

    next
}

/// The sum of applied setup minutes in a room's sequence.
pub fn room_total_sdst(solution: &Solution, room: RoomId) -> i64 {
    solution
        .room_sequence(room)
        .iter()
        .map(|a| a.setup_minutes)
        .sum()
}

/// Pick the best room for `surgery` and materialize the assignment.
///
/// Rooms are compared by earliest feasible setup start, then by the lowest
/// resulting total setup minutes for the room, then by the lowest room id.
pub fn best_insertion(
    surgery: &Surgery,
    solution: &Solution,
    snapshot: &PlanningSnapshot,
    options: &CheckOptions,
) -> Option<Assignment> {
    let mut best: Option<(NaiveDateTime, i64, RoomId, Assignment)> = None;

    for room in snapshot.rooms.values() {
        let Some(setup_start) = next_available(room, surgery, solution, snapshot, options) else {
            continue;
        };
        let previous_type = solution
            .room_sequence(room.id)
            .last()
            .and_then(|a| snapshot.surgery(a.surgery_id))
            .map(|s| s.surgery_type);
        let setup_minutes = snapshot
            .sdst
            .setup_minutes(previous_type, surgery.surgery_type);
        let resulting_sdst = room_total_sdst(solution, room.id) + setup_minutes;
        let assignment = Placement {
            surgery,
            room_id: room.id,
            setup_start,
            setup_minutes,
        }
        .into_assignment();

        let key = (setup_start, resulting_sdst, room.id);
        let replace = match &best {
            None => true,
            Some((start, sdst, id, _)) => key < (*start, *sdst, *id),
        };
        if replace {
            best = Some((setup_start, resulting_sdst, room.id, assignment));
        }
    }

    best.map(|(_, _, _, assignment)| assignment)
}

/// Deterministic ordering key for dispatching pending surgeries: urgency
/// first, then numeric priority, then arrival (absent last), then id.
pub fn dispatch_order(snapshot: &PlanningSnapshot, pending: &mut Vec<SurgeryId>) {
    pending.sort_by(|a, b| {
        let sa = snapshot.surgery(*a);
        let sb = snapshot.surgery(*b);
        match (sa, sb) {
            (Some(sa), Some(sb)) => sb
                .urgency
                .cmp(&sa.urgency)
                .then(sb.priority.cmp(&sa.priority))
                .then_with(|| {
                    match (sa.arrival, sb.arrival) {
                        (Some(x), Some(y)) => x.cmp(&y),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    }
                })
                .then(sa.id.cmp(&sb.id)),
            _ => a.cmp(b),
        }
    });
}

/// Build the starting solution: keep `existing` placements and dispatch
/// every pending surgery to its best room. Surgeries with no feasible
/// placement stay pending.
pub fn initial_solution(snapshot: &PlanningSnapshot, existing: Solution) -> Solution {
    let mut solution = existing;
    let mut pending: Vec<SurgeryId> = snapshot
        .surgeries
        .values()
        .filter(|s| s.status == crate::models::SurgeryStatus::Pending)
        .filter(|s| solution.find(s.id).is_none())
        .map(|s| s.id)
        .collect();
    dispatch_order(snapshot, &mut pending);

    let options = CheckOptions::default();
    for surgery_id in pending {
        let Some(surgery) = snapshot.surgery(surgery_id) else {
            continue;
        };
        match best_insertion(surgery, &solution, snapshot, &options) {
            Some(assignment) => {
                debug!(
                    surgery = %surgery_id,
                    room = %assignment.room_id,
                    start = %assignment.setup_start,
                    "initial placement"
                );
                solution.insert(assignment);
            }
            None => {
                debug!(surgery = %surgery_id, "no feasible initial placement, left pending");
                solution.mark_pending(surgery_id);
            }
        }
    }
    solution
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod timeline_tests;
