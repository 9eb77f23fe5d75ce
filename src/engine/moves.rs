//! Neighborhood move operators for the tabu search.
//!
//! Every operator produces a complete candidate [`Solution`] or nothing:
//! infeasibility is a `None`, never an error. Affected rooms are re-walked
//! with [`recompute_room`] and re-checked before a neighbor is admitted to
//! the candidate list.

use tracing::debug;

use super::timeline::{best_insertion, recompute_room, room_total_sdst};
use crate::constraints::{CheckOptions, FeasibilityChecker, Placement};
use crate::models::{PlanningSnapshot, RoomId, Solution, SurgeryId};

/// Move operator kinds, in fingerprint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MoveKind {
    Swap,
    Insert,
    Shift,
    PendingIn,
    RemoveToPending,
}

/// Stable identity of a move, independent of the solution it was applied
/// to. Used as the tabu memory key and as the first neighbor tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoveFingerprint {
    pub kind: MoveKind,
    pub primary: SurgeryId,
    pub secondary: Option<SurgeryId>,
    pub room: RoomId,
}

impl std::fmt::Display for MoveFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.secondary {
            Some(b) => write!(f, "{:?}({},{})->r{}", self.kind, self.primary, b, self.room),
            None => write!(f, "{:?}({})->r{}", self.kind, self.primary, self.room),
        }
    }
}

/// A candidate successor solution.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub solution: Solution,
    pub fingerprint: MoveFingerprint,
    /// Total setup minutes of the destination room's sequence; the second
    /// neighbor tie-break.
    pub destination_room_cost: i64,
}

/// Generate all admissible neighbors of `current`, in deterministic order.
pub fn generate_neighbors(current: &Solution, snapshot: &PlanningSnapshot) -> Vec<Neighbor> {
    let mut neighbors = Vec::new();
    let assignments: Vec<_> = current.assignments().cloned().collect();

    // Swap: every unordered pair of placed surgeries.
    for (i, a) in assignments.iter().enumerate() {
        for b in assignments.iter().skip(i + 1) {
            if let Some(neighbor) = try_swap(current, snapshot, a.surgery_id, b.surgery_id) {
                neighbors.push(neighbor);
            }
        }
    }

    // Insert: each placed surgery into each room (including its own, which
    // may land it earlier once removed).
    for a in &assignments {
        for room in snapshot.rooms.keys() {
            if let Some(neighbor) = try_insert(current, snapshot, a.surgery_id, *room) {
                neighbors.push(neighbor);
            }
        }
    }

    // Shift: adjacent transpositions within a room.
    for room in current.occupied_rooms().collect::<Vec<_>>() {
        let sequence = current.room_sequence(room);
        for pair in sequence.windows(2) {
            if let Some(neighbor) =
                try_shift(current, snapshot, pair[0].surgery_id, pair[1].surgery_id, room)
            {
                neighbors.push(neighbor);
            }
        }
    }

    // Pending-in: most urgent first.
    let mut pending: Vec<_> = current.pending().iter().copied().collect();
    super::timeline::dispatch_order(snapshot, &mut pending);
    for surgery_id in pending {
        if let Some(neighbor) = try_pending_in(current, snapshot, surgery_id) {
            neighbors.push(neighbor);
        }
    }

    // Remove-to-pending: unplace each assignment.
    for a in &assignments {
        if let Some(neighbor) = try_remove_to_pending(current, snapshot, a.surgery_id) {
            neighbors.push(neighbor);
        }
    }

    neighbors
}

/// Re-walk the given rooms and verify every assignment they hold. `None`
/// when the resulting schedule is infeasible.
fn rebuild_and_verify(
    mut solution: Solution,
    rooms: &[RoomId],
    snapshot: &PlanningSnapshot,
) -> Option<Solution> {
    for room_id in rooms {
        let Some(room) = snapshot.room(*room_id) else {
            return None;
        };
        let sequence = solution.room_sequence(*room_id).to_vec();
        match recompute_room(&sequence, room, snapshot) {
            Ok(rebuilt) => solution.replace_room_sequence(*room_id, rebuilt),
            Err(err) => {
                debug!(room = %room_id, %err, "recompute failed, neighbor dropped");
                return None;
            }
        }
    }

    let checker = FeasibilityChecker::new(snapshot);
    let options = CheckOptions::fast();
    for room_id in rooms {
        for assignment in solution.room_sequence(*room_id).to_vec() {
            let Some(surgery) = snapshot.surgery(assignment.surgery_id) else {
                return None;
            };
            let placement = Placement {
                surgery,
                room_id: assignment.room_id,
                setup_start: assignment.setup_start,
                setup_minutes: assignment.setup_minutes,
            };
            match checker.check(&placement, &solution, &options) {
                Ok(verdict) if verdict.feasible => {}
                Ok(_) => return None,
                Err(err) => {
                    debug!(surgery = %assignment.surgery_id, %err, "check failed, neighbor dropped");
                    return None;
                }
            }
        }
    }
    Some(solution)
}

fn neighbor(solution: Solution, fingerprint: MoveFingerprint) -> Neighbor {
    let destination_room_cost = room_total_sdst(&solution, fingerprint.room);
    Neighbor {
        solution,
        fingerprint,
        destination_room_cost,
    }
}

/// Exchange the positions of two placed surgeries, across or within rooms.
pub fn try_swap(
    current: &Solution,
    snapshot: &PlanningSnapshot,
    a: SurgeryId,
    b: SurgeryId,
) -> Option<Neighbor> {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    let assignment_a = current.find(a)?.clone();
    let assignment_b = current.find(b)?.clone();

    let mut candidate = current.clone();
    let mut removed_a = candidate.remove(a)?;
    let mut removed_b = candidate.remove(b)?;
    std::mem::swap(&mut removed_a.room_id, &mut removed_b.room_id);
    std::mem::swap(&mut removed_a.setup_start, &mut removed_b.setup_start);
    candidate.insert(removed_a);
    candidate.insert(removed_b);

    let affected = if assignment_a.room_id == assignment_b.room_id {
        vec![assignment_a.room_id]
    } else {
        vec![assignment_a.room_id, assignment_b.room_id]
    };
    let solution = rebuild_and_verify(candidate, &affected, snapshot)?;
    Some(neighbor(
        solution,
        MoveFingerprint {
            kind: MoveKind::Swap,
            primary: a,
            secondary: Some(b),
            room: assignment_b.room_id,
        },
    ))
}

/// Remove one surgery and reinsert it at the position in `target` that
/// yields the earliest feasible setup start.
pub fn try_insert(
    current: &Solution,
    snapshot: &PlanningSnapshot,
    surgery_id: SurgeryId,
    target: RoomId,
) -> Option<Neighbor> {
    let source_room = current.find(surgery_id)?.room_id;
    let mut without = current.clone();
    let removed = without.remove(surgery_id)?;

    let target_len = without.room_sequence(target).len();
    let mut best: Option<(Solution, chrono::NaiveDateTime)> = None;
    for position in 0..=target_len {
        let mut candidate = without.clone();
        let mut sequence = candidate.room_sequence(target).to_vec();
        sequence.insert(position.min(sequence.len()), removed.clone());
        candidate.replace_room_sequence(target, sequence);

        let affected = if source_room == target {
            vec![target]
        } else {
            vec![source_room, target]
        };
        let Some(rebuilt) = rebuild_and_verify(candidate, &affected, snapshot) else {
            continue;
        };
        let new_start = rebuilt.find(surgery_id)?.setup_start;
        let better = match &best {
            None => true,
            Some((_, start)) => new_start < *start,
        };
        if better {
            best = Some((rebuilt, new_start));
        }
    }

    let (solution, new_start) = best?;
    // Re-inserting at the identical place is not a move.
    if solution.find(surgery_id)?.room_id == source_room
        && new_start == current.find(surgery_id)?.setup_start
    {
        return None;
    }
    Some(neighbor(
        solution,
        MoveFingerprint {
            kind: MoveKind::Insert,
            primary: surgery_id,
            secondary: None,
            room: target,
        },
    ))
}

/// Transpose two adjacent assignments within a room.
pub fn try_shift(
    current: &Solution,
    snapshot: &PlanningSnapshot,
    first: SurgeryId,
    second: SurgeryId,
    room: RoomId,
) -> Option<Neighbor> {
    let mut candidate = current.clone();
    let mut sequence = candidate.room_sequence(room).to_vec();
    let i = sequence.iter().position(|a| a.surgery_id == first)?;
    let j = sequence.iter().position(|a| a.surgery_id == second)?;
    if i.abs_diff(j) != 1 {
        return None;
    }
    sequence.swap(i, j);
    candidate.replace_room_sequence(room, sequence);

    let solution = rebuild_and_verify(candidate, &[room], snapshot)?;
    Some(neighbor(
        solution,
        MoveFingerprint {
            kind: MoveKind::Shift,
            primary: first,
            secondary: Some(second),
            room,
        },
    ))
}

/// Schedule a pending surgery at its earliest feasible slot in any room.
pub fn try_pending_in(
    current: &Solution,
    snapshot: &PlanningSnapshot,
    surgery_id: SurgeryId,
) -> Option<Neighbor> {
    let surgery = snapshot.surgery(surgery_id)?;
    let assignment = best_insertion(surgery, current, snapshot, &CheckOptions::default())?;
    let room = assignment.room_id;
    let mut solution = current.clone();
    solution.insert(assignment);
    Some(neighbor(
        solution,
        MoveFingerprint {
            kind: MoveKind::PendingIn,
            primary: surgery_id,
            secondary: None,
            room,
        },
    ))
}

/// Unplace an assignment, moving its surgery to pending.
pub fn try_remove_to_pending(
    current: &Solution,
    snapshot: &PlanningSnapshot,
    surgery_id: SurgeryId,
) -> Option<Neighbor> {
    let room = current.find(surgery_id)?.room_id;
    let mut candidate = current.clone();
    candidate.remove(surgery_id)?;
    candidate.mark_pending(surgery_id);
    let solution = rebuild_and_verify(candidate, &[room], snapshot)?;
    Some(neighbor(
        solution,
        MoveFingerprint {
            kind: MoveKind::RemoveToPending,
            primary: surgery_id,
            secondary: None,
            room,
        },
    ))
}

#[cfg(test)]
#[path = "moves_tests.rs"]
mod moves_tests;
