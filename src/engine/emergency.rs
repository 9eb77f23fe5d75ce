//! Emergency surgery insertion.
//!
//! Strategies are tried in a fixed ladder: fit into an idle gap, widen the
//! room pool to backup rooms, bump a lower-priority surgery, extend hours,
//! and finally hand the case to manual review. The first strategy that
//! produces a feasible placement within the urgency's maximum wait wins.
//!
//! Gap insertion never moves an existing operation: a successor keeps its
//! operation start and only has its setup window re-anchored to the new
//! predecessor type.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::objective::ObjectiveEvaluator;
use super::tabu::{TabuParams, TabuSearch};
use crate::constraints::{CheckOptions, FeasibilityChecker, Placement};
use crate::models::{
    minutes_between, Assignment, OperatingRoom, PlanningSnapshot, Solution, Surgery, SurgeryId,
};

/// Which rung of the ladder produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertionStrategy {
    Gap,
    Backup,
    Bump,
    Overtime,
    Manual,
}

/// An emergency case prepared by the facade: the surgery record carries the
/// urgency, duration, arrival, and resource requirements.
#[derive(Debug, Clone)]
pub struct EmergencyCase {
    pub surgery: Surgery,
    pub allow_bumping: bool,
    pub allow_overtime: bool,
    pub allow_backup_rooms: bool,
}

/// Result of an insertion attempt. On `Manual` the solution is the
/// untouched input schedule.
#[derive(Debug, Clone)]
pub struct EmergencyOutcome {
    pub success: bool,
    pub strategy: InsertionStrategy,
    pub solution: Solution,
    pub assignment: Option<Assignment>,
    pub bumped: Vec<SurgeryId>,
    pub overtime_minutes: i64,
    pub wait_minutes: i64,
    pub disruption_score: f64,
    /// Iterations the cascading reschedule spent after a bump.
    pub cascade_iterations: u32,
    /// Human-readable explanation, always set on manual review.
    pub reason: Option<String>,
}

/// A viable gap found for the emergency, before it is applied.
struct GapPlacement {
    assignment: Assignment,
    /// The successor with its setup re-anchored to the emergency's type,
    /// when the emergency lands mid-sequence.
    adjusted_next: Option<Assignment>,
    overtime_minutes: i64,
}

pub struct EmergencyScheduler<'a> {
    snapshot: &'a PlanningSnapshot,
}

impl<'a> EmergencyScheduler<'a> {
    pub fn new(snapshot: &'a PlanningSnapshot) -> Self {
        Self { snapshot }
    }

    /// Try the strategy ladder against `base`.
    pub fn insert(
        &self,
        case: &EmergencyCase,
        base: &Solution,
        cancel: &CancelToken,
    ) -> EmergencyOutcome {
        let arrival = case
            .surgery
            .arrival
            .unwrap_or_else(|| self.day_start());
        let max_wait = case
            .surgery
            .max_wait_minutes
            .unwrap_or_else(|| self.snapshot.max_wait_minutes(case.surgery.urgency));

        // 1. Idle gap in the primary room pool.
        let primary: Vec<&OperatingRoom> = self.primary_rooms(&case.surgery);
        if let Some(gap) = self.best_gap(&primary, base, &case.surgery, arrival, max_wait, false) {
            return self.apply_gap(case, base, gap, arrival, InsertionStrategy::Gap);
        }

        // 2. Backup rooms outside the primary service.
        if case.allow_backup_rooms {
            let backup: Vec<&OperatingRoom> = self.backup_rooms(&case.surgery);
            if let Some(gap) = self.best_gap(&backup, base, &case.surgery, arrival, max_wait, false)
            {
                return self.apply_gap(case, base, gap, arrival, InsertionStrategy::Backup);
            }
        }

        // 3. Bump a strictly lower-priority surgery. A bump whose cascading
        // reschedule cannot be honored is rolled back, not half-applied.
        let mut bump_failure: Option<String> = None;
        if case.allow_bumping {
            let (placed, failure) = self.try_bump(case, base, arrival, max_wait, cancel);
            if let Some(outcome) = placed {
                return outcome;
            }
            bump_failure = failure;
        }

        // 4. Run past closing time.
        if case.allow_overtime {
            let mut pool = self.primary_rooms(&case.surgery);
            if case.allow_backup_rooms {
                pool.extend(self.backup_rooms(&case.surgery));
            }
            if let Some(gap) = self.best_gap(&pool, base, &case.surgery, arrival, max_wait, true) {
                return self.apply_gap(case, base, gap, arrival, InsertionStrategy::Overtime);
            }
        }

        // 5. Manual review; never silently dropped.
        warn!(surgery = %case.surgery.id, "emergency insertion unresolved, needs manual review");
        let mut reason = format!(
            "no feasible placement within {max_wait} min for urgency {:?}; \
             bumping={}, overtime={}, backup_rooms={}",
            case.surgery.urgency,
            case.allow_bumping,
            case.allow_overtime,
            case.allow_backup_rooms
        );
        if let Some(detail) = bump_failure {
            reason.push_str("; ");
            reason.push_str(&detail);
        }
        EmergencyOutcome {
            success: false,
            strategy: InsertionStrategy::Manual,
            solution: base.clone(),
            assignment: None,
            bumped: vec![],
            overtime_minutes: 0,
            wait_minutes: 0,
            disruption_score: 0.0,
            cascade_iterations: 0,
            reason: Some(reason),
        }
    }

    fn day_start(&self) -> NaiveDateTime {
        self.snapshot
            .date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is valid")
    }

    fn service_of(&self, surgery: &Surgery) -> Option<String> {
        self.snapshot
            .surgery_type(surgery.surgery_type)
            .and_then(|t| t.service.clone())
    }

    /// Active rooms whose service tag fits the surgery (untagged rooms are
    /// general-purpose), in id order.
    fn primary_rooms(&self, surgery: &Surgery) -> Vec<&OperatingRoom> {
        let service = self.service_of(surgery);
        self.snapshot
            .active_rooms()
            .filter(|r| match (&r.primary_service, &service) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(room_service), Some(needed)) => room_service == needed,
            })
            .collect()
    }

    /// Active rooms serving a different service line.
    fn backup_rooms(&self, surgery: &Surgery) -> Vec<&OperatingRoom> {
        let service = self.service_of(surgery);
        self.snapshot
            .active_rooms()
            .filter(|r| match (&r.primary_service, &service) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(room_service), Some(needed)) => room_service != needed,
            })
            .collect()
    }

    /// Earliest viable gap across the pool. Gaps are idle intervals before,
    /// between, and after a room's assignments; existing operations never
    /// move.
    fn best_gap(
        &self,
        pool: &[&OperatingRoom],
        solution: &Solution,
        surgery: &Surgery,
        arrival: NaiveDateTime,
        max_wait: i64,
        allow_overtime: bool,
    ) -> Option<GapPlacement> {
        let mut best: Option<GapPlacement> = None;
        for &room in pool {
            let Some(candidate) =
                self.room_gap(room, solution, surgery, arrival, allow_overtime)
            else {
                continue;
            };
            let wait = minutes_between(arrival, candidate.assignment.operation_start);
            if wait > max_wait {
                continue;
            }
            let earlier = match &best {
                None => true,
                Some(held) => {
                    (
                        candidate.assignment.operation_start,
                        candidate.assignment.room_id,
                    ) < (held.assignment.operation_start, held.assignment.room_id)
                }
            };
            if earlier {
                best = Some(candidate);
            }
        }
        best
    }

    /// Earliest gap within one room.
    fn room_gap(
        &self,
        room: &OperatingRoom,
        solution: &Solution,
        surgery: &Surgery,
        arrival: NaiveDateTime,
        allow_overtime: bool,
    ) -> Option<GapPlacement> {
        let window = room.window(self.snapshot.date);
        let sequence = solution.room_sequence(room.id);
        let checker = FeasibilityChecker::new(self.snapshot);
        let options = CheckOptions::fast().with_overtime(allow_overtime);

        // Candidate gap boundaries: (previous assignment, next assignment).
        let mut slots: Vec<(Option<&Assignment>, Option<&Assignment>)> = Vec::new();
        match sequence.len() {
            0 => slots.push((None, None)),
            _ => {
                slots.push((None, Some(&sequence[0])));
                for pair in sequence.windows(2) {
                    slots.push((Some(&pair[0]), Some(&pair[1])));
                }
                slots.push((sequence.last(), None));
            }
        }

        for (prev, next) in slots {
            let previous_type = prev
                .and_then(|a| self.snapshot.surgery(a.surgery_id))
                .map(|s| s.surgery_type);
            let setup = self
                .snapshot
                .sdst
                .setup_minutes(previous_type, surgery.surgery_type);

            let gap_start = prev.map_or(window.start, |a| a.end.max(window.start));
            // The operation cannot begin before the patient arrives; setup may.
            let mut setup_start = gap_start;
            if setup_start + Duration::minutes(setup) < arrival {
                setup_start = arrival - Duration::minutes(setup);
            }
            let end = setup_start + Duration::minutes(setup + surgery.duration_minutes);

            // The successor keeps its operation start; its setup window must
            // still fit after the emergency ends.
            if let Some(next_assignment) = next {
                let Some(next_surgery) = self.snapshot.surgery(next_assignment.surgery_id) else {
                    continue;
                };
                let next_setup = self
                    .snapshot
                    .sdst
                    .setup_minutes(Some(surgery.surgery_type), next_surgery.surgery_type);
                if end + Duration::minutes(next_setup) > next_assignment.operation_start {
                    continue;
                }
            } else if !allow_overtime && end > window.end {
                continue;
            }

            // Build the candidate schedule: adjusted successor first, then
            // the emergency itself, and let the checker judge it.
            let adjusted_next = next.map(|next_assignment| {
                let next_surgery = self
                    .snapshot
                    .surgery(next_assignment.surgery_id)
                    .expect("checked above");
                let next_setup = self
                    .snapshot
                    .sdst
                    .setup_minutes(Some(surgery.surgery_type), next_surgery.surgery_type);
                Assignment {
                    setup_start: next_assignment.operation_start
                        - Duration::minutes(next_setup),
                    setup_minutes: next_setup,
                    ..next_assignment.clone()
                }
            });

            let mut candidate = solution.clone();
            if let Some(adjusted) = &adjusted_next {
                candidate.remove(adjusted.surgery_id);
                candidate.insert(adjusted.clone());
            }
            let placement = Placement {
                surgery,
                room_id: room.id,
                setup_start,
                setup_minutes: setup,
            };
            match checker.check(&placement, &candidate, &options) {
                Ok(verdict) if verdict.feasible => {
                    let overtime = placement.slot().minutes_past(window.end);
                    return Some(GapPlacement {
                        assignment: placement.into_assignment(),
                        adjusted_next,
                        overtime_minutes: overtime,
                    });
                }
                Ok(_) => continue,
                Err(err) => {
                    debug!(surgery = %surgery.id, room = %room.id, %err, "gap check failed");
                    continue;
                }
            }
        }
        None
    }

    fn apply_gap(
        &self,
        case: &EmergencyCase,
        base: &Solution,
        gap: GapPlacement,
        arrival: NaiveDateTime,
        strategy: InsertionStrategy,
    ) -> EmergencyOutcome {
        let mut solution = base.clone();
        if let Some(adjusted) = &gap.adjusted_next {
            solution.remove(adjusted.surgery_id);
            solution.insert(adjusted.clone());
        }
        let assignment = gap.assignment.clone();
        solution.insert(assignment.clone());

        let wait = minutes_between(arrival, assignment.operation_start);
        let disruption =
            self.disruption_score(base, 0, gap.overtime_minutes, wait, &case.surgery);
        info!(
            surgery = %case.surgery.id,
            room = %assignment.room_id,
            start = %assignment.operation_start,
            ?strategy,
            "emergency placed"
        );
        EmergencyOutcome {
            success: true,
            strategy,
            solution,
            assignment: Some(assignment),
            bumped: vec![],
            overtime_minutes: gap.overtime_minutes,
            wait_minutes: wait,
            disruption_score: disruption,
            cascade_iterations: 0,
            reason: None,
        }
    }

    /// Bump the least urgent strictly-lower-priority surgery whose removal
    /// opens a viable slot, then reschedule the displaced surgery with a
    /// narrow search budget.
    ///
    /// The bump is only committed when the cascade keeps the emergency at
    /// the slot the gap search promised; otherwise the candidate is
    /// discarded (the caller's schedule is untouched) and the failure
    /// detail is returned for the manual-review reason.
    fn try_bump(
        &self,
        case: &EmergencyCase,
        base: &Solution,
        arrival: NaiveDateTime,
        max_wait: i64,
        cancel: &CancelToken,
    ) -> (Option<EmergencyOutcome>, Option<String>) {
        let mut pool = self.primary_rooms(&case.surgery);
        if case.allow_backup_rooms {
            pool.extend(self.backup_rooms(&case.surgery));
        }

        let mut candidates: Vec<&Assignment> = base
            .assignments()
            .filter(|a| {
                self.snapshot
                    .surgery(a.surgery_id)
                    .map(|s| s.urgency < case.surgery.urgency)
                    .unwrap_or(false)
            })
            .collect();
        // Least urgent first; among equals the later start is cheaper to
        // move, then ids keep it deterministic.
        candidates.sort_by(|a, b| {
            let ua = self.snapshot.surgery(a.surgery_id).map(|s| (s.urgency, s.priority));
            let ub = self.snapshot.surgery(b.surgery_id).map(|s| (s.urgency, s.priority));
            ua.cmp(&ub)
                .then(b.setup_start.cmp(&a.setup_start))
                .then(a.surgery_id.cmp(&b.surgery_id))
        });

        let mut failure: Option<String> = None;
        for victim in candidates {
            if cancel.is_cancelled() {
                return (None, failure);
            }
            let mut without = base.clone();
            let Some(removed) = without.remove(victim.surgery_id) else {
                continue;
            };
            // Close the hole the victim leaves: re-walk its room so the gap
            // search sees accurate timings.
            let Some(room) = self.snapshot.room(removed.room_id) else {
                continue;
            };
            let sequence = without.room_sequence(removed.room_id).to_vec();
            match super::timeline::recompute_room(&sequence, room, self.snapshot) {
                Ok(rebuilt) => without.replace_room_sequence(removed.room_id, rebuilt),
                Err(err) => {
                    warn!(%err, "bump candidate dropped: recompute failed");
                    continue;
                }
            }
            without.mark_pending(removed.surgery_id);

            let Some(gap) =
                self.best_gap(&pool, &without, &case.surgery, arrival, max_wait, false)
            else {
                continue;
            };

            let mut outcome =
                self.apply_gap(case, &without, gap, arrival, InsertionStrategy::Bump);
            outcome.bumped = vec![removed.surgery_id];

            // Cascading reschedule of the bumped surgery under a narrow
            // budget. The displaced surgery may land in a later slot or stay
            // pending, but the emergency must keep the slot just promised;
            // a cascade that abandons it voids this bump entirely.
            let narrow = TabuParams {
                memory_size: self.snapshot.config.tabu.size,
                max_iterations: (self.snapshot.config.tabu.max_iterations / 4).max(5),
                max_no_improvement: 5,
                tenure: self.snapshot.config.tabu.tenure,
            };
            let search = TabuSearch::new(self.snapshot, ObjectiveEvaluator::new(self.snapshot));
            let rescheduled = search.run(outcome.solution.clone(), &narrow, cancel);
            if rescheduled.best.find(case.surgery.id) != outcome.assignment.as_ref() {
                warn!(
                    surgery = %case.surgery.id,
                    bumped = %removed.surgery_id,
                    "bump rolled back: cascading reschedule abandoned the promised slot"
                );
                failure = Some(format!(
                    "bumping surgery {} found a slot, but the cascading reschedule \
                     could not keep the emergency there; the bump was rolled back",
                    removed.surgery_id
                ));
                continue;
            }
            outcome.solution = rescheduled.best;
            outcome.cascade_iterations = rescheduled.iterations;

            let wait = outcome.wait_minutes;
            outcome.disruption_score = self.disruption_score(
                base,
                outcome.bumped.len(),
                outcome.overtime_minutes,
                wait,
                &case.surgery,
            );
            return (Some(outcome), None);
        }
        (None, failure)
    }

    /// Normalized 0..1 disruption summary.
    fn disruption_score(
        &self,
        base: &Solution,
        bumped_count: usize,
        overtime_minutes: i64,
        wait_minutes: i64,
        surgery: &Surgery,
    ) -> f64 {
        let weights = &self.snapshot.config.emergency;
        let total_scheduled = base.assignment_count().max(1) as f64;
        let capacity = self.snapshot.daily_capacity_minutes().max(1) as f64;
        let max_wait = surgery
            .max_wait_minutes
            .unwrap_or_else(|| self.snapshot.max_wait_minutes(surgery.urgency))
            .max(1) as f64;

        let score = weights.disruption_weight_bumped * (bumped_count as f64 / total_scheduled)
            + weights.disruption_weight_overtime * (overtime_minutes as f64 / capacity)
            + weights.disruption_weight_wait * (wait_minutes as f64 / max_wait);
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
#[path = "emergency_tests.rs"]
mod emergency_tests;
