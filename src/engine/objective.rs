//! Weighted objective evaluation.
//!
//! The optimizer minimizes a weighted sum of makespan, idle time, overtime,
//! total setup minutes, priority-weighted waiting, and a penalty for
//! unplaced surgeries. Weights come from configuration and may be
//! overridden per request.

use crate::config::CostWeights;
use crate::models::{minutes_between, PlanningSnapshot, Solution};

/// Base penalty per pending surgery, scaled by its urgency weight.
const UNPLACED_BASE_PENALTY: f64 = 1000.0;

/// The raw objective terms of one solution, before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostBreakdown {
    pub makespan_minutes: i64,
    pub idle_minutes: i64,
    pub overtime_minutes: i64,
    pub sdst_minutes: i64,
    pub priority_penalty: f64,
    pub unplaced_penalty: f64,
    /// The weighted total the search compares on.
    pub weighted: f64,
}

impl CostBreakdown {
    /// Strictly-better comparison on the weighted total. Uses `total_cmp`
    /// so the search stays deterministic in the presence of equal costs.
    pub fn is_better_than(&self, other: &CostBreakdown) -> bool {
        self.weighted.total_cmp(&other.weighted) == std::cmp::Ordering::Less
    }
}

/// Evaluates solutions against a snapshot with a fixed weight set.
pub struct ObjectiveEvaluator<'a> {
    snapshot: &'a PlanningSnapshot,
    weights: CostWeights,
}

impl<'a> ObjectiveEvaluator<'a> {
    pub fn new(snapshot: &'a PlanningSnapshot) -> Self {
        Self {
            snapshot,
            weights: snapshot.config.weights,
        }
    }

    pub fn with_weights(snapshot: &'a PlanningSnapshot, weights: CostWeights) -> Self {
        Self { snapshot, weights }
    }

    pub fn weights(&self) -> &CostWeights {
        &self.weights
    }

    pub fn cost(&self, solution: &Solution) -> CostBreakdown {
        let mut breakdown = CostBreakdown::default();

        breakdown.makespan_minutes = match (solution.earliest_start(), solution.latest_end()) {
            (Some(start), Some(end)) => (end - start).num_minutes(),
            _ => 0,
        };

        for room_id in solution.occupied_rooms().collect::<Vec<_>>() {
            let sequence = solution.room_sequence(room_id);
            for pair in sequence.windows(2) {
                breakdown.idle_minutes += (pair[1].setup_start - pair[0].end).num_minutes().max(0);
            }
            if let (Some(room), Some(last)) = (self.snapshot.room(room_id), sequence.last()) {
                let close = self.snapshot.date.and_time(room.close_time);
                breakdown.overtime_minutes += (last.end - close).num_minutes().max(0);
            }
        }

        for assignment in solution.assignments() {
            breakdown.sdst_minutes += assignment.setup_minutes;
            let Some(surgery) = self.snapshot.surgery(assignment.surgery_id) else {
                continue;
            };
            let reference = surgery.arrival.unwrap_or_else(|| {
                self.snapshot
                    .room(assignment.room_id)
                    .map(|r| self.snapshot.date.and_time(r.open_time))
                    .unwrap_or(assignment.setup_start)
            });
            let wait = minutes_between(reference, assignment.operation_start).max(0);
            breakdown.priority_penalty += surgery.urgency.weight() * wait as f64;
        }

        for surgery_id in solution.pending() {
            let urgency_weight = self
                .snapshot
                .surgery(*surgery_id)
                .map(|s| s.urgency.weight())
                .unwrap_or(1.0);
            breakdown.unplaced_penalty += UNPLACED_BASE_PENALTY * urgency_weight;
        }

        breakdown.weighted = self.weights.makespan * breakdown.makespan_minutes as f64
            + self.weights.idle * breakdown.idle_minutes as f64
            + self.weights.overtime * breakdown.overtime_minutes as f64
            + self.weights.sdst * breakdown.sdst_minutes as f64
            + self.weights.priority * breakdown.priority_penalty
            + self.weights.unplaced * breakdown.unplaced_penalty;
        breakdown
    }
}
