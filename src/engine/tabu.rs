//! Tabu search over schedule solutions.
//!
//! A classic short-term-memory tabu search: at each iteration every move
//! operator is applied to the current solution, infeasible neighbors are
//! dropped, and the best admissible neighbor (non-tabu, or aspirating by
//! beating the best cost seen) becomes the new current solution. All
//! tie-breaks are explicit so a given input always produces the same output.

use std::collections::HashMap;

use tracing::{debug, info};

use super::cancel::{CancelToken, StopReason};
use super::moves::{generate_neighbors, MoveFingerprint, Neighbor};
use super::objective::{CostBreakdown, ObjectiveEvaluator};
use crate::config::TabuSettings;
use crate::models::{PlanningSnapshot, Solution};

/// Per-run search parameters, normally taken from [`TabuSettings`] with
/// optional per-request overrides.
#[derive(Debug, Clone, Copy)]
pub struct TabuParams {
    pub memory_size: usize,
    pub max_iterations: u32,
    pub max_no_improvement: u32,
    pub tenure: u32,
}

impl From<TabuSettings> for TabuParams {
    fn from(settings: TabuSettings) -> Self {
        Self {
            memory_size: settings.size,
            max_iterations: settings.max_iterations,
            max_no_improvement: settings.max_no_improvement,
            tenure: settings.tenure,
        }
    }
}

/// Search result with counters for the response metrics.
#[derive(Debug, Clone)]
pub struct TabuOutcome {
    pub best: Solution,
    pub best_cost: CostBreakdown,
    pub iterations: u32,
    pub improvements: u32,
    pub cancelled: bool,
}

/// The search driver. Holds only borrowed, immutable context; all mutable
/// search state lives on the stack of [`TabuSearch::run`].
pub struct TabuSearch<'a> {
    snapshot: &'a PlanningSnapshot,
    evaluator: ObjectiveEvaluator<'a>,
}

impl<'a> TabuSearch<'a> {
    pub fn new(snapshot: &'a PlanningSnapshot, evaluator: ObjectiveEvaluator<'a>) -> Self {
        Self {
            snapshot,
            evaluator,
        }
    }

    /// Run the search from `initial` until a termination condition fires:
    /// iteration budget, stagnation, soft budget, or cancellation.
    pub fn run(
        &self,
        initial: Solution,
        params: &TabuParams,
        cancel: &CancelToken,
    ) -> TabuOutcome {
        let mut current = initial;
        let mut best = current.clone();
        let mut best_cost = self.evaluator.cost(&current);

        let mut tabu: HashMap<MoveFingerprint, u32> = HashMap::new();
        let mut iterations = 0u32;
        let mut improvements = 0u32;
        let mut no_improvement = 0u32;
        let mut cancelled = false;

        while iterations < params.max_iterations && no_improvement < params.max_no_improvement {
            // Cancellation checkpoint at the head of every iteration.
            match cancel.check() {
                Some(StopReason::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Some(StopReason::SoftBudget) => break,
                None => {}
            }

            let neighbors = generate_neighbors(&current, self.snapshot);
            if neighbors.is_empty() {
                break;
            }

            let chosen = self.select_neighbor(neighbors, &tabu, &best_cost);
            let Some((neighbor, cost)) = chosen else {
                debug!(iteration = iterations, "all neighbors tabu, search stalled");
                break;
            };

            // Age the memory before admitting the new prohibition.
            tabu.retain(|_, tenure| {
                *tenure -= 1;
                *tenure > 0
            });
            tabu.insert(neighbor.fingerprint, params.tenure.max(1));
            if tabu.len() > params.memory_size {
                evict_weakest(&mut tabu);
            }

            current = neighbor.solution;
            iterations += 1;

            if cost.is_better_than(&best_cost) {
                best = current.clone();
                best_cost = cost;
                improvements += 1;
                no_improvement = 0;
                debug!(
                    iteration = iterations,
                    cost = best_cost.weighted,
                    move_ = %neighbor.fingerprint,
                    "improved best solution"
                );
            } else {
                no_improvement += 1;
            }
        }

        info!(
            iterations,
            improvements,
            cancelled,
            best_cost = best_cost.weighted,
            pending = best.pending_count(),
            "tabu search finished"
        );
        TabuOutcome {
            best,
            best_cost,
            iterations,
            improvements,
            cancelled,
        }
    }

    /// Pick the best admissible neighbor. Admissible = not tabu, or tabu but
    /// strictly better than the best cost so far (aspiration). Ties fall to
    /// the lower fingerprint, then the cheaper destination room sequence,
    /// then generation order.
    fn select_neighbor(
        &self,
        neighbors: Vec<Neighbor>,
        tabu: &HashMap<MoveFingerprint, u32>,
        best_cost: &CostBreakdown,
    ) -> Option<(Neighbor, CostBreakdown)> {
        let mut selected: Option<(Neighbor, CostBreakdown)> = None;

        for neighbor in neighbors {
            let cost = self.evaluator.cost(&neighbor.solution);
            let is_tabu = tabu.contains_key(&neighbor.fingerprint);
            let aspirates = cost.is_better_than(best_cost);
            if is_tabu && !aspirates {
                debug!(move_ = %neighbor.fingerprint, "neighbor skipped: tabu");
                continue;
            }

            let replace = match &selected {
                None => true,
                Some((held, held_cost)) => {
                    match cost.weighted.total_cmp(&held_cost.weighted) {
                        std::cmp::Ordering::Less => true,
                        std::cmp::Ordering::Greater => false,
                        std::cmp::Ordering::Equal => match neighbor
                            .fingerprint
                            .cmp(&held.fingerprint)
                        {
                            std::cmp::Ordering::Less => true,
                            std::cmp::Ordering::Greater => false,
                            // Identical fingerprints cannot occur twice per
                            // generation; compare destinations, then keep
                            // the earlier-generated neighbor.
                            std::cmp::Ordering::Equal => {
                                neighbor.destination_room_cost < held.destination_room_cost
                            }
                        },
                    }
                }
            };
            if replace {
                selected = Some((neighbor, cost));
            }
        }
        selected
    }
}

/// Drop the entry closest to expiry; ties resolve to the smaller
/// fingerprint so eviction is deterministic.
fn evict_weakest(tabu: &mut HashMap<MoveFingerprint, u32>) {
    if let Some(victim) = tabu
        .iter()
        .min_by(|(fa, ta), (fb, tb)| ta.cmp(tb).then(fa.cmp(fb)))
        .map(|(fingerprint, _)| *fingerprint)
    {
        tabu.remove(&victim);
    }
}

#[cfg(test)]
#[path = "tabu_tests.rs"]
mod tabu_tests;
