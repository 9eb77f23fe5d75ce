//! The scheduling optimization engine: placement utilities, the tabu
//! search, the objective evaluator, and the emergency insertion path.

pub mod cancel;
pub mod emergency;
pub mod moves;
pub mod objective;
pub mod tabu;
pub mod timeline;

pub use cancel::{CancelToken, StopReason};
pub use emergency::{EmergencyCase, EmergencyOutcome, EmergencyScheduler, InsertionStrategy};
pub use moves::{MoveFingerprint, MoveKind, Neighbor};
pub use objective::{CostBreakdown, ObjectiveEvaluator};
pub use tabu::{TabuOutcome, TabuParams, TabuSearch};
pub use timeline::{
    best_insertion, initial_solution, next_available, recompute_room, room_total_sdst,
};
