//! Engine facade.
//!
//! [`SchedulingService`] is the single entry point embedders call: it loads
//! repository data into an immutable per-run snapshot, runs the optimizer
//! or the emergency handler on a blocking worker so the async reactor never
//! stalls, and persists the outcome atomically under an optimistic version
//! token. Admission is bounded; requests beyond the queue capacity are
//! rejected as busy rather than piling up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use super::run_tracker::{LogLevel, RunKind, RunTracker};
use crate::api::{
    AssignmentDto, EmergencyInsertionResult, EmergencyRequest, FeasibilityChecks,
    FeasibilityRequest, FeasibilityResponse, OptimizationMetrics, OptimizeRequest,
    OptimizeResponse, RoomUtilization, ScheduleReport,
};
use crate::config::SchedulerConfig;
use crate::constraints::{CheckOptions, FeasibilityChecker, Placement};
use crate::db::{
    DateRange, RepositoryError, ScheduleChangeSet, SchedulingRepository,
};
use crate::engine::{
    initial_solution, CancelToken, EmergencyCase, EmergencyScheduler, ObjectiveEvaluator,
    TabuParams, TabuSearch,
};
use crate::models::{
    PlanningSnapshot, Solution, Surgery, SurgeryId, SurgeryStatus,
};

/// Failures the facade can surface. Constraint violations and cancellation
/// are response data, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request malformed: empty date range, non-positive durations.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The bounded admission queue is full.
    #[error("engine busy: admission queue is full")]
    Busy,

    /// Upstream storage failure; retrying may help.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Internal bug: malformed schedule data reached the engine.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl From<crate::constraints::InvariantViolation> for EngineError {
    fn from(err: crate::constraints::InvariantViolation) -> Self {
        EngineError::Invariant(err.0)
    }
}

impl From<crate::models::SnapshotError> for EngineError {
    fn from(err: crate::models::SnapshotError) -> Self {
        EngineError::Invariant(err.to_string())
    }
}

/// The facade. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct SchedulingService {
    repo: Arc<dyn SchedulingRepository>,
    config: SchedulerConfig,
    tracker: RunTracker,
    admission: Arc<Semaphore>,
}

impl SchedulingService {
    pub fn new(repo: Arc<dyn SchedulingRepository>, config: SchedulerConfig) -> Self {
        let admission = Arc::new(Semaphore::new(config.concurrency.queue_capacity.max(1)));
        Self {
            repo,
            config,
            tracker: RunTracker::new(),
            admission,
        }
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    /// Optimize the requested date range with the configured time budgets.
    pub async fn optimize(&self, request: OptimizeRequest) -> Result<OptimizeResponse, EngineError> {
        let token = CancelToken::with_budget(
            Some(Duration::from_secs(self.config.timeouts.soft_secs)),
            Some(Duration::from_secs(self.config.timeouts.hard_secs)),
        );
        self.optimize_with_cancel(request, token).await
    }

    /// Optimize with a caller-provided cancellation token.
    #[instrument(skip(self, token), fields(start = %request.date_range_start, end = %request.date_range_end))]
    pub async fn optimize_with_cancel(
        &self,
        request: OptimizeRequest,
        token: CancelToken,
    ) -> Result<OptimizeResponse, EngineError> {
        if request.date_range_start > request.date_range_end {
            return Err(EngineError::InvalidInput(
                "date range start is after its end".to_string(),
            ));
        }
        let range = DateRange::new(request.date_range_start, request.date_range_end);
        if range.days().count() > 62 {
            return Err(EngineError::InvalidInput(
                "date range exceeds 62 days".to_string(),
            ));
        }

        let _permit = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| EngineError::Busy)?;

        let run_id = self.tracker.start(RunKind::Optimize, range);
        self.tracker.log(
            &run_id,
            LogLevel::Info,
            format!("optimizing {} to {}", range.start, range.end),
        );
        let started = Instant::now();

        let mut assignments: Vec<AssignmentDto> = Vec::new();
        let mut metrics = OptimizationMetrics::default();
        let mut cancelled = false;

        for date in range.days() {
            let (snapshot, existing) = match self.load_snapshot(date, &request).await {
                Ok(loaded) => loaded,
                Err(err) => {
                    self.tracker.fail(&run_id, err.to_string());
                    return Err(err);
                }
            };
            let has_pending = snapshot
                .surgeries
                .values()
                .any(|s| s.status == SurgeryStatus::Pending);
            if !has_pending {
                // Nothing to place: the committed schedule is returned
                // unchanged and no iterations are spent.
                assignments.extend(existing.assignments().map(AssignmentDto::from));
                continue;
            }

            let params = self.tabu_params(&request);
            let weights = request.weights.unwrap_or(snapshot.config.weights);
            let worker_token = token.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let initial = initial_solution(&snapshot, existing);
                let evaluator = ObjectiveEvaluator::with_weights(&snapshot, weights);
                let search = TabuSearch::new(&snapshot, evaluator);
                search.run(initial, &params, &worker_token)
            })
            .await
            .map_err(|e| EngineError::Invariant(format!("optimizer worker panicked: {e}")))?;

            let cost = &outcome.best_cost;
            metrics.makespan += cost.makespan_minutes;
            metrics.total_sdst += cost.sdst_minutes;
            metrics.total_idle += cost.idle_minutes;
            metrics.total_overtime += cost.overtime_minutes;
            metrics.unplaced_count += outcome.best.pending_count();
            metrics.iterations += outcome.iterations;
            metrics.improvement_count += outcome.improvements;

            assignments.extend(outcome.best.assignments().map(AssignmentDto::from));
            self.tracker.record_search(
                &run_id,
                outcome.iterations,
                outcome.improvements,
                outcome.best.assignment_count(),
                outcome.best.pending_count(),
            );

            if outcome.cancelled {
                // Best-so-far is returned but never persisted.
                cancelled = true;
                self.tracker.log(
                    &run_id,
                    LogLevel::Warning,
                    format!("run cancelled while optimizing {date}; partial result not persisted"),
                );
                break;
            }

            match self.persist_solution(date, &outcome.best).await {
                Ok(version) => self.tracker.record_commit(&run_id, version),
                Err(err) => {
                    self.tracker.fail(&run_id, err.to_string());
                    return Err(err);
                }
            }
            self.tracker.log(
                &run_id,
                LogLevel::Success,
                format!(
                    "{date}: {} placed, {} pending after {} iterations",
                    outcome.best.assignment_count(),
                    outcome.best.pending_count(),
                    outcome.iterations
                ),
            );
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;

        let message = if cancelled {
            "optimization cancelled; returning best solution found so far".to_string()
        } else if assignments.is_empty() && metrics.unplaced_count > 0 {
            "no feasible placement exists for any pending surgery".to_string()
        } else if assignments.is_empty() {
            "nothing to schedule in the requested range".to_string()
        } else {
            format!(
                "scheduled {} surgeries, {} left pending",
                assignments.len(),
                metrics.unplaced_count
            )
        };

        if cancelled {
            self.tracker.cancel(&run_id);
        } else {
            self.tracker.complete(&run_id);
        }
        info!(
            iterations = metrics.iterations,
            placed = assignments.len(),
            pending = metrics.unplaced_count,
            cancelled,
            "optimization finished"
        );

        Ok(OptimizeResponse {
            assignments,
            metrics,
            message,
            cancelled,
        })
    }

    /// Insert an emergency case into the day of its arrival.
    #[instrument(skip(self), fields(surgery = %request.surgery_id, priority = ?request.priority))]
    pub async fn insert_emergency(
        &self,
        request: EmergencyRequest,
    ) -> Result<EmergencyInsertionResult, EngineError> {
        if request.duration_minutes <= 0 {
            return Err(EngineError::InvalidInput(
                "emergency duration must be positive".to_string(),
            ));
        }

        let _permit = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| EngineError::Busy)?;

        let date = request.arrival.date();
        let run_id = self.tracker.start(RunKind::Emergency, DateRange::single(date));
        let optimize_request = OptimizeRequest::for_date(date);
        let (mut snapshot, existing) = match self.load_snapshot(date, &optimize_request).await {
            Ok(loaded) => loaded,
            Err(err) => {
                self.tracker.fail(&run_id, err.to_string());
                return Err(err);
            }
        };

        let surgery = Surgery {
            id: request.surgery_id,
            surgery_type: request.surgery_type,
            duration_minutes: request.duration_minutes,
            urgency: request.priority,
            priority: 0,
            surgeon: request.required_surgeon,
            equipment: request.required_equipment.iter().copied().collect(),
            staff_roles: request.required_staff_roles.iter().cloned().collect(),
            status: SurgeryStatus::Pending,
            arrival: Some(request.arrival),
            max_wait_minutes: None,
        };
        snapshot.surgeries.insert(surgery.id, surgery.clone());

        let case = EmergencyCase {
            surgery,
            allow_bumping: request.allow_bumping,
            allow_overtime: request.allow_overtime,
            allow_backup_rooms: request.allow_backup_rooms,
        };

        let token = CancelToken::with_budget(
            None,
            Some(Duration::from_secs(self.config.timeouts.emergency_secs)),
        );
        let outcome = tokio::task::spawn_blocking(move || {
            let scheduler = EmergencyScheduler::new(&snapshot);
            scheduler.insert(&case, &existing, &token)
        })
        .await
        .map_err(|e| EngineError::Invariant(format!("emergency worker panicked: {e}")))?;

        self.tracker.record_search(
            &run_id,
            outcome.cascade_iterations,
            0,
            outcome.solution.assignment_count(),
            outcome.solution.pending_count(),
        );
        if outcome.success {
            // All-or-nothing: a persist failure leaves the store exactly as
            // it was before the insertion attempt.
            match self.persist_solution(date, &outcome.solution).await {
                Ok(version) => self.tracker.record_commit(&run_id, version),
                Err(err) => {
                    self.tracker.fail(&run_id, err.to_string());
                    return Err(err);
                }
            }
            self.tracker.log(
                &run_id,
                LogLevel::Success,
                format!(
                    "emergency {} placed via {:?} strategy",
                    request.surgery_id, outcome.strategy
                ),
            );
            self.tracker.complete(&run_id);
        } else {
            self.tracker.log(
                &run_id,
                LogLevel::Warning,
                outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| "emergency needs manual review".to_string()),
            );
            self.tracker.complete(&run_id);
        }

        let assignment = outcome.assignment.as_ref();
        Ok(EmergencyInsertionResult {
            success: outcome.success,
            surgery_id: request.surgery_id,
            assigned_room_id: assignment.map(|a| a.room_id),
            scheduled_start: assignment.map(|a| a.operation_start),
            scheduled_end: assignment.map(|a| a.end),
            bumped_surgery_ids: outcome.bumped,
            overtime_minutes: outcome.overtime_minutes,
            wait_minutes: outcome.wait_minutes,
            disruption_score: outcome.disruption_score,
            strategy_used: outcome.strategy,
            message: outcome.reason,
        })
    }

    /// Validate one date's committed schedule and summarize room load.
    pub async fn validate_schedule(
        &self,
        date: NaiveDate,
        checks: FeasibilityChecks,
    ) -> Result<ScheduleReport, EngineError> {
        let request = OptimizeRequest::for_date(date);
        let (snapshot, solution) = self.load_snapshot(date, &request).await?;

        let checker = FeasibilityChecker::new(&snapshot);
        let options = check_options_from(&checks);
        let verdict = checker.check_schedule(&solution, &options)?;

        let mut rooms = Vec::new();
        for room_id in solution.occupied_rooms().collect::<Vec<_>>() {
            let sequence = solution.room_sequence(room_id);
            let mut utilization = RoomUtilization {
                room_id,
                assignment_count: sequence.len(),
                busy_minutes: 0,
                setup_minutes: 0,
                idle_minutes: 0,
                overtime_minutes: 0,
            };
            for assignment in sequence {
                utilization.busy_minutes += assignment.duration_minutes();
                utilization.setup_minutes += assignment.setup_minutes;
            }
            for pair in sequence.windows(2) {
                utilization.idle_minutes +=
                    (pair[1].setup_start - pair[0].end).num_minutes().max(0);
            }
            if let (Some(room), Some(last)) = (snapshot.room(room_id), sequence.last()) {
                let close = snapshot.date.and_time(room.close_time);
                utilization.overtime_minutes = (last.end - close).num_minutes().max(0);
            }
            rooms.push(utilization);
        }

        Ok(ScheduleReport {
            date,
            feasible: verdict.feasible,
            violations: verdict.violations,
            warnings: verdict.warnings,
            rooms,
            assignment_count: solution.assignment_count(),
            pending_count: solution.pending_count(),
        })
    }

    /// Probe one placement without touching the store.
    pub async fn check_feasibility(
        &self,
        request: FeasibilityRequest,
    ) -> Result<FeasibilityResponse, EngineError> {
        let date = request.start_time.date();
        let optimize_request = OptimizeRequest::for_date(date);
        let (snapshot, solution) = self.load_snapshot(date, &optimize_request).await?;
        let started = Instant::now();

        let Some(surgery) = snapshot.surgery(request.surgery_id) else {
            return Err(EngineError::InvalidInput(format!(
                "unknown surgery {}",
                request.surgery_id
            )));
        };

        let previous_type = solution
            .room_sequence(request.room_id)
            .iter()
            .filter(|a| a.setup_start < request.start_time)
            .last()
            .and_then(|a| snapshot.surgery(a.surgery_id))
            .map(|s| s.surgery_type);
        let setup_minutes = snapshot
            .sdst
            .setup_minutes(previous_type, surgery.surgery_type);

        let placement = Placement {
            surgery,
            room_id: request.room_id,
            setup_start: request.start_time,
            setup_minutes,
        };
        let options = check_options_from(&request.checks);
        let verdict = FeasibilityChecker::new(&snapshot).check(&placement, &solution, &options)?;

        let mut recommendations: Vec<String> = verdict
            .violations
            .iter()
            .chain(verdict.warnings.iter())
            .flat_map(|v| v.suggested_actions.iter().cloned())
            .collect();
        recommendations.sort();
        recommendations.dedup();

        Ok(FeasibilityResponse {
            is_feasible: verdict.feasible,
            violations: verdict.violations,
            warnings: verdict.warnings,
            check_duration_ms: started.elapsed().as_millis() as u64,
            recommendations,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn tabu_params(&self, request: &OptimizeRequest) -> TabuParams {
        let mut params = TabuParams::from(self.config.tabu);
        if let Some(max_iterations) = request.max_iterations {
            params.max_iterations = max_iterations;
        }
        if let Some(tenure) = request.tabu_tenure {
            params.tenure = tenure;
        }
        params
    }

    /// Load everything one date's run needs into an immutable snapshot plus
    /// the already-committed solution for that date.
    async fn load_snapshot(
        &self,
        date: NaiveDate,
        request: &OptimizeRequest,
    ) -> Result<(PlanningSnapshot, Solution), EngineError> {
        let range = DateRange::single(date);
        let (pending, rooms_with_schedules, sdst, rules, (staff, equipment), surgery_types) =
            futures::try_join!(
                self.repo.list_pending_surgeries(range),
                self.repo.list_rooms_with_schedules(range),
                self.repo.load_sdst_snapshot(),
                self.repo.load_rule_set(),
                self.repo.load_staff_and_equipment(),
                self.repo.load_surgery_types(),
            )?;

        // Surgeries behind committed assignments are no longer pending but
        // the checker still needs their records.
        let scheduled_ids: Vec<SurgeryId> = rooms_with_schedules
            .iter()
            .flat_map(|(_, assignments)| assignments.iter().map(|a| a.surgery_id))
            .collect();
        let scheduled = self.repo.load_surgeries(scheduled_ids).await?;

        let mut config = self.config.clone();
        if let Some(weights) = request.weights {
            config.weights = weights;
        }

        let mut builder = PlanningSnapshot::builder(date)
            .surgeries(pending)
            .surgeries(scheduled)
            .sdst(sdst.with_default_minutes(config.defaults.missing_sdst_minutes))
            .rules(rules)
            .config(config);
        for surgery_type in surgery_types {
            builder = builder.surgery_type(surgery_type);
        }
        for member in staff {
            builder = builder.staff(member);
        }
        for unit in equipment {
            builder = builder.equipment(unit);
        }

        let mut existing = Solution::new();
        for (room, assignments) in rooms_with_schedules {
            builder = builder.room(room);
            for assignment in assignments {
                existing.insert(assignment);
            }
        }

        Ok((builder.build()?, existing))
    }

    /// Commit a solution for one date, retrying stale-version conflicts per
    /// configuration. Returns the version the write produced.
    async fn persist_solution(
        &self,
        date: NaiveDate,
        solution: &Solution,
    ) -> Result<crate::db::ScheduleVersion, EngineError> {
        let changes = ScheduleChangeSet {
            date,
            assignments: solution.assignments().cloned().collect(),
            pending: solution.pending().iter().copied().collect(),
        };

        let mut attempts = 0;
        loop {
            let version = self.repo.current_version().await?;
            match self.repo.persist_assignments(changes.clone(), version).await {
                Ok(new_version) => {
                    info!(%date, %new_version, "assignments committed");
                    return Ok(new_version);
                }
                Err(RepositoryError::Conflict { expected, actual })
                    if attempts < self.config.concurrency.persist_retries =>
                {
                    attempts += 1;
                    warn!(%expected, %actual, attempts, "version conflict, retrying persist");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn check_options_from(checks: &FeasibilityChecks) -> CheckOptions {
    CheckOptions {
        fast_fail: false,
        allow_overtime: false,
        check_equipment: checks.equipment,
        check_staff: checks.staff,
        check_qualifications: checks.specialization,
        check_rules: checks.custom,
    }
}

#[cfg(test)]
#[path = "scheduler_service_tests.rs"]
mod scheduler_service_tests;
