//! End-to-end optimizer scenarios against the in-memory repository.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};

use sso_rust::api::OptimizeRequest;
use sso_rust::config::SchedulerConfig;
use sso_rust::db::LocalRepository;
use sso_rust::engine::CancelToken;
use sso_rust::models::{
    OperatingRoom, RoomId, RoomStatus, SetupTimeEntry, SetupTimeMatrix, Staff, StaffId, Surgery,
    SurgeryId, SurgeryStatus, SurgeryTypeId, Urgency,
};
use sso_rust::SchedulingService;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn at(h: u32, m: u32) -> chrono::NaiveDateTime {
    date().and_hms_opt(h, m, 0).unwrap()
}

fn room(id: i64) -> OperatingRoom {
    OperatingRoom {
        id: RoomId::new(id),
        name: format!("OR-{id}"),
        open_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        close_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        status: RoomStatus::Active,
        primary_service: None,
        maintenance_windows: vec![],
    }
}

fn surgery(id: i64, type_id: i64, duration: i64) -> Surgery {
    Surgery {
        id: SurgeryId::new(id),
        surgery_type: SurgeryTypeId::new(type_id),
        duration_minutes: duration,
        urgency: Urgency::Scheduled,
        priority: 0,
        surgeon: None,
        equipment: BTreeSet::new(),
        staff_roles: BTreeSet::new(),
        status: SurgeryStatus::Pending,
        arrival: None,
        max_wait_minutes: None,
    }
}

fn matrix(entries: &[(Option<i64>, i64, i64)]) -> SetupTimeMatrix {
    SetupTimeMatrix::new(
        entries.iter().map(|(from, to, minutes)| SetupTimeEntry {
            from: from.map(SurgeryTypeId::new),
            to: SurgeryTypeId::new(*to),
            minutes: *minutes,
        }),
        0,
    )
    .unwrap()
}

fn service(repo: &LocalRepository) -> SchedulingService {
    SchedulingService::new(Arc::new(repo.clone()), SchedulerConfig::default())
}

/// Scenario A: single room, two surgeries, one setup transition.
#[tokio::test]
async fn scenario_a_single_room_two_surgeries() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_surgery(surgery(1, 1, 60)); // APPEN
    repo.insert_surgery(surgery(2, 2, 90)); // KNEE
    // The reverse transitions are costed explicitly so the documented
    // APPEN-then-KNEE order is also the optimum (missing pairs default to
    // zero and would otherwise reward flipping the day).
    repo.set_sdst(matrix(&[
        (None, 1, 15),
        (Some(1), 2, 30),
        (None, 2, 40),
        (Some(2), 1, 60),
    ]));

    let response = service(&repo)
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();

    assert_eq!(response.assignments.len(), 2);
    let s1 = response
        .assignments
        .iter()
        .find(|a| a.surgery_id == SurgeryId::new(1))
        .unwrap();
    assert_eq!(s1.setup_start, at(8, 0));
    assert_eq!(s1.operation_start, at(8, 15));
    assert_eq!(s1.end, at(9, 15));

    let s2 = response
        .assignments
        .iter()
        .find(|a| a.surgery_id == SurgeryId::new(2))
        .unwrap();
    assert_eq!(s2.setup_start, at(9, 15));
    assert_eq!(s2.operation_start, at(9, 45));
    assert_eq!(s2.end, at(11, 15));

    assert_eq!(response.metrics.total_sdst, 45);
}

/// Scenario B: ordering affects total setup; the optimizer must group the
/// same-type surgeries (S1 -> S3 -> S2, 55 setup minutes) instead of the
/// greedy id order (90 minutes).
#[tokio::test]
async fn scenario_b_order_affects_cost() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_surgery(surgery(1, 1, 60));
    repo.insert_surgery(surgery(2, 2, 90));
    repo.insert_surgery(surgery(3, 1, 45));
    repo.set_sdst(matrix(&[
        (None, 1, 15),
        (None, 2, 15),
        (Some(1), 2, 30),
        (Some(2), 1, 45),
        (Some(1), 1, 10),
    ]));

    let response = service(&repo)
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();

    assert_eq!(response.assignments.len(), 3);
    assert_eq!(response.metrics.total_sdst, 55);
    assert!(response.metrics.improvement_count >= 1);

    let mut ordered = response.assignments.clone();
    ordered.sort_by_key(|a| a.setup_start);
    let ids: Vec<i64> = ordered.iter().map(|a| a.surgery_id.value()).collect();
    assert_eq!(ids, vec![1, 3, 2]);
}

/// Scenario C: two surgeries sharing a surgeon must not run in parallel,
/// even with a second empty room available.
#[tokio::test]
async fn scenario_c_surgeon_conflict_serializes() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_room(room(2));
    repo.insert_staff(Staff {
        id: StaffId::new(9),
        name: "Dr. X".to_string(),
        role: "surgeon".to_string(),
        qualifications: BTreeSet::new(),
        availability: vec![],
        daily_cap_minutes: 720,
    });
    for id in [1, 2] {
        let mut s = surgery(id, 1, 60);
        s.surgeon = Some(StaffId::new(9));
        repo.insert_surgery(s);
    }

    let response = service(&repo)
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();

    assert_eq!(response.assignments.len(), 2);
    let mut ordered = response.assignments.clone();
    ordered.sort_by_key(|a| a.operation_start);
    assert_eq!(ordered[0].operation_start, at(8, 0));
    assert_eq!(ordered[1].operation_start, at(9, 0));
    // Operative intervals must not overlap.
    assert!(ordered[0].end <= ordered[1].operation_start);
}

/// Scenario E: a breached hard cap behaves like cancellation and returns
/// the best feasible schedule found so far, unpersisted.
#[tokio::test]
async fn scenario_e_hard_timeout_returns_best_so_far() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_room(room(2));
    for id in 1..=30 {
        repo.insert_surgery(surgery(id, 1 + (id % 2), 45));
    }
    repo.set_sdst(matrix(&[
        (None, 1, 10),
        (None, 2, 10),
        (Some(1), 2, 25),
        (Some(2), 1, 25),
        (Some(1), 1, 5),
        (Some(2), 2, 5),
    ]));

    let token = CancelToken::with_budget(None, Some(Duration::ZERO));
    let response = service(&repo)
        .optimize_with_cancel(OptimizeRequest::for_date(date()), token)
        .await
        .unwrap();

    assert!(response.cancelled);
    assert!(response.message.contains("cancelled"));
    // Nothing was persisted.
    assert!(repo.assignments_on(date()).is_empty());
}

/// Missing SDST pairs fall back to the configured default of zero minutes.
#[tokio::test]
async fn missing_sdst_pair_defaults_to_zero() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_surgery(surgery(1, 1, 60));
    repo.insert_surgery(surgery(2, 2, 60));
    // Only the initial row for type 1 is known.
    repo.set_sdst(matrix(&[(None, 1, 15)]));

    let response = service(&repo)
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();

    assert_eq!(response.assignments.len(), 2);
    let s2 = response
        .assignments
        .iter()
        .find(|a| a.surgery_id == SurgeryId::new(2))
        .unwrap();
    assert_eq!(s2.applied_setup_minutes, 0);
    // Every transition around type 2 resolves to the 0-minute default, so
    // the search ends up opening the day with it and drops the one known
    // 15-minute initial setup as well.
    assert_eq!(response.metrics.total_sdst, 0);
}

/// The optimizer is deterministic: identical stores and configuration give
/// identical assignment sets.
#[tokio::test]
async fn optimize_is_deterministic_across_runs() {
    let build = || {
        let repo = LocalRepository::new();
        repo.insert_room(room(1));
        repo.insert_room(room(2));
        for id in 1..=8 {
            repo.insert_surgery(surgery(id, 1 + (id % 3), 30 + 10 * (id % 4)));
        }
        repo.set_sdst(matrix(&[
            (None, 1, 10),
            (None, 2, 12),
            (None, 3, 14),
            (Some(1), 2, 20),
            (Some(2), 3, 22),
            (Some(3), 1, 24),
            (Some(1), 1, 5),
            (Some(2), 2, 6),
            (Some(3), 3, 7),
        ]));
        repo
    };

    let first = service(&build())
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();
    let second = service(&build())
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();

    assert_eq!(first.assignments, second.assignments);
    assert_eq!(first.metrics.iterations, second.metrics.iterations);
    assert_eq!(first.metrics.total_sdst, second.metrics.total_sdst);
}
