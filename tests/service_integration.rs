//! Facade integration: emergency bumping, optimistic concurrency, and
//! schedule invariants on persisted output.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use sso_rust::api::{EmergencyRequest, OptimizeRequest};
use sso_rust::config::SchedulerConfig;
use sso_rust::db::{
    DateRange, LocalRepository, RepositoryError, ScheduleChangeSet, SchedulingRepository,
};
use sso_rust::engine::InsertionStrategy;
use sso_rust::models::{
    OperatingRoom, RoomId, RoomStatus, SetupTimeEntry, SetupTimeMatrix, Surgery, SurgeryId,
    SurgeryStatus, SurgeryTypeId, Urgency,
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

fn surgery(id: i64, type_id: i64, duration: i64, urgency: Urgency) -> Surgery {
    Surgery {
        id: SurgeryId::new(id),
        surgery_type: SurgeryTypeId::new(type_id),
        duration_minutes: duration,
        urgency,
        priority: 0,
        surgeon: None,
        equipment: BTreeSet::new(),
        staff_roles: BTreeSet::new(),
        status: SurgeryStatus::Pending,
        arrival: None,
        max_wait_minutes: None,
    }
}

fn service(repo: &LocalRepository) -> SchedulingService {
    SchedulingService::new(Arc::new(repo.clone()), SchedulerConfig::default())
}

/// Scenario D: an Urgent emergency with bumping allowed displaces the
/// Scheduled-urgency surgery blocking the only room.
#[tokio::test]
async fn scenario_d_urgent_emergency_bumps_lower_priority() {
    sso_rust::telemetry::init();
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_surgery(surgery(1, 1, 120, Urgency::Scheduled));
    let facade = service(&repo);
    facade
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();

    // The emergency record itself comes from intake.
    let mut emergency = surgery(100, 1, 60, Urgency::Urgent);
    emergency.arrival = Some(at(8, 10));
    repo.insert_surgery(emergency);

    let result = facade
        .insert_emergency(EmergencyRequest {
            surgery_id: SurgeryId::new(100),
            surgery_type: SurgeryTypeId::new(1),
            priority: Urgency::Urgent,
            duration_minutes: 60,
            arrival: at(8, 10),
            required_surgeon: None,
            required_equipment: vec![],
            required_staff_roles: vec![],
            allow_bumping: true,
            allow_overtime: false,
            allow_backup_rooms: false,
        })
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.strategy_used, InsertionStrategy::Bump);
    assert_eq!(result.bumped_surgery_ids, vec![SurgeryId::new(1)]);
    assert!(result.wait_minutes <= 60);
    assert!(result.scheduled_start.unwrap() >= at(8, 10));

    // The store reflects the insertion: the emergency is scheduled and the
    // cascading reschedule moved the bumped surgery behind it.
    assert_eq!(
        repo.surgery_status(SurgeryId::new(100)),
        Some(SurgeryStatus::Scheduled)
    );
    let committed = repo.assignments_on(date());
    let emergency_slot = committed
        .iter()
        .find(|a| a.surgery_id == SurgeryId::new(100))
        .expect("emergency committed");
    let moved = committed
        .iter()
        .find(|a| a.surgery_id == SurgeryId::new(1))
        .expect("bumped surgery rescheduled");
    assert!(moved.setup_start >= emergency_slot.end);
    assert_eq!(
        repo.surgery_status(SurgeryId::new(1)),
        Some(SurgeryStatus::Scheduled)
    );
}

/// An unresolvable emergency comes back as manual review with a reason and
/// leaves the store untouched.
#[tokio::test]
async fn unresolvable_emergency_reports_manual_review() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_surgery(surgery(1, 1, 9 * 60, Urgency::Immediate));
    let facade = service(&repo);
    facade
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();
    let version_before = repo.current_version().await.unwrap();

    let mut emergency = surgery(100, 1, 60, Urgency::Immediate);
    emergency.arrival = Some(at(9, 0));
    repo.insert_surgery(emergency);

    let result = facade
        .insert_emergency(EmergencyRequest {
            surgery_id: SurgeryId::new(100),
            surgery_type: SurgeryTypeId::new(1),
            priority: Urgency::Immediate,
            duration_minutes: 60,
            arrival: at(9, 0),
            required_surgeon: None,
            required_equipment: vec![],
            required_staff_roles: vec![],
            allow_bumping: false,
            allow_overtime: false,
            allow_backup_rooms: false,
        })
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.strategy_used, InsertionStrategy::Manual);
    assert!(result.message.is_some());
    assert_eq!(repo.current_version().await.unwrap(), version_before);
}

/// Two writers racing on the same store: the loser's stale version is
/// rejected with a conflict.
#[tokio::test]
async fn stale_version_write_conflicts() {
    let repo = LocalRepository::new();
    repo.insert_surgery(surgery(1, 1, 60, Urgency::Scheduled));
    repo.insert_surgery(surgery(2, 1, 60, Urgency::Scheduled));

    let stale = repo.current_version().await.unwrap();
    repo.persist_assignments(
        ScheduleChangeSet {
            date: date(),
            assignments: vec![],
            pending: vec![SurgeryId::new(1)],
        },
        stale,
    )
    .await
    .unwrap();

    let result = repo
        .persist_assignments(
            ScheduleChangeSet {
                date: date(),
                assignments: vec![],
                pending: vec![SurgeryId::new(2)],
            },
            stale,
        )
        .await;
    assert!(matches!(result, Err(RepositoryError::Conflict { .. })));
}

/// The facade retries one stale-version conflict transparently: two
/// sequential optimize calls over the same store both commit.
#[tokio::test]
async fn sequential_runs_advance_versions() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_surgery(surgery(1, 1, 60, Urgency::Scheduled));
    let facade = service(&repo);

    facade
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();
    let after_first = repo.current_version().await.unwrap();

    repo.insert_surgery(surgery(2, 1, 60, Urgency::Scheduled));
    facade
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();
    let after_second = repo.current_version().await.unwrap();
    assert!(after_second > after_first);
    assert_eq!(repo.assignments_on(date()).len(), 2);
}

/// Persisted schedules uphold the published invariants: per-room
/// non-overlap, setup chaining, and timestamp consistency.
#[tokio::test]
async fn persisted_schedule_upholds_invariants() {
    let repo = LocalRepository::new();
    repo.insert_room(room(1));
    repo.insert_room(room(2));
    for id in 1..=6 {
        repo.insert_surgery(surgery(id, 1 + (id % 2), 40 + 10 * (id % 3), Urgency::Scheduled));
    }
    repo.set_sdst(
        SetupTimeMatrix::new(
            [
                SetupTimeEntry {
                    from: None,
                    to: SurgeryTypeId::new(1),
                    minutes: 10,
                },
                SetupTimeEntry {
                    from: None,
                    to: SurgeryTypeId::new(2),
                    minutes: 12,
                },
                SetupTimeEntry {
                    from: Some(SurgeryTypeId::new(1)),
                    to: SurgeryTypeId::new(2),
                    minutes: 18,
                },
                SetupTimeEntry {
                    from: Some(SurgeryTypeId::new(2)),
                    to: SurgeryTypeId::new(1),
                    minutes: 16,
                },
            ],
            0,
        )
        .unwrap(),
    );

    let facade = service(&repo);
    facade
        .optimize(OptimizeRequest::for_date(date()))
        .await
        .unwrap();

    let rooms = repo
        .list_rooms_with_schedules(DateRange::single(date()))
        .await
        .unwrap();
    for (_, sequence) in rooms {
        for assignment in &sequence {
            assert_eq!(
                assignment.operation_start,
                assignment.setup_start + chrono::Duration::minutes(assignment.setup_minutes)
            );
            assert!(assignment.end > assignment.operation_start);
        }
        for pair in sequence.windows(2) {
            assert!(pair[1].setup_start >= pair[0].end, "room sequence overlaps");
        }
    }
}
