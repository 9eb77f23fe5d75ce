use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::*;
use crate::models::{
    OperatingRoom, RoomStatus, SetupTimeEntry, SetupTimeMatrix, Staff, StaffId, SurgeryStatus,
    SurgeryTypeId, Urgency,
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    date().and_hms_opt(h, m, 0).unwrap()
}

fn room(id: i64) -> OperatingRoom {
    OperatingRoom {
        id: RoomId::new(id),
        name: format!("R{id}"),
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

/// Scenario from the product brief: APPEN then KNEE with initial and
/// transition setups.
fn scenario_a_sdst() -> SetupTimeMatrix {
    SetupTimeMatrix::new(
        [
            SetupTimeEntry {
                from: None,
                to: SurgeryTypeId::new(1),
                minutes: 15,
            },
            SetupTimeEntry {
                from: Some(SurgeryTypeId::new(1)),
                to: SurgeryTypeId::new(2),
                minutes: 30,
            },
        ],
        0,
    )
    .unwrap()
}

#[test]
fn test_initial_solution_single_room_two_surgeries() {
    let snapshot = PlanningSnapshot::builder(date())
        .room(room(1))
        .surgery(surgery(1, 1, 60))
        .surgery(surgery(2, 2, 90))
        .sdst(scenario_a_sdst())
        .build()
        .unwrap();

    let solution = initial_solution(&snapshot, Solution::new());
    assert_eq!(solution.assignment_count(), 2);
    assert_eq!(solution.pending_count(), 0);

    let seq = solution.room_sequence(RoomId::new(1));
    assert_eq!(seq[0].surgery_id, SurgeryId::new(1));
    assert_eq!(seq[0].setup_start, at(8, 0));
    assert_eq!(seq[0].operation_start, at(8, 15));
    assert_eq!(seq[0].end, at(9, 15));

    assert_eq!(seq[1].surgery_id, SurgeryId::new(2));
    assert_eq!(seq[1].setup_start, at(9, 15));
    assert_eq!(seq[1].operation_start, at(9, 45));
    assert_eq!(seq[1].end, at(11, 15));

    assert_eq!(room_total_sdst(&solution, RoomId::new(1)), 45);
}

#[test]
fn test_recompute_room_is_fixed_point() {
    let snapshot = PlanningSnapshot::builder(date())
        .room(room(1))
        .surgery(surgery(1, 1, 60))
        .surgery(surgery(2, 2, 90))
        .sdst(scenario_a_sdst())
        .build()
        .unwrap();
    let solution = initial_solution(&snapshot, Solution::new());
    let r = snapshot.room(RoomId::new(1)).unwrap();

    let once = recompute_room(solution.room_sequence(RoomId::new(1)), r, &snapshot).unwrap();
    let twice = recompute_room(&once, r, &snapshot).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once, solution.room_sequence(RoomId::new(1)));
}

#[test]
fn test_recompute_room_refreshes_setups_after_reorder() {
    let snapshot = PlanningSnapshot::builder(date())
        .room(room(1))
        .surgery(surgery(1, 1, 60))
        .surgery(surgery(2, 2, 90))
        .sdst(
            SetupTimeMatrix::new(
                [
                    SetupTimeEntry {
                        from: None,
                        to: SurgeryTypeId::new(1),
                        minutes: 15,
                    },
                    SetupTimeEntry {
                        from: None,
                        to: SurgeryTypeId::new(2),
                        minutes: 20,
                    },
                    SetupTimeEntry {
                        from: Some(SurgeryTypeId::new(1)),
                        to: SurgeryTypeId::new(2),
                        minutes: 30,
                    },
                    SetupTimeEntry {
                        from: Some(SurgeryTypeId::new(2)),
                        to: SurgeryTypeId::new(1),
                        minutes: 45,
                    },
                ],
                0,
            )
            .unwrap(),
        )
        .build()
        .unwrap();
    let solution = initial_solution(&snapshot, Solution::new());
    let r = snapshot.room(RoomId::new(1)).unwrap();

    // Reverse the order: surgery 2 now opens the day.
    let mut reversed: Vec<_> = solution.room_sequence(RoomId::new(1)).to_vec();
    reversed.reverse();
    let recomputed = recompute_room(&reversed, r, &snapshot).unwrap();

    assert_eq!(recomputed[0].surgery_id, SurgeryId::new(2));
    assert_eq!(recomputed[0].setup_minutes, 20);
    assert_eq!(recomputed[0].setup_start, at(8, 0));
    assert_eq!(recomputed[1].surgery_id, SurgeryId::new(1));
    assert_eq!(recomputed[1].setup_minutes, 45);
    assert_eq!(recomputed[1].setup_start, recomputed[0].end);
}

#[test]
fn test_next_available_jumps_past_surgeon_conflict() {
    let mut s1 = surgery(1, 1, 60);
    s1.surgeon = Some(StaffId::new(9));
    let mut s2 = surgery(2, 1, 60);
    s2.surgeon = Some(StaffId::new(9));
    let snapshot = PlanningSnapshot::builder(date())
        .room(room(1))
        .room(room(2))
        .surgery(s1.clone())
        .surgery(s2.clone())
        .staff(Staff {
            id: StaffId::new(9),
            name: "Dr. X".to_string(),
            role: "surgeon".to_string(),
            qualifications: BTreeSet::new(),
            availability: vec![],
            daily_cap_minutes: 720,
        })
        .build()
        .unwrap();

    let mut solution = Solution::new();
    solution.insert(
        crate::constraints::Placement {
            surgery: &s1,
            room_id: RoomId::new(1),
            setup_start: at(8, 0),
            setup_minutes: 0,
        }
        .into_assignment(),
    );

    // Room 2 is empty, but the shared surgeon is busy until 09:00. The
    // candidate must jump to the release point instead of scanning minutes.
    let r2 = snapshot.room(RoomId::new(2)).unwrap();
    let start = next_available(r2, &s2, &solution, &snapshot, &CheckOptions::default());
    assert_eq!(start, Some(at(9, 0)));
}

#[test]
fn test_next_available_none_when_day_cannot_fit() {
    let snapshot = PlanningSnapshot::builder(date())
        .room(room(1))
        .surgery(surgery(1, 1, 10 * 60))
        .build()
        .unwrap();
    let s = snapshot.surgery(SurgeryId::new(1)).unwrap();
    let r = snapshot.room(RoomId::new(1)).unwrap();
    // A 10-hour procedure cannot fit a 9-hour room day.
    assert_eq!(
        next_available(r, s, &Solution::new(), &snapshot, &CheckOptions::default()),
        None
    );
}

#[test]
fn test_best_insertion_breaks_ties_by_room_id() {
    let snapshot = PlanningSnapshot::builder(date())
        .room(room(2))
        .room(room(1))
        .surgery(surgery(1, 1, 60))
        .build()
        .unwrap();
    let s = snapshot.surgery(SurgeryId::new(1)).unwrap();
    let assignment = best_insertion(s, &Solution::new(), &snapshot, &CheckOptions::default())
        .expect("placement");
    assert_eq!(assignment.room_id, RoomId::new(1));
}

#[test]
fn test_initial_solution_leaves_unplaceable_pending() {
    let mut r = room(1);
    r.status = RoomStatus::Maintenance;
    let snapshot = PlanningSnapshot::builder(date())
        .room(r)
        .surgery(surgery(1, 1, 60))
        .build()
        .unwrap();
    let solution = initial_solution(&snapshot, Solution::new());
    assert_eq!(solution.assignment_count(), 0);
    assert_eq!(solution.pending_count(), 1);
}

#[test]
fn test_dispatch_order_urgency_then_priority_then_id() {
    let mut urgent = surgery(3, 1, 30);
    urgent.urgency = Urgency::Urgent;
    let mut high_priority = surgery(2, 1, 30);
    high_priority.priority = 5;
    let snapshot = PlanningSnapshot::builder(date())
        .room(room(1))
        .surgery(surgery(1, 1, 30))
        .surgery(high_priority)
        .surgery(urgent)
        .build()
        .unwrap();

    let mut pending = vec![SurgeryId::new(1), SurgeryId::new(2), SurgeryId::new(3)];
    dispatch_order(&snapshot, &mut pending);
    assert_eq!(
        pending,
        vec![SurgeryId::new(3), SurgeryId::new(2), SurgeryId::new(1)]
    );
}
