use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::*;
use crate::models::{RoomStatus, SurgeryId, SurgeryStatus, Urgency};

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn surgery(type_id: i64) -> Surgery {
    Surgery {
        id: SurgeryId::new(1),
        surgery_type: SurgeryTypeId::new(type_id),
        duration_minutes: 60,
        urgency: Urgency::Scheduled,
        priority: 0,
        surgeon: None,
        equipment: Default::default(),
        staff_roles: Default::default(),
        status: SurgeryStatus::Pending,
        arrival: None,
        max_wait_minutes: None,
    }
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

fn context<'a>(surgery: &'a Surgery, room: &'a OperatingRoom) -> RuleContext<'a> {
    RuleContext {
        surgery,
        room,
        slot: TimeSlot::new(at(9, 0), at(10, 15)),
        operation_slot: TimeSlot::new(at(9, 15), at(10, 15)),
        previous_type: None,
        room_booked_minutes: 0,
    }
}

fn rule(kind: RuleKind, params: BTreeMap<String, ParamValue>) -> Rule {
    Rule {
        id: "r1".to_string(),
        kind,
        severity: Severity::Critical,
        scope: RuleScope::default(),
        parameters: params,
    }
}

#[test]
fn test_scope_none_matches_all() {
    let scope = RuleScope::default();
    assert!(scope.matches(SurgeryTypeId::new(1), RoomId::new(1), None));
}

#[test]
fn test_scope_filters_by_type() {
    let scope = RuleScope {
        surgery_types: Some(vec![SurgeryTypeId::new(2)]),
        ..Default::default()
    };
    assert!(!scope.matches(SurgeryTypeId::new(1), RoomId::new(1), None));
    assert!(scope.matches(SurgeryTypeId::new(2), RoomId::new(1), None));
}

#[test]
fn test_scope_surgeon_filter_requires_surgeon() {
    let scope = RuleScope {
        surgeons: Some(vec![crate::models::StaffId::new(9)]),
        ..Default::default()
    };
    assert!(!scope.matches(SurgeryTypeId::new(1), RoomId::new(1), None));
    assert!(scope.matches(
        SurgeryTypeId::new(1),
        RoomId::new(1),
        Some(crate::models::StaffId::new(9))
    ));
}

#[test]
fn test_time_window_rule_inside_passes() {
    let mut params = BTreeMap::new();
    params.insert(
        "window".to_string(),
        ParamValue::Interval {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        },
    );
    let rule = rule(RuleKind::TimeWindow, params);
    let s = surgery(1);
    let r = room(1);
    assert!(rule.evaluate(&context(&s, &r)).is_none());
}

#[test]
fn test_time_window_rule_outside_violates() {
    let mut params = BTreeMap::new();
    params.insert(
        "window".to_string(),
        ParamValue::Interval {
            start: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        },
    );
    let rule = rule(RuleKind::TimeWindow, params);
    let s = surgery(1);
    let r = room(1);
    let violation = rule.evaluate(&context(&s, &r)).unwrap();
    assert_eq!(violation.kind, ViolationKind::TimeWindow);
    assert_eq!(violation.rule_id.as_deref(), Some("r1"));
}

#[test]
fn test_forbidden_rooms() {
    let mut params = BTreeMap::new();
    params.insert("forbidden_rooms".to_string(), ParamValue::IdList(vec![1]));
    let rule = rule(RuleKind::ResourceRestriction, params);
    let s = surgery(1);
    let r = room(1);
    assert!(rule.evaluate(&context(&s, &r)).is_some());
    let other = room(2);
    assert!(rule.evaluate(&context(&s, &other)).is_none());
}

#[test]
fn test_duration_bounds() {
    let mut params = BTreeMap::new();
    params.insert("min_minutes".to_string(), ParamValue::Number(90.0));
    let rule = rule(RuleKind::DurationBound, params);
    let s = surgery(1);
    let r = room(1);
    let violation = rule.evaluate(&context(&s, &r)).unwrap();
    assert_eq!(violation.kind, ViolationKind::DurationBound);
}

#[test]
fn test_forbidden_transition_needs_matching_previous() {
    let mut params = BTreeMap::new();
    params.insert("from_type".to_string(), ParamValue::Number(3.0));
    params.insert("to_type".to_string(), ParamValue::Number(1.0));
    let rule = rule(RuleKind::ForbiddenTransition, params);
    let s = surgery(1);
    let r = room(1);

    let mut ctx = context(&s, &r);
    assert!(rule.evaluate(&ctx).is_none());

    ctx.previous_type = Some(SurgeryTypeId::new(3));
    assert!(rule.evaluate(&ctx).is_some());

    ctx.previous_type = Some(SurgeryTypeId::new(4));
    assert!(rule.evaluate(&ctx).is_none());
}

#[test]
fn test_custom_max_room_minutes() {
    let mut params = BTreeMap::new();
    params.insert(
        "check".to_string(),
        ParamValue::Text("max_room_minutes".to_string()),
    );
    params.insert("minutes".to_string(), ParamValue::Number(100.0));
    let rule = rule(RuleKind::Custom, params);
    let s = surgery(1);
    let r = room(1);

    // Slot is 75 minutes; 40 already booked pushes past the 100 min cap.
    let mut ctx = context(&s, &r);
    assert!(rule.evaluate(&ctx).is_none());
    ctx.room_booked_minutes = 40;
    assert!(rule.evaluate(&ctx).is_some());
}

#[test]
fn test_custom_unknown_check_degrades_to_warning() {
    let mut params = BTreeMap::new();
    params.insert("check".to_string(), ParamValue::Text("no_such_check".to_string()));
    let rule = rule(RuleKind::Custom, params);
    let s = surgery(1);
    let r = room(1);
    let violation = rule.evaluate(&context(&s, &r)).unwrap();
    assert_eq!(violation.severity, Severity::Low);
}
