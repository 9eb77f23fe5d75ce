//! Custom scheduling rules.
//!
//! Rules are plain data loaded from the repository: a tagged kind, a
//! severity, a scope filter, and a parameter map. The former inheritance
//! hierarchy collapses to [`RuleKind`] plus one evaluation function per
//! kind; unknown or malformed parameters degrade to low-severity warnings
//! instead of failing the run.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::violation::{Severity, Violation, ViolationKind};
use crate::models::{
    OperatingRoom, RoomId, StaffId, Surgery, SurgeryTypeId, TimeSlot,
};

/// Tagged parameter value, keyed by string in [`Rule::parameters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Number(f64),
    Text(String),
    /// A daily time-of-day span, e.g. "only between 09:00 and 14:00".
    Interval { start: NaiveTime, end: NaiveTime },
    IdList(Vec<i64>),
}

impl ParamValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    fn as_interval(&self) -> Option<(NaiveTime, NaiveTime)> {
        match self {
            ParamValue::Interval { start, end } => Some((*start, *end)),
            _ => None,
        }
    }

    fn as_id_list(&self) -> Option<&[i64]> {
        match self {
            ParamValue::IdList(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    TimeWindow,
    ResourceRestriction,
    DurationBound,
    ForbiddenTransition,
    Custom,
}

impl RuleKind {
    fn violation_kind(&self) -> ViolationKind {
        match self {
            RuleKind::TimeWindow => ViolationKind::TimeWindow,
            RuleKind::ResourceRestriction => ViolationKind::ResourceRestriction,
            RuleKind::DurationBound => ViolationKind::DurationBound,
            RuleKind::ForbiddenTransition => ViolationKind::ForbiddenTransition,
            RuleKind::Custom => ViolationKind::Custom,
        }
    }
}

/// Which placements a rule applies to. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleScope {
    #[serde(default)]
    pub surgery_types: Option<Vec<SurgeryTypeId>>,
    #[serde(default)]
    pub rooms: Option<Vec<RoomId>>,
    #[serde(default)]
    pub surgeons: Option<Vec<StaffId>>,
}

impl RuleScope {
    pub fn matches(
        &self,
        surgery_type: SurgeryTypeId,
        room: RoomId,
        surgeon: Option<StaffId>,
    ) -> bool {
        if let Some(types) = &self.surgery_types {
            if !types.contains(&surgery_type) {
                return false;
            }
        }
        if let Some(rooms) = &self.rooms {
            if !rooms.contains(&room) {
                return false;
            }
        }
        if let Some(surgeons) = &self.surgeons {
            match surgeon {
                Some(s) if surgeons.contains(&s) => {}
                _ => return false,
            }
        }
        true
    }
}

/// A configurable scheduling rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub kind: RuleKind,
    pub severity: Severity,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

/// Everything a rule may look at when judging a placement.
pub struct RuleContext<'a> {
    pub surgery: &'a Surgery,
    pub room: &'a OperatingRoom,
    /// Full occupation `[setup_start, end)`.
    pub slot: TimeSlot,
    /// Operative interval `[operation_start, end)`.
    pub operation_slot: TimeSlot,
    /// Type of the preceding surgery in the room, if any.
    pub previous_type: Option<SurgeryTypeId>,
    /// Minutes the room is already booked for on this date, excluding the
    /// candidate.
    pub room_booked_minutes: i64,
}

impl Rule {
    /// Evaluate this rule against a placement. `None` means the rule is
    /// satisfied or out of scope.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Violation> {
        if !self
            .scope
            .matches(ctx.surgery.surgery_type, ctx.room.id, ctx.surgery.surgeon)
        {
            return None;
        }
        match self.kind {
            RuleKind::TimeWindow => self.evaluate_time_window(ctx),
            RuleKind::ResourceRestriction => self.evaluate_resource_restriction(ctx),
            RuleKind::DurationBound => self.evaluate_duration_bound(ctx),
            RuleKind::ForbiddenTransition => self.evaluate_forbidden_transition(ctx),
            RuleKind::Custom => self.evaluate_custom(ctx),
        }
    }

    fn base_violation(&self, description: String) -> Violation {
        Violation::new(self.kind.violation_kind(), self.severity, description)
            .with_rule(self.id.clone())
    }

    fn evaluate_time_window(&self, ctx: &RuleContext<'_>) -> Option<Violation> {
        let (start, end) = self.parameters.get("window")?.as_interval()?;
        let date = ctx.operation_slot.start.date();
        let window = TimeSlot::new(date.and_time(start), date.and_time(end));
        if window.covers(&ctx.operation_slot) {
            None
        } else {
            Some(
                self.base_violation(format!(
                    "operation must run within {start}-{end} for rule '{}'",
                    self.id
                ))
                .with_surgery(ctx.surgery.id)
                .with_room(ctx.room.id)
                .suggest(format!("move the surgery inside {start}-{end}")),
            )
        }
    }

    fn evaluate_resource_restriction(&self, ctx: &RuleContext<'_>) -> Option<Violation> {
        let room_value = ctx.room.id.value();
        if let Some(forbidden) = self
            .parameters
            .get("forbidden_rooms")
            .and_then(ParamValue::as_id_list)
        {
            if forbidden.contains(&room_value) {
                return Some(
                    self.base_violation(format!(
                        "room {} is not allowed for this surgery",
                        ctx.room.name
                    ))
                    .with_surgery(ctx.surgery.id)
                    .with_room(ctx.room.id)
                    .suggest("choose a different room"),
                );
            }
        }
        if let Some(allowed) = self
            .parameters
            .get("allowed_rooms")
            .and_then(ParamValue::as_id_list)
        {
            if !allowed.contains(&room_value) {
                return Some(
                    self.base_violation(format!(
                        "room {} is outside the allowed set for this surgery",
                        ctx.room.name
                    ))
                    .with_surgery(ctx.surgery.id)
                    .with_room(ctx.room.id)
                    .suggest("use one of the designated rooms"),
                );
            }
        }
        None
    }

    fn evaluate_duration_bound(&self, ctx: &RuleContext<'_>) -> Option<Violation> {
        let duration = ctx.surgery.duration_minutes as f64;
        if let Some(min) = self.parameters.get("min_minutes").and_then(ParamValue::as_number) {
            if duration < min {
                return Some(
                    self.base_violation(format!(
                        "estimated duration {duration} min is below the minimum of {min} min"
                    ))
                    .with_surgery(ctx.surgery.id),
                );
            }
        }
        if let Some(max) = self.parameters.get("max_minutes").and_then(ParamValue::as_number) {
            if duration > max {
                return Some(
                    self.base_violation(format!(
                        "estimated duration {duration} min exceeds the maximum of {max} min"
                    ))
                    .with_surgery(ctx.surgery.id),
                );
            }
        }
        None
    }

    fn evaluate_forbidden_transition(&self, ctx: &RuleContext<'_>) -> Option<Violation> {
        let from = self.parameters.get("from_type").and_then(ParamValue::as_number)?;
        let to = self.parameters.get("to_type").and_then(ParamValue::as_number)?;
        let prev = ctx.previous_type?;
        if prev.value() == from as i64 && ctx.surgery.surgery_type.value() == to as i64 {
            Some(
                self.base_violation(format!(
                    "surgery type {} may not directly follow type {} in the same room",
                    ctx.surgery.surgery_type, prev
                ))
                .with_surgery(ctx.surgery.id)
                .with_room(ctx.room.id)
                .suggest("insert a different procedure between the two types"),
            )
        } else {
            None
        }
    }

    fn evaluate_custom(&self, ctx: &RuleContext<'_>) -> Option<Violation> {
        let check = self.parameters.get("check").and_then(ParamValue::as_text);
        match check {
            Some("max_room_minutes") => {
                let cap = self
                    .parameters
                    .get("minutes")
                    .and_then(ParamValue::as_number)?;
                let booked = ctx.room_booked_minutes + ctx.slot.duration_minutes();
                if booked as f64 > cap {
                    Some(
                        self.base_violation(format!(
                            "room {} would be booked {booked} min, above the cap of {cap} min",
                            ctx.room.name
                        ))
                        .with_surgery(ctx.surgery.id)
                        .with_room(ctx.room.id)
                        .suggest("distribute load to another room"),
                    )
                } else {
                    None
                }
            }
            Some(other) => Some(
                Violation::new(
                    ViolationKind::Custom,
                    Severity::Low,
                    format!("rule '{}' references unknown check '{other}'", self.id),
                )
                .with_rule(self.id.clone()),
            ),
            None => None,
        }
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod rules_tests;
