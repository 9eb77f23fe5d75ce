//! Operating rooms, staff, and equipment catalogs.
//!
//! These records are owned by the resource catalog and are read-only to the
//! engine within a run.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::ids::{EquipmentId, RoomId, StaffId};
use super::time::TimeSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Maintenance,
    Inactive,
}

/// An operating room with a daily operational window `[open, close)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingRoom {
    pub id: RoomId,
    pub name: String,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub status: RoomStatus,
    /// Service line this room primarily serves; `None` means general use.
    #[serde(default)]
    pub primary_service: Option<String>,
    /// Planned maintenance blocks during which the room is unusable.
    #[serde(default)]
    pub maintenance_windows: Vec<TimeSlot>,
}

impl OperatingRoom {
    /// The operational window for a given date.
    pub fn window(&self, date: NaiveDate) -> TimeSlot {
        TimeSlot::new(date.and_time(self.open_time), date.and_time(self.close_time))
    }

    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }
}

/// A staff member (surgeons carry the surgery-type codes they are qualified
/// for in `qualifications`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub qualifications: BTreeSet<String>,
    /// Concrete availability windows materialized for the planning horizon.
    #[serde(default)]
    pub availability: Vec<TimeSlot>,
    /// Maximum minutes of assigned work per day.
    #[serde(default = "default_daily_cap_minutes")]
    pub daily_cap_minutes: i64,
}

fn default_daily_cap_minutes() -> i64 {
    12 * 60
}

impl Staff {
    /// True if some availability window covers the whole slot.
    pub fn is_available_for(&self, slot: &TimeSlot) -> bool {
        self.availability.iter().any(|w| w.covers(slot))
    }

    pub fn is_qualified_for(&self, type_code: &str) -> bool {
        self.qualifications.contains(type_code)
    }
}

/// An equipment unit, optionally bound to a single room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub available: bool,
    #[serde(default)]
    pub maintenance_windows: Vec<TimeSlot>,
    /// How many concurrent assignments may use this unit.
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: u32,
    /// If set, the unit can only be used inside this room.
    #[serde(default)]
    pub room_binding: Option<RoomId>,
}

fn default_concurrency_cap() -> u32 {
    1
}

impl Equipment {
    pub fn in_maintenance_during(&self, slot: &TimeSlot) -> bool {
        self.maintenance_windows.iter().any(|w| w.overlaps(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn room() -> OperatingRoom {
        OperatingRoom {
            id: RoomId::new(1),
            name: "OR-1".to_string(),
            open_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            status: RoomStatus::Active,
            primary_service: None,
            maintenance_windows: vec![],
        }
    }

    #[test]
    fn test_room_window() {
        let w = room().window(date());
        assert_eq!(w.duration_minutes(), 9 * 60);
        assert_eq!(w.start, date().and_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn test_staff_availability_covers_whole_slot() {
        let staff = Staff {
            id: StaffId::new(1),
            name: "Nurse A".to_string(),
            role: "scrub_nurse".to_string(),
            qualifications: BTreeSet::new(),
            availability: vec![TimeSlot::new(
                date().and_hms_opt(8, 0, 0).unwrap(),
                date().and_hms_opt(12, 0, 0).unwrap(),
            )],
            daily_cap_minutes: 480,
        };
        let inside = TimeSlot::new(
            date().and_hms_opt(9, 0, 0).unwrap(),
            date().and_hms_opt(10, 0, 0).unwrap(),
        );
        let straddling = TimeSlot::new(
            date().and_hms_opt(11, 0, 0).unwrap(),
            date().and_hms_opt(13, 0, 0).unwrap(),
        );
        assert!(staff.is_available_for(&inside));
        assert!(!staff.is_available_for(&straddling));
    }

    #[test]
    fn test_equipment_maintenance_overlap() {
        let eq = Equipment {
            id: EquipmentId::new(1),
            name: "C-arm".to_string(),
            available: true,
            maintenance_windows: vec![TimeSlot::new(
                date().and_hms_opt(10, 0, 0).unwrap(),
                date().and_hms_opt(11, 0, 0).unwrap(),
            )],
            concurrency_cap: 1,
            room_binding: None,
        };
        let clash = TimeSlot::new(
            date().and_hms_opt(10, 30, 0).unwrap(),
            date().and_hms_opt(12, 0, 0).unwrap(),
        );
        assert!(eq.in_maintenance_during(&clash));
    }
}
