//! Surgery and surgery-type records.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ids::{EquipmentId, StaffId, SurgeryId, SurgeryTypeId};

/// Clinical urgency classification.
///
/// Variants are declared in ascending order so the derived `Ord` gives
/// `Immediate > Urgent > SemiUrgent > Scheduled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Scheduled,
    SemiUrgent,
    Urgent,
    Immediate,
}

impl Urgency {
    /// Weight applied to waiting-time penalties in the objective.
    pub fn weight(&self) -> f64 {
        match self {
            Urgency::Immediate => 8.0,
            Urgency::Urgent => 4.0,
            Urgency::SemiUrgent => 2.0,
            Urgency::Scheduled => 1.0,
        }
    }

    /// Default maximum acceptable wait, in minutes.
    pub fn default_max_wait_minutes(&self) -> i64 {
        match self {
            Urgency::Immediate => 15,
            Urgency::Urgent => 60,
            Urgency::SemiUrgent => 240,
            Urgency::Scheduled => 1440,
        }
    }
}

/// Surgery lifecycle status. Surgeries are never destroyed; cancellation is
/// a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurgeryStatus {
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

/// Catalog entry describing a kind of procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurgeryType {
    pub id: SurgeryTypeId,
    /// Short code, e.g. "APPEN". Also the tag surgeon qualifications use.
    pub code: String,
    pub name: String,
    /// Service line the type belongs to, matched against a room's primary
    /// service tag when deciding whether a room is a backup choice.
    #[serde(default)]
    pub service: Option<String>,
}

/// A surgery awaiting (or holding) a slot on the schedule.
///
/// Created by external intake; the engine only ever mutates status and
/// arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surgery {
    pub id: SurgeryId,
    pub surgery_type: SurgeryTypeId,
    /// Estimated duration in minutes; strictly positive.
    pub duration_minutes: i64,
    pub urgency: Urgency,
    /// Numeric priority within an urgency class; larger is more important.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub surgeon: Option<StaffId>,
    #[serde(default)]
    pub equipment: BTreeSet<EquipmentId>,
    /// Role tags that must each be covered by an available staff member.
    #[serde(default)]
    pub staff_roles: BTreeSet<String>,
    pub status: SurgeryStatus,
    /// Set for emergencies: when the patient arrived.
    #[serde(default)]
    pub arrival: Option<NaiveDateTime>,
    #[serde(default)]
    pub max_wait_minutes: Option<i64>,
}
