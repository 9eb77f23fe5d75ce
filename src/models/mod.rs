//! Domain model: entities, value objects, and the per-run snapshot.

pub mod ids;
pub mod resources;
pub mod sdst;
pub mod snapshot;
pub mod solution;
pub mod surgery;
pub mod time;

pub use ids::{EquipmentId, RoomId, StaffId, SurgeryId, SurgeryTypeId};
pub use resources::{Equipment, OperatingRoom, RoomStatus, Staff};
pub use sdst::{SetupMatrixError, SetupTimeEntry, SetupTimeMatrix};
pub use snapshot::{PlanningSnapshot, SnapshotBuilder, SnapshotError};
pub use solution::{Assignment, Solution};
pub use surgery::{Surgery, SurgeryStatus, SurgeryType, Urgency};
pub use time::{minutes_between, TimeSlot};
