//! In-memory repository implementation.
//!
//! Backs unit tests and local development with fast, deterministic,
//! isolated storage. Data lives in hash maps behind a read-write lock; the
//! version token gives the same optimistic-concurrency semantics a real
//! store provides.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::repository::{
    DateRange, ErrorContext, RepositoryError, RepositoryResult, ScheduleChangeSet,
    ScheduleVersion, SchedulingRepository,
};
use crate::constraints::Rule;
use crate::models::{
    Assignment, Equipment, EquipmentId, OperatingRoom, RoomId, SetupTimeMatrix, Staff, StaffId,
    Surgery, SurgeryId, SurgeryStatus, SurgeryType, SurgeryTypeId,
};

#[derive(Default)]
struct LocalData {
    surgeries: HashMap<SurgeryId, Surgery>,
    surgery_types: HashMap<SurgeryTypeId, SurgeryType>,
    rooms: HashMap<RoomId, OperatingRoom>,
    staff: HashMap<StaffId, Staff>,
    equipment: HashMap<EquipmentId, Equipment>,
    sdst: SetupTimeMatrix,
    rules: Vec<Rule>,
    /// Committed assignments per date.
    assignments: HashMap<chrono::NaiveDate, Vec<Assignment>>,
    version: ScheduleVersion,
    healthy: bool,
}

/// In-memory [`SchedulingRepository`].
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData {
                version: ScheduleVersion::initial(),
                healthy: true,
                ..Default::default()
            })),
        }
    }

    // Seed helpers for tests and local development.

    pub fn insert_surgery(&self, surgery: Surgery) {
        self.data.write().surgeries.insert(surgery.id, surgery);
    }

    pub fn insert_surgery_type(&self, surgery_type: SurgeryType) {
        self.data
            .write()
            .surgery_types
            .insert(surgery_type.id, surgery_type);
    }

    pub fn insert_room(&self, room: OperatingRoom) {
        self.data.write().rooms.insert(room.id, room);
    }

    pub fn insert_staff(&self, staff: Staff) {
        self.data.write().staff.insert(staff.id, staff);
    }

    pub fn insert_equipment(&self, equipment: Equipment) {
        self.data.write().equipment.insert(equipment.id, equipment);
    }

    pub fn set_sdst(&self, sdst: SetupTimeMatrix) {
        self.data.write().sdst = sdst;
    }

    pub fn add_rule(&self, rule: Rule) {
        self.data.write().rules.push(rule);
    }

    /// Flip the health probe for failure-path tests.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().healthy = healthy;
    }

    /// Direct read of a surgery's current status.
    pub fn surgery_status(&self, id: SurgeryId) -> Option<SurgeryStatus> {
        self.data.read().surgeries.get(&id).map(|s| s.status)
    }

    /// Committed assignments for one date.
    pub fn assignments_on(&self, date: chrono::NaiveDate) -> Vec<Assignment> {
        self.data
            .read()
            .assignments
            .get(&date)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulingRepository for LocalRepository {
    async fn list_pending_surgeries(&self, _range: DateRange) -> RepositoryResult<Vec<Surgery>> {
        let data = self.data.read();
        let mut pending: Vec<Surgery> = data
            .surgeries
            .values()
            .filter(|s| s.status == SurgeryStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.id);
        Ok(pending)
    }

    async fn load_surgeries(&self, ids: Vec<SurgeryId>) -> RepositoryResult<Vec<Surgery>> {
        let data = self.data.read();
        let mut found: Vec<Surgery> = ids
            .into_iter()
            .filter_map(|id| data.surgeries.get(&id).cloned())
            .collect();
        found.sort_by_key(|s| s.id);
        found.dedup_by_key(|s| s.id);
        Ok(found)
    }

    async fn list_rooms_with_schedules(
        &self,
        range: DateRange,
    ) -> RepositoryResult<Vec<(OperatingRoom, Vec<Assignment>)>> {
        let data = self.data.read();
        let mut rooms: Vec<OperatingRoom> = data.rooms.values().cloned().collect();
        rooms.sort_by_key(|r| r.id);

        let result = rooms
            .into_iter()
            .map(|room| {
                let mut assignments: Vec<Assignment> = data
                    .assignments
                    .iter()
                    .filter(|(date, _)| range.contains(**date))
                    .flat_map(|(_, list)| list.iter())
                    .filter(|a| a.room_id == room.id)
                    .cloned()
                    .collect();
                assignments.sort_by_key(|a| a.setup_start);
                (room, assignments)
            })
            .collect();
        Ok(result)
    }

    async fn load_sdst_snapshot(&self) -> RepositoryResult<SetupTimeMatrix> {
        Ok(self.data.read().sdst.clone())
    }

    async fn load_rule_set(&self) -> RepositoryResult<Vec<Rule>> {
        Ok(self.data.read().rules.clone())
    }

    async fn load_staff_and_equipment(&self) -> RepositoryResult<(Vec<Staff>, Vec<Equipment>)> {
        let data = self.data.read();
        let mut staff: Vec<Staff> = data.staff.values().cloned().collect();
        staff.sort_by_key(|s| s.id);
        let mut equipment: Vec<Equipment> = data.equipment.values().cloned().collect();
        equipment.sort_by_key(|e| e.id);
        Ok((staff, equipment))
    }

    async fn load_surgery_types(&self) -> RepositoryResult<Vec<SurgeryType>> {
        let data = self.data.read();
        let mut types: Vec<SurgeryType> = data.surgery_types.values().cloned().collect();
        types.sort_by_key(|t| t.id);
        Ok(types)
    }

    async fn current_version(&self) -> RepositoryResult<ScheduleVersion> {
        Ok(self.data.read().version)
    }

    async fn persist_assignments(
        &self,
        changes: ScheduleChangeSet,
        version: ScheduleVersion,
    ) -> RepositoryResult<ScheduleVersion> {
        let mut data = self.data.write();
        if data.version != version {
            return Err(RepositoryError::Conflict {
                expected: version,
                actual: data.version,
            });
        }

        for assignment in &changes.assignments {
            if !data.surgeries.contains_key(&assignment.surgery_id) {
                return Err(RepositoryError::ValidationError {
                    message: format!("unknown surgery {}", assignment.surgery_id),
                    context: ErrorContext::new("persist_assignments")
                        .with_entity("assignment")
                        .with_entity_id(assignment.surgery_id),
                });
            }
        }

        for assignment in &changes.assignments {
            if let Some(surgery) = data.surgeries.get_mut(&assignment.surgery_id) {
                surgery.status = SurgeryStatus::Scheduled;
            }
        }
        for surgery_id in &changes.pending {
            if let Some(surgery) = data.surgeries.get_mut(surgery_id) {
                surgery.status = SurgeryStatus::Pending;
            }
        }

        data.assignments.insert(changes.date, changes.assignments);
        data.version = data.version.next();
        Ok(data.version)
    }

    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().healthy)
    }
}
