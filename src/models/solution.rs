//! Assignments and schedule solutions.
//!
//! A [`Solution`] is a value: neighborhood moves in the optimizer produce new
//! solutions rather than mutating a shared one in place. Internally each room
//! holds its assignments sorted by setup start, and the pending set holds the
//! surgeries that could not be placed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ids::{RoomId, SurgeryId};
use super::time::TimeSlot;

/// One surgery placed in one room at a specific time with a computed setup.
///
/// Invariants (enforced by the schedule utilities that produce assignments):
/// `setup_start + setup_minutes = operation_start`,
/// `operation_start + duration = end`, and the setup slot follows the
/// previous assignment's end in the same room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub surgery_id: SurgeryId,
    pub room_id: RoomId,
    pub setup_start: NaiveDateTime,
    pub operation_start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub setup_minutes: i64,
}

impl Assignment {
    /// The full room occupation `[setup_start, end)`.
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.setup_start, self.end)
    }

    /// The operative interval `[operation_start, end)`, the window that
    /// binds the surgeon and staff.
    pub fn operation_slot(&self) -> TimeSlot {
        TimeSlot::new(self.operation_start, self.end)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.operation_start).num_minutes()
    }
}

/// A complete candidate schedule: per-room assignment sequences plus the
/// pending set of unplaced surgeries. Not a wire type; the facade flattens
/// it into assignment DTOs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    rooms: BTreeMap<RoomId, Vec<Assignment>>,
    pending: BTreeSet<SurgeryId>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of placed assignments across all rooms.
    pub fn assignment_count(&self) -> usize {
        self.rooms.values().map(Vec::len).sum()
    }

    pub fn pending(&self) -> &BTreeSet<SurgeryId> {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn mark_pending(&mut self, surgery: SurgeryId) {
        self.pending.insert(surgery);
    }

    /// Room ids that currently hold at least one assignment.
    pub fn occupied_rooms(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.rooms.keys().copied()
    }

    /// The assignment sequence of a room, sorted by setup start.
    pub fn room_sequence(&self, room: RoomId) -> &[Assignment] {
        self.rooms.get(&room).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All assignments in deterministic (room id, setup start) order.
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.rooms.values().flatten()
    }

    /// Locate a surgery's assignment, if placed.
    pub fn find(&self, surgery: SurgeryId) -> Option<&Assignment> {
        self.assignments().find(|a| a.surgery_id == surgery)
    }

    /// Insert an assignment keeping the room sequence sorted; removes the
    /// surgery from pending if it was there.
    pub fn insert(&mut self, assignment: Assignment) {
        self.pending.remove(&assignment.surgery_id);
        let seq = self.rooms.entry(assignment.room_id).or_default();
        let pos = seq
            .binary_search_by(|probe| {
                probe
                    .setup_start
                    .cmp(&assignment.setup_start)
                    .then(probe.surgery_id.cmp(&assignment.surgery_id))
            })
            .unwrap_or_else(|p| p);
        seq.insert(pos, assignment);
    }

    /// Remove a surgery's assignment. The surgery is NOT automatically added
    /// to pending; callers decide.
    pub fn remove(&mut self, surgery: SurgeryId) -> Option<Assignment> {
        for (_, seq) in self.rooms.iter_mut() {
            if let Some(pos) = seq.iter().position(|a| a.surgery_id == surgery) {
                return Some(seq.remove(pos));
            }
        }
        None
    }

    /// Replace a room's whole sequence (after `recompute_room`). The new
    /// sequence must already be sorted by setup start.
    pub fn replace_room_sequence(&mut self, room: RoomId, sequence: Vec<Assignment>) {
        if sequence.is_empty() {
            self.rooms.remove(&room);
        } else {
            self.rooms.insert(room, sequence);
        }
    }

    /// Earliest setup start across all assignments.
    pub fn earliest_start(&self) -> Option<NaiveDateTime> {
        self.assignments().map(|a| a.setup_start).min()
    }

    /// Latest end across all assignments.
    pub fn latest_end(&self) -> Option<NaiveDateTime> {
        self.assignments().map(|a| a.end).max()
    }
}
