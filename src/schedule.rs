use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::models::{DayOfWeek, ScheduleSlot, SessionType, SlotCandidate};

fn overlaps(candidate: &SlotCandidate, slot: &ScheduleSlot) -> bool {
    candidate.start < slot.end && slot.start < candidate.end
}

/// Existing slots that share the candidate's room and day and whose half-open
/// interval intersects it. `exclude` skips the slot being updated.
///
/// Only the room is checked; the same course, professor or student may still be
/// booked twice in different rooms.
pub fn find_conflicts<'a>(
    candidate: &SlotCandidate,
    existing: &'a [ScheduleSlot],
    exclude: Option<Uuid>,
) -> Vec<&'a ScheduleSlot> {
    existing
        .iter()
        .filter(|slot| Some(slot.id) != exclude)
        .filter(|slot| slot.room == candidate.room && slot.day == candidate.day)
        .filter(|slot| overlaps(candidate, slot))
        .collect()
}

pub fn has_conflict(candidate: &SlotCandidate, existing: &[ScheduleSlot], exclude: Option<Uuid>) -> bool {
    !find_conflicts(candidate, existing, exclude).is_empty()
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOverview {
    pub total: usize,
    pub by_day: Vec<(DayOfWeek, usize)>,
    pub by_session_type: Vec<(SessionType, usize)>,
    pub by_room: Vec<(String, usize)>,
}

pub fn summarize_slots(slots: &[ScheduleSlot]) -> ScheduleOverview {
    let mut by_day: BTreeMap<DayOfWeek, usize> = BTreeMap::new();
    let mut by_session_type: BTreeMap<SessionType, usize> = BTreeMap::new();
    let mut by_room: HashMap<&str, usize> = HashMap::new();

    for slot in slots {
        *by_day.entry(slot.day).or_insert(0) += 1;
        *by_session_type.entry(slot.session_type).or_insert(0) += 1;
        *by_room.entry(slot.room.as_str()).or_insert(0) += 1;
    }

    let mut rooms: Vec<(String, usize)> = by_room
        .into_iter()
        .map(|(room, count)| (room.to_string(), count))
        .collect();
    rooms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ScheduleOverview {
        total: slots.len(),
        by_day: by_day.into_iter().collect(),
        by_session_type: by_session_type.into_iter().collect(),
        by_room: rooms,
    }
}
