//! Teacher and room double-booking detection.
//!
//! A proposal conflicts with an existing booking when they share at least one
//! weekday and their time ranges overlap (half-open). Teacher conflicts need
//! the same teacher; room conflicts need the exact same room string, whoever
//! teaches there. The booking being edited is always excluded.
//!
//! A stored record that could not be decoded fails the scan with its error,
//! but only when the scan would have compared against it.

use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use super::error::SchedulingError;
use super::model::{Day, DaySet, DeliveryMode, Schedule, SectionKey, UnreadableRecord};
use super::store::{Booking, BookingIndex, StoreView};
use super::time::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    Teacher,
    Room,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub message: String,
    pub conflicting_subject_id: String,
    pub conflicting_section_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_teacher_id: Option<String>,
    pub day: Day,
    /// The time range the other booking occupies.
    pub window: TimeRange,
}

impl Conflict {
    pub fn conflicting_key(&self) -> SectionKey {
        SectionKey::new(
            self.conflicting_subject_id.as_str(),
            self.conflicting_section_id.as_str(),
        )
    }
}

/// How many conflicts a scan reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Stop at the first teacher conflict and the first room conflict.
    #[default]
    FirstPerKind,
    /// Report every conflicting booking.
    Exhaustive,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "firstPerKind" => Ok(ConflictPolicy::FirstPerKind),
            "exhaustive" => Ok(ConflictPolicy::Exhaustive),
            other => Err(format!("unknown conflict policy: {}", other)),
        }
    }
}

/// A booking someone wants to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub teacher_id: String,
    pub room: String,
    pub days: DaySet,
    pub range: TimeRange,
    pub delivery_mode: DeliveryMode,
}

impl Proposal {
    pub fn from_schedule(teacher_id: impl Into<String>, schedule: &Schedule) -> Self {
        Self {
            teacher_id: teacher_id.into(),
            room: schedule.room.clone(),
            days: schedule.day_of_week,
            range: schedule.range(),
            delivery_mode: schedule.delivery_mode,
        }
    }

    /// The same proposal restricted to one day.
    pub fn on_day(&self, day: Day) -> Self {
        Self {
            days: DaySet::single(day),
            ..self.clone()
        }
    }

    fn books_room(&self) -> bool {
        self.delivery_mode != DeliveryMode::Online && !self.room.is_empty()
    }

    /// First shared day on which the two bookings overlap in time.
    fn clash_day(&self, other: &Schedule) -> Option<Day> {
        let shared = self.days.intersection(other.day_of_week);
        if shared.is_empty() || !self.range.overlaps(&other.range()) {
            return None;
        }
        shared.first()
    }
}

/// Scans the whole store. At most one conflict per kind.
pub fn detect_conflicts(
    proposal: &Proposal,
    exclude: &SectionKey,
    view: &StoreView<'_>,
) -> Result<Vec<Conflict>, SchedulingError> {
    detect_conflicts_with(proposal, exclude, view, ConflictPolicy::FirstPerKind)
}

pub fn detect_conflicts_with(
    proposal: &Proposal,
    exclude: &SectionKey,
    view: &StoreView<'_>,
    policy: ConflictPolicy,
) -> Result<Vec<Conflict>, SchedulingError> {
    reject_unreadable(proposal, exclude, view.unreadable())?;
    Ok(scan(
        proposal,
        exclude,
        view.bookings(),
        view.bookings(),
        |id| view.section_label(id).to_string(),
        policy,
    ))
}

/// Same contract as `detect_conflicts_with`, reading candidates from an index
/// instead of rescanning every subject.
pub fn detect_in_index(
    proposal: &Proposal,
    exclude: &SectionKey,
    index: &BookingIndex,
    section_label: impl Fn(&str) -> String,
    policy: ConflictPolicy,
) -> Result<Vec<Conflict>, SchedulingError> {
    reject_unreadable(proposal, exclude, index.unreadable())?;
    let room_candidates = if proposal.books_room() {
        index.for_room(&proposal.room)
    } else {
        Vec::new()
    };
    Ok(scan(
        proposal,
        exclude,
        index.for_teacher(&proposal.teacher_id).into_iter(),
        room_candidates.into_iter(),
        section_label,
        policy,
    ))
}

/// Runs one scan per proposed day and unions the results, dropping repeats of
/// the same kind against the same booking.
pub fn detect_conflicts_by_day(
    proposal: &Proposal,
    exclude: &SectionKey,
    view: &StoreView<'_>,
    policy: ConflictPolicy,
) -> Result<Vec<Conflict>, SchedulingError> {
    let mut seen: HashSet<(ConflictKind, SectionKey)> = HashSet::new();
    let mut out = Vec::new();
    for day in proposal.days.iter() {
        for c in detect_conflicts_with(&proposal.on_day(day), exclude, view, policy)? {
            if seen.insert((c.kind, c.conflicting_key())) {
                out.push(c);
            }
        }
    }
    Ok(out)
}

/// Fails with the record's own error when an undecodable record shares the
/// proposal's teacher or room, since its times cannot be compared.
fn reject_unreadable<'u>(
    proposal: &Proposal,
    exclude: &SectionKey,
    candidates: impl Iterator<Item = (SectionKey, &'u UnreadableRecord)>,
) -> Result<(), SchedulingError> {
    for (key, record) in candidates {
        if &key == exclude {
            continue;
        }
        let same_teacher = record.teacher_id() == Some(proposal.teacher_id.as_str());
        let same_room = proposal.books_room() && record.room() == Some(proposal.room.as_str());
        if same_teacher || same_room {
            debug!(subject = %key.subject_id, section = %key.section_id, "unreadable record blocks check");
            return Err(record.error(&key));
        }
    }
    Ok(())
}

fn scan<'b>(
    proposal: &Proposal,
    exclude: &SectionKey,
    teacher_candidates: impl Iterator<Item = Booking<'b>>,
    room_candidates: impl Iterator<Item = Booking<'b>>,
    section_label: impl Fn(&str) -> String,
    policy: ConflictPolicy,
) -> Vec<Conflict> {
    let mut out = Vec::new();

    for b in teacher_candidates {
        if b.is(exclude) || b.teacher_id != proposal.teacher_id {
            continue;
        }
        let Some(day) = proposal.clash_day(b.schedule) else {
            continue;
        };
        let section = section_label(b.section_id);
        debug!(
            teacher = %proposal.teacher_id,
            subject = b.subject_id,
            section = b.section_id,
            %day,
            "teacher conflict"
        );
        out.push(Conflict {
            kind: ConflictKind::Teacher,
            message: format!(
                "Teacher {} is already scheduled for {} ({}) on {}, {}",
                proposal.teacher_id,
                b.subject_name,
                section,
                day,
                b.schedule.range()
            ),
            conflicting_subject_id: b.subject_id.to_string(),
            conflicting_section_id: b.section_id.to_string(),
            conflicting_teacher_id: Some(b.teacher_id.to_string()),
            day,
            window: b.schedule.range(),
        });
        if policy == ConflictPolicy::FirstPerKind {
            break;
        }
    }

    if !proposal.books_room() {
        return out;
    }

    for b in room_candidates {
        if b.is(exclude) || b.schedule.room != proposal.room {
            continue;
        }
        let Some(day) = proposal.clash_day(b.schedule) else {
            continue;
        };
        let section = section_label(b.section_id);
        debug!(
            room = %proposal.room,
            subject = b.subject_id,
            section = b.section_id,
            holder = b.teacher_id,
            %day,
            "room conflict"
        );
        out.push(Conflict {
            kind: ConflictKind::Room,
            message: format!(
                "Room {} is already booked for {} ({}) with teacher {} on {}, {}",
                proposal.room,
                b.subject_name,
                section,
                b.teacher_id,
                day,
                b.schedule.range()
            ),
            conflicting_subject_id: b.subject_id.to_string(),
            conflicting_section_id: b.section_id.to_string(),
            conflicting_teacher_id: Some(b.teacher_id.to_string()),
            day,
            window: b.schedule.range(),
        });
        if policy == ConflictPolicy::FirstPerKind {
            break;
        }
    }

    out
}
