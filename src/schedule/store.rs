//! Read-only projection over every subject's `teacherAssignments`.
//!
//! Nothing here is cached across calls: a view borrows the subject snapshot
//! it was built from, so each check sees whatever was committed before it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::model::{AssignmentRecord, Schedule, Section, SectionKey, Subject, UnreadableRecord};

/// One flattened `(subject, section, record)` triple.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentEntry<'a> {
    pub subject: &'a Subject,
    pub section_id: &'a str,
    pub record: &'a AssignmentRecord,
}

impl<'a> AssignmentEntry<'a> {
    pub fn key(&self) -> SectionKey {
        SectionKey::new(self.subject.id.as_str(), self.section_id)
    }

    /// A scheduled current-shape record, as a booking.
    pub fn booking(&self) -> Option<Booking<'a>> {
        let teacher_id = self.record.teacher_id()?;
        let schedule = self.record.schedule()?;
        Some(Booking {
            subject_id: self.subject.id.as_str(),
            subject_name: self.subject.name.as_str(),
            section_id: self.section_id,
            teacher_id,
            schedule,
        })
    }
}

/// A scheduled slot somebody already holds.
#[derive(Debug, Clone, Copy)]
pub struct Booking<'a> {
    pub subject_id: &'a str,
    pub subject_name: &'a str,
    pub section_id: &'a str,
    pub teacher_id: &'a str,
    pub schedule: &'a Schedule,
}

impl Booking<'_> {
    pub fn is(&self, key: &SectionKey) -> bool {
        key.matches(self.subject_id, self.section_id)
    }
}

/// Flattens every subject's assignment map. Restartable: calling it again on
/// the same slice yields the same sequence.
pub fn iterate_assignments(subjects: &[Subject]) -> impl Iterator<Item = AssignmentEntry<'_>> {
    subjects.iter().flat_map(|subject| {
        subject
            .teacher_assignments
            .iter()
            .map(move |(section_id, record)| AssignmentEntry {
                subject,
                section_id: section_id.as_str(),
                record,
            })
    })
}

/// Sections each subject currently has assigned to `teacher_id`, covering
/// both legacy lists and current-shape records. Subjects with no match are
/// left out.
pub fn sections_assigned_to_teacher(
    subjects: &[Subject],
    teacher_id: &str,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for entry in iterate_assignments(subjects) {
        if entry.record.names_teacher(teacher_id) {
            out.entry(entry.subject.id.clone())
                .or_default()
                .insert(entry.section_id.to_string());
        }
    }
    out
}

/// Subjects plus the known section ids, for scans that must skip stale
/// references.
#[derive(Debug, Clone)]
pub struct StoreView<'a> {
    subjects: &'a [Subject],
    section_names: Option<HashMap<&'a str, &'a str>>,
}

impl<'a> StoreView<'a> {
    /// A view that trusts every section id it finds.
    pub fn new(subjects: &'a [Subject]) -> Self {
        Self {
            subjects,
            section_names: None,
        }
    }

    /// A view that skips records pointing at sections not in `sections`.
    pub fn with_sections(subjects: &'a [Subject], sections: &'a [Section]) -> Self {
        Self {
            subjects,
            section_names: Some(
                sections
                    .iter()
                    .map(|s| (s.id.as_str(), s.name.as_str()))
                    .collect(),
            ),
        }
    }

    pub fn subjects(&self) -> &'a [Subject] {
        self.subjects
    }

    pub fn section_exists(&self, section_id: &str) -> bool {
        self.section_names
            .as_ref()
            .map(|m| m.contains_key(section_id))
            .unwrap_or(true)
    }

    /// Display name for a section, falling back to its id.
    pub fn section_label<'s>(&'s self, section_id: &'s str) -> &'s str {
        self.section_names
            .as_ref()
            .and_then(|m| m.get(section_id).copied())
            .unwrap_or(section_id)
    }

    /// Assignment entries whose section still exists.
    pub fn entries(&self) -> impl Iterator<Item = AssignmentEntry<'a>> + '_ {
        iterate_assignments(self.subjects).filter(move |e| self.section_exists(e.section_id))
    }

    /// Scheduled bookings whose section still exists.
    pub fn bookings(&self) -> impl Iterator<Item = Booking<'a>> + '_ {
        self.entries().filter_map(|e| e.booking())
    }

    /// Records the loader could not decode, whose section still exists.
    pub fn unreadable(&self) -> impl Iterator<Item = (SectionKey, &'a UnreadableRecord)> + '_ {
        self.entries()
            .filter_map(|e| e.record.unreadable().map(|u| (e.key(), u)))
    }
}

/// Ephemeral lookup of bookings by teacher and by room.
///
/// Built once per reconciliation pass and kept current through `upsert` and
/// `remove`, so each check costs only the bookings of the teacher and room
/// involved.
#[derive(Debug, Clone, Default)]
pub struct BookingIndex {
    bookings: HashMap<SectionKey, OwnedBooking>,
    by_teacher: HashMap<String, HashSet<SectionKey>>,
    by_room: HashMap<String, HashSet<SectionKey>>,
    unreadable: BTreeMap<SectionKey, UnreadableRecord>,
}

#[derive(Debug, Clone)]
pub struct OwnedBooking {
    pub key: SectionKey,
    pub subject_name: String,
    pub teacher_id: String,
    pub schedule: Schedule,
}

impl OwnedBooking {
    pub fn as_booking(&self) -> Booking<'_> {
        Booking {
            subject_id: &self.key.subject_id,
            subject_name: &self.subject_name,
            section_id: &self.key.section_id,
            teacher_id: &self.teacher_id,
            schedule: &self.schedule,
        }
    }
}

impl BookingIndex {
    pub fn build(view: &StoreView<'_>) -> Self {
        let mut index = Self::default();
        for b in view.bookings() {
            index.insert(OwnedBooking {
                key: SectionKey::new(b.subject_id, b.section_id),
                subject_name: b.subject_name.to_string(),
                teacher_id: b.teacher_id.to_string(),
                schedule: b.schedule.clone(),
            });
        }
        for (key, record) in view.unreadable() {
            index.unreadable.insert(key, record.clone());
        }
        index
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    fn insert(&mut self, booking: OwnedBooking) {
        self.by_teacher
            .entry(booking.teacher_id.clone())
            .or_default()
            .insert(booking.key.clone());
        if !booking.schedule.room.is_empty() {
            self.by_room
                .entry(booking.schedule.room.clone())
                .or_default()
                .insert(booking.key.clone());
        }
        self.bookings.insert(booking.key.clone(), booking);
    }

    /// Mirrors a write to `key`: drops whatever was indexed there and indexes
    /// the new record if it is scheduled.
    pub fn upsert(&mut self, key: &SectionKey, subject_name: &str, record: &AssignmentRecord) {
        self.remove(key);
        if let Some(u) = record.unreadable() {
            self.unreadable.insert(key.clone(), u.clone());
            return;
        }
        if let (Some(teacher_id), Some(schedule)) = (record.teacher_id(), record.schedule()) {
            self.insert(OwnedBooking {
                key: key.clone(),
                subject_name: subject_name.to_string(),
                teacher_id: teacher_id.to_string(),
                schedule: schedule.clone(),
            });
        }
    }

    pub fn remove(&mut self, key: &SectionKey) {
        self.unreadable.remove(key);
        let Some(old) = self.bookings.remove(key) else {
            return;
        };
        if let Some(set) = self.by_teacher.get_mut(&old.teacher_id) {
            set.remove(key);
            if set.is_empty() {
                self.by_teacher.remove(&old.teacher_id);
            }
        }
        if let Some(set) = self.by_room.get_mut(&old.schedule.room) {
            set.remove(key);
            if set.is_empty() {
                self.by_room.remove(&old.schedule.room);
            }
        }
    }

    /// Undecodable records still in the store, in key order.
    pub fn unreadable(&self) -> impl Iterator<Item = (SectionKey, &UnreadableRecord)> + '_ {
        self.unreadable.iter().map(|(k, u)| (k.clone(), u))
    }

    /// Bookings held by a teacher, in key order.
    pub fn for_teacher(&self, teacher_id: &str) -> Vec<Booking<'_>> {
        self.collect(self.by_teacher.get(teacher_id))
    }

    /// Bookings in a room, in key order.
    pub fn for_room(&self, room: &str) -> Vec<Booking<'_>> {
        self.collect(self.by_room.get(room))
    }

    fn collect(&self, keys: Option<&HashSet<SectionKey>>) -> Vec<Booking<'_>> {
        let Some(keys) = keys else {
            return Vec::new();
        };
        let mut keys: Vec<&SectionKey> = keys.iter().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|k| self.bookings.get(k))
            .map(OwnedBooking::as_booking)
            .collect()
    }
}
