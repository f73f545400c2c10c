use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::SchedulingError;
use super::time::{ClockTime, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }

    #[inline]
    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl FromStr for Day {
    type Err = String;

    /// Accepts full names and three-letter abbreviations in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        let day = match t.as_str() {
            "monday" | "mon" => Day::Monday,
            "tuesday" | "tue" => Day::Tuesday,
            "wednesday" | "wed" => Day::Wednesday,
            "thursday" | "thu" => Day::Thursday,
            "friday" | "fri" => Day::Friday,
            "saturday" | "sat" => Day::Saturday,
            "sunday" | "sun" => Day::Sunday,
            _ => return Err(format!("unknown day: {}", s.trim())),
        };
        Ok(day)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Day {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Set of weekdays packed into the low seven bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);

    pub fn single(day: Day) -> Self {
        DaySet(day.bit())
    }

    pub fn insert(&mut self, day: Day) {
        self.0 |= day.bit();
    }

    pub fn contains(self, day: Day) -> bool {
        self.0 & day.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn intersection(self, other: DaySet) -> DaySet {
        DaySet(self.0 & other.0)
    }

    /// Days in Monday-first order.
    pub fn iter(self) -> impl Iterator<Item = Day> {
        Day::ALL.into_iter().filter(move |d| self.contains(*d))
    }

    pub fn first(self) -> Option<Day> {
        self.iter().next()
    }
}

impl FromIterator<Day> for DaySet {
    fn from_iter<I: IntoIterator<Item = Day>>(iter: I) -> Self {
        let mut set = DaySet::EMPTY;
        for d in iter {
            set.insert(d);
        }
        set
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Day::name).collect();
        f.write_str(&names.join(", "))
    }
}

impl Serialize for DaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for DaySet {
    /// Reads a list of day names; a bare string is read as a one-day set.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DaySetVisitor;

        impl<'de> Visitor<'de> for DaySetVisitor {
            type Value = DaySet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a day name or a list of day names")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<DaySet, E> {
                v.parse::<Day>().map(DaySet::single).map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DaySet, A::Error> {
                let mut set = DaySet::EMPTY;
                while let Some(day) = seq.next_element::<Day>()? {
                    set.insert(day);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_any(DaySetVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    #[default]
    #[serde(rename = "faceToFace", alias = "FaceToFace", alias = "Face-to-Face")]
    FaceToFace,
    #[serde(rename = "modular", alias = "Modular")]
    Modular,
    #[serde(rename = "hybrid", alias = "Hybrid")]
    Hybrid,
    #[serde(rename = "online", alias = "Online")]
    Online,
}

impl DeliveryMode {
    pub fn requires_room(self) -> bool {
        self != DeliveryMode::Online
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match t.as_str() {
            "facetoface" | "f2f" => Ok(DeliveryMode::FaceToFace),
            "modular" => Ok(DeliveryMode::Modular),
            "hybrid" => Ok(DeliveryMode::Hybrid),
            "online" => Ok(DeliveryMode::Online),
            _ => Err(format!("unknown delivery mode: {}", s.trim())),
        }
    }
}

/// Weekly recurring slot attached to an assignment.
///
/// Built through `validate::validate_schedule`, which enforces a non-empty
/// day set, `start < end`, and `room` empty exactly when the mode is online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub day_of_week: DaySet,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
}

impl Schedule {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Current-shape record: one teacher, optionally scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledAssignment {
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

/// A stored record that could not be decoded, most often because its
/// schedule carries a clock string that does not parse.
///
/// The original JSON is kept and written back untouched. Only checks and
/// mutations that reach this record fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableRecord {
    raw: String,
    teacher_id: Option<String>,
    room: Option<String>,
    bad_time: Option<String>,
    reason: String,
}

impl UnreadableRecord {
    /// Quarantines `raw`, keeping what can still be read from it.
    pub fn quarantine(raw: &JsonValue, bad_time: Option<String>, reason: impl Into<String>) -> Self {
        let field = |v: Option<&JsonValue>| v.and_then(|v| v.as_str()).map(str::to_string);
        Self {
            raw: raw.to_string(),
            teacher_id: field(raw.get("teacherId")),
            room: field(raw.get("schedule").and_then(|s| s.get("room"))).filter(|r| !r.is_empty()),
            bad_time,
            reason: reason.into(),
        }
    }

    pub fn teacher_id(&self) -> Option<&str> {
        self.teacher_id.as_deref()
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// The error raised when a check or mutation reaches this record.
    pub fn error(&self, key: &SectionKey) -> SchedulingError {
        match &self.bad_time {
            Some(input) => SchedulingError::InvalidTimeFormat {
                input: input.clone(),
            },
            None => SchedulingError::UnreadableRecord {
                key: key.clone(),
                reason: self.reason.clone(),
            },
        }
    }
}

impl Serialize for UnreadableRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw: JsonValue = serde_json::from_str(&self.raw).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

/// A stored `teacherAssignments` value.
///
/// Older workspaces stored a bare list of teacher ids; new writes always
/// produce `Scheduled`. `Unreadable` is only ever built by the store loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignmentRecord {
    LegacyTeacherList(Vec<String>),
    Scheduled(ScheduledAssignment),
    #[serde(skip_deserializing)]
    Unreadable(UnreadableRecord),
}

impl AssignmentRecord {
    pub fn new(teacher_id: impl Into<String>) -> Self {
        AssignmentRecord::Scheduled(ScheduledAssignment {
            teacher_id: teacher_id.into(),
            schedule: None,
        })
    }

    pub fn with_schedule(teacher_id: impl Into<String>, schedule: Schedule) -> Self {
        AssignmentRecord::Scheduled(ScheduledAssignment {
            teacher_id: teacher_id.into(),
            schedule: Some(schedule),
        })
    }

    pub fn names_teacher(&self, teacher_id: &str) -> bool {
        match self {
            AssignmentRecord::LegacyTeacherList(ids) => ids.iter().any(|t| t == teacher_id),
            AssignmentRecord::Scheduled(a) => a.teacher_id == teacher_id,
            AssignmentRecord::Unreadable(u) => u.teacher_id() == Some(teacher_id),
        }
    }

    /// The single teacher of a current-shape record. Legacy lists have none.
    pub fn teacher_id(&self) -> Option<&str> {
        match self {
            AssignmentRecord::LegacyTeacherList(_) => None,
            AssignmentRecord::Scheduled(a) => Some(a.teacher_id.as_str()),
            AssignmentRecord::Unreadable(u) => u.teacher_id(),
        }
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            AssignmentRecord::Scheduled(a) => a.schedule.as_ref(),
            AssignmentRecord::LegacyTeacherList(_) | AssignmentRecord::Unreadable(_) => None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, AssignmentRecord::LegacyTeacherList(_))
    }

    pub fn unreadable(&self) -> Option<&UnreadableRecord> {
        match self {
            AssignmentRecord::Unreadable(u) => Some(u),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub teacher_assignments: BTreeMap<String, AssignmentRecord>,
}

impl Subject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: None,
            name: name.into(),
            teacher_assignments: BTreeMap::new(),
        }
    }

    pub fn with_record(mut self, section_id: impl Into<String>, record: AssignmentRecord) -> Self {
        self.teacher_assignments.insert(section_id.into(), record);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub rank: Option<i64>,
}

impl Section {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            grade_level: None,
            department: None,
            rank: None,
        }
    }
}

/// Identifies one `teacherAssignments` slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionKey {
    pub subject_id: String,
    pub section_id: String,
}

impl SectionKey {
    pub fn new(subject_id: impl Into<String>, section_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            section_id: section_id.into(),
        }
    }

    pub fn matches(&self, subject_id: &str, section_id: &str) -> bool {
        self.subject_id == subject_id && self.section_id == section_id
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.section_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn day_set_has_set_semantics() {
        let set: DaySet = [Day::Wednesday, Day::Monday, Day::Wednesday]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Day::Monday, Day::Wednesday]);

        let other: DaySet = [Day::Wednesday, Day::Friday].into_iter().collect();
        assert_eq!(set.intersection(other), DaySet::single(Day::Wednesday));
        assert!(set.intersection(DaySet::single(Day::Friday)).is_empty());
    }

    #[test]
    fn day_parsing_accepts_abbreviations() {
        assert_eq!("wed".parse::<Day>().unwrap(), Day::Wednesday);
        assert_eq!(" Friday ".parse::<Day>().unwrap(), Day::Friday);
        assert!("Funday".parse::<Day>().is_err());
    }

    #[test]
    fn reads_both_record_shapes() {
        let raw = json!({
            "sec-a": ["t1", "t2"],
            "sec-b": { "teacherId": "t1" },
            "sec-c": {
                "teacherId": "t3",
                "schedule": {
                    "dayOfWeek": ["Monday", "Wednesday"],
                    "startTime": "8:00 AM",
                    "endTime": "9:00 AM",
                    "room": "101",
                    "deliveryMode": "faceToFace"
                }
            }
        });
        let map: BTreeMap<String, AssignmentRecord> = serde_json::from_value(raw).unwrap();

        assert!(map["sec-a"].is_legacy());
        assert!(map["sec-a"].names_teacher("t2"));
        assert_eq!(map["sec-a"].teacher_id(), None);
        assert_eq!(map["sec-b"].teacher_id(), Some("t1"));
        assert!(map["sec-b"].schedule().is_none());

        let sched = map["sec-c"].schedule().expect("schedule");
        assert_eq!(sched.day_of_week.len(), 2);
        assert_eq!(sched.start_time, ClockTime::hm(8, 0));
        assert_eq!(sched.room, "101");
    }

    #[test]
    fn reads_single_day_string_and_missing_mode() {
        let raw = json!({
            "teacherId": "t1",
            "schedule": {
                "dayOfWeek": "Tuesday",
                "startTime": "1:00 PM",
                "endTime": "2:30 PM",
                "room": "Lab 2"
            }
        });
        let rec: AssignmentRecord = serde_json::from_value(raw).unwrap();
        let sched = rec.schedule().expect("schedule");
        assert_eq!(sched.day_of_week, DaySet::single(Day::Tuesday));
        assert_eq!(sched.delivery_mode, DeliveryMode::FaceToFace);
    }

    #[test]
    fn unscheduled_record_omits_schedule_on_write() {
        let v = serde_json::to_value(AssignmentRecord::new("t9")).unwrap();
        assert_eq!(v, json!({ "teacherId": "t9" }));
    }

    #[test]
    fn unreadable_record_keeps_its_json_and_holder() {
        let raw = json!({
            "teacherId": "t4",
            "schedule": { "dayOfWeek": ["Monday"], "startTime": "0800", "endTime": "9:00 AM", "room": "B2" }
        });
        let rec = AssignmentRecord::Unreadable(UnreadableRecord::quarantine(
            &raw,
            Some("0800".to_string()),
            "bad start time",
        ));
        assert!(rec.names_teacher("t4"));
        assert_eq!(rec.teacher_id(), Some("t4"));
        assert!(rec.schedule().is_none());
        assert!(!rec.is_legacy());
        assert_eq!(serde_json::to_value(&rec).unwrap(), raw);

        let u = rec.unreadable().expect("unreadable");
        assert_eq!(u.room(), Some("B2"));
        let e = u.error(&SectionKey::new("math", "s1"));
        assert_eq!(e.code(), "invalid_time_format");

        let shapeless = UnreadableRecord::quarantine(&json!(42), None, "not a record");
        assert_eq!(shapeless.teacher_id(), None);
        assert_eq!(shapeless.error(&SectionKey::new("math", "s1")).code(), "unreadable_record");
    }

    #[test]
    fn delivery_mode_parses_loose_labels() {
        assert_eq!("Face-to-Face".parse::<DeliveryMode>().unwrap(), DeliveryMode::FaceToFace);
        assert_eq!("ONLINE".parse::<DeliveryMode>().unwrap(), DeliveryMode::Online);
        assert!(!DeliveryMode::Online.requires_room());
        assert!(DeliveryMode::Hybrid.requires_room());
        assert!("carrier pigeon".parse::<DeliveryMode>().is_err());
    }
}
