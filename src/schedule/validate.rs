//! Schedule form validation.
//!
//! Turns a submitted `ScheduleDraft` into a `Schedule`, collecting every
//! problem instead of stopping at the first. Runs before any conflict scan.

use serde::{Deserialize, Serialize};

use super::config::SchedulingConfig;
use super::error::SchedulingError;
use super::model::{Day, DaySet, DeliveryMode, Schedule};
use super::time::ClockTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationErrorKind {
    MissingDays,
    UnknownDay,
    MissingStartTime,
    MissingEndTime,
    EndNotAfterStart,
    MissingRoom,
    RoomNotAllowed,
    UnknownDeliveryMode,
    OffGrid,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A schedule as submitted by a form; every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    #[serde(default, deserialize_with = "one_or_many")]
    pub day_of_week: Vec<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub delivery_mode: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

fn parse_optional_time(raw: Option<&str>) -> Result<Option<ClockTime>, SchedulingError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse::<ClockTime>().map(Some),
    }
}

/// Validates a draft against the schedule invariants and the workspace grid.
///
/// Malformed clock strings fail immediately with `InvalidTimeFormat`; all
/// other problems are gathered into one `Validation` error.
pub fn validate_schedule(
    draft: &ScheduleDraft,
    config: &SchedulingConfig,
) -> Result<Schedule, SchedulingError> {
    let start = parse_optional_time(draft.start_time.as_deref())?;
    let end = parse_optional_time(draft.end_time.as_deref())?;

    let mut errors = Vec::new();

    let mut days = DaySet::EMPTY;
    for raw in &draft.day_of_week {
        if raw.trim().is_empty() {
            continue;
        }
        match raw.parse::<Day>() {
            Ok(d) => days.insert(d),
            Err(msg) => errors.push(ValidationError::new(ValidationErrorKind::UnknownDay, msg)),
        }
    }
    if days.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingDays,
            "select at least one day",
        ));
    }

    if start.is_none() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingStartTime,
            "start time is required",
        ));
    }
    if end.is_none() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingEndTime,
            "end time is required",
        ));
    }

    let delivery_mode = match draft.delivery_mode.as_deref().map(str::trim) {
        None | Some("") => DeliveryMode::default(),
        Some(raw) => match raw.parse::<DeliveryMode>() {
            Ok(m) => m,
            Err(msg) => {
                errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownDeliveryMode,
                    msg,
                ));
                DeliveryMode::default()
            }
        },
    };

    let room = draft.room.as_deref().unwrap_or("").trim().to_string();

    let (Some(start_time), Some(end_time)) = (start, end) else {
        errors.extend(room_errors(&room, delivery_mode));
        return Err(SchedulingError::Validation(errors));
    };

    let schedule = Schedule {
        day_of_week: days,
        start_time,
        end_time,
        room,
        delivery_mode,
    };
    errors.extend(check_times_and_room(&schedule, config));

    if errors.is_empty() {
        Ok(schedule)
    } else {
        Err(SchedulingError::Validation(errors))
    }
}

fn room_errors(room: &str, mode: DeliveryMode) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if mode.requires_room() && room.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingRoom,
            "room is required unless the class is online",
        ));
    }
    if !mode.requires_room() && !room.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::RoomNotAllowed,
            "online classes must not have a room",
        ));
    }
    errors
}

/// Invariant check for an already-typed schedule. Empty vec means valid.
pub fn check_schedule(schedule: &Schedule, config: &SchedulingConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if schedule.day_of_week.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingDays,
            "select at least one day",
        ));
    }
    errors.extend(check_times_and_room(schedule, config));
    errors
}

fn check_times_and_room(schedule: &Schedule, config: &SchedulingConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if schedule.end_time <= schedule.start_time {
        errors.push(ValidationError::new(
            ValidationErrorKind::EndNotAfterStart,
            format!(
                "end time {} must be after start time {}",
                schedule.end_time, schedule.start_time
            ),
        ));
    }

    if config.enforce_grid {
        for (label, t) in [("start", schedule.start_time), ("end", schedule.end_time)] {
            if !config.is_on_grid(t) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::OffGrid,
                    format!(
                        "{} time {} must fall on a {}-minute slot between {} and {}",
                        label, t, config.slot_minutes, config.day_start, config.day_end
                    ),
                ));
            }
        }
    }

    errors.extend(room_errors(&schedule.room, schedule.delivery_mode));
    errors
}

/// Convenience wrapper returning the collected errors as a `Result`.
pub fn ensure_valid(schedule: &Schedule, config: &SchedulingConfig) -> Result<(), SchedulingError> {
    let errors = check_schedule(schedule, config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchedulingError::Validation(errors))
    }
}
