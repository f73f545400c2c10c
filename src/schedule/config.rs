use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::conflict::ConflictPolicy;
use super::time::{format_clock, ClockTime};

pub const SETTINGS_KEY: &str = "setup.scheduling";

/// Per-workspace scheduling settings (`setup.scheduling`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    pub day_start: ClockTime,
    pub day_end: ClockTime,
    pub slot_minutes: u16,
    pub enforce_grid: bool,
    pub conflict_policy: ConflictPolicy,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            day_start: ClockTime::hm(7, 0),
            day_end: ClockTime::hm(18, 0),
            slot_minutes: 15,
            enforce_grid: true,
            conflict_policy: ConflictPolicy::FirstPerKind,
        }
    }
}

impl SchedulingConfig {
    /// Reads a stored settings object. Missing or unusable keys keep their
    /// defaults so a bad value never blocks scheduling.
    pub fn from_settings(obj: &Map<String, JsonValue>) -> Self {
        let defaults = Self::default();
        let day_start = obj
            .get("dayStart")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<ClockTime>().ok())
            .unwrap_or(defaults.day_start);
        let day_end = obj
            .get("dayEnd")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<ClockTime>().ok())
            .unwrap_or(defaults.day_end);
        let (day_start, day_end) = if day_end > day_start {
            (day_start, day_end)
        } else {
            (defaults.day_start, defaults.day_end)
        };
        let slot_minutes = obj
            .get("slotMinutes")
            .and_then(|v| v.as_u64())
            .filter(|v| *v > 0 && *v <= 240 && 1440 % *v == 0)
            .map(|v| v as u16)
            .unwrap_or(defaults.slot_minutes);
        let enforce_grid = obj
            .get("enforceGrid")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.enforce_grid);
        let conflict_policy = obj
            .get("conflictPolicy")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<ConflictPolicy>().ok())
            .unwrap_or(defaults.conflict_policy);
        Self {
            day_start,
            day_end,
            slot_minutes,
            enforce_grid,
            conflict_policy,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    /// Whether `t` sits inside the bookable day and on the slot grid.
    pub fn is_on_grid(&self, t: ClockTime) -> bool {
        t >= self.day_start
            && t <= self.day_end
            && (t.minutes() - self.day_start.minutes()) % self.slot_minutes == 0
    }

    /// Labels for time pickers, `day_start` through `day_end` inclusive.
    pub fn time_options(&self) -> Vec<String> {
        let step = self.slot_minutes.max(1) as usize;
        (self.day_start.minutes()..=self.day_end.minutes())
            .step_by(step)
            .map(format_clock)
            .collect()
    }
}
