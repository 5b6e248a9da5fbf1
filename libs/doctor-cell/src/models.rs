// libs/doctor-cell/src/models.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_utils::{ClockTime, TimeRange};

// ==============================================================================
// DOCTOR MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub clinic_id: String,
    pub full_name: String,
    pub specialty: Option<String>,
    /// Average consultation length in minutes; the slot step.
    pub average_consulting_minutes: u16,
    #[serde(default)]
    pub availability: AvailabilityTemplate,
    /// Per-date blackout intervals keyed by ISO date. A date mapped to an
    /// empty list is a recorded override that blocks nothing.
    #[serde(default)]
    pub leave_overrides: BTreeMap<NaiveDate, Vec<TimeRange>>,
    pub consultation_status: ConsultationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn leave_for(&self, date: NaiveDate) -> &[TimeRange] {
        self.leave_overrides
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<(), DoctorError> {
        if self.average_consulting_minutes == 0 {
            return Err(DoctorError::InvalidTemplate(
                "average consulting time must be positive".to_string(),
            ));
        }
        self.availability.validate()
    }
}

/// Weekly recurring availability, keyed by lowercase weekday name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityTemplate(pub BTreeMap<String, DaySchedule>);

impl AvailabilityTemplate {
    pub fn day(&self, weekday: Weekday) -> Option<&DaySchedule> {
        self.0.get(weekday_key(weekday))
    }

    pub fn validate(&self) -> Result<(), DoctorError> {
        for (day, schedule) in &self.0 {
            if !WEEKDAY_KEYS.contains(&day.as_str()) {
                return Err(DoctorError::InvalidTemplate(format!(
                    "unknown weekday key {:?}",
                    day
                )));
            }
            for (i, a) in schedule.sessions.iter().enumerate() {
                for b in &schedule.sessions[i + 1..] {
                    if a.intersects(b) {
                        return Err(DoctorError::InvalidTemplate(format!(
                            "{}: session {} overlaps session {}",
                            day, a, b
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One weekday's session windows, chronological.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaySchedule {
    pub sessions: Vec<TimeRange>,
}

pub const WEEKDAY_KEYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

pub fn weekday_key(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    In,
    Out,
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationStatus::In => write!(f, "in"),
            ConsultationStatus::Out => write!(f, "out"),
        }
    }
}

// ==============================================================================
// DERIVED SLOT MODEL
// ==============================================================================

/// One bookable opening, derived from the template and never persisted.
///
/// `global_slot_index` is the ordinal of the slot's position on the day's
/// step grid across all sessions. Leave-blocked positions keep their
/// ordinal even though they are not emitted, so the index stays a stable
/// join key to booked appointments when overrides change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub session_index: i32,
    pub global_slot_index: i32,
    pub start: ClockTime,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceAvailabilityRequest {
    pub availability: AvailabilityTemplate,
    pub average_consulting_minutes: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLeaveOverrideRequest {
    pub intervals: Vec<TimeRange>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Invalid availability template: {0}")]
    InvalidTemplate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
