// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_utils::ClockTime;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: String,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub patient_name: String,
    pub patient_phone: Option<String>,
    pub date: NaiveDate,
    /// Displayed start time; shifted forward by delay propagation.
    pub time: ClockTime,
    /// Join key to the derived slot calendar.
    pub slot_index: i32,
    pub session_index: i32,
    pub token_number: i32,
    pub status: AppointmentStatus,
    pub booked_via: BookingChannel,
    /// Cumulative minutes added by overrun propagation, never negative.
    pub delay_minutes: i32,
    /// Latest moment an advance booking may still claim the slot.
    pub cut_off_time: ClockTime,
    /// Deadline after which a pending appointment may be treated as abandoned.
    pub no_show_time: ClockTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Whether this appointment still holds its slot. Cancelled and no-show
    /// records stay in the store but free their position.
    pub fn occupies_slot(&self) -> bool {
        !matches!(
            self.status,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Still waiting to be seen; the population the retiming engines move.
    pub fn is_awaiting_consultation(&self) -> bool {
        matches!(
            self.status,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        )
    }

    pub fn is_walk_in(&self) -> bool {
        self.booked_via == BookingChannel::WalkIn
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingChannel {
    /// Booked online ahead of time; the "A token".
    Advance,
    /// Patient at the desk; the "W token".
    WalkIn,
    Phone,
}

impl fmt::Display for BookingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingChannel::Advance => write!(f, "advance"),
            BookingChannel::WalkIn => write!(f, "walk_in"),
            BookingChannel::Phone => write!(f, "phone"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub patient_name: String,
    pub patient_phone: Option<String>,
    pub booked_via: BookingChannel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteConsultationRequest {
    /// When the consultation actually ended; overrun is measured from the
    /// scheduled time plus the doctor's average duration.
    pub actual_end_time: ClockTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignSessionRequest {
    pub doctor_id: Uuid,
    pub session_index: i32,
}

// ==============================================================================
// SCHEDULING POLICY
// ==============================================================================

/// Front-desk timing rules. One instance covers a clinic.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    pub cut_off_lead_minutes: i64,
    pub no_show_grace_minutes: i64,
    /// Advance/phone bookings may not take a slot starting within this
    /// window from now; walk-ins may.
    pub online_exclusion_minutes: i64,
    pub max_booking_attempts: u32,
    pub lock_timeout_seconds: i64,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            cut_off_lead_minutes: 15,
            no_show_grace_minutes: 15,
            online_exclusion_minutes: 60,
            max_booking_attempts: 3,
            lock_timeout_seconds: 30,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("No slot available")]
    NoSlotAvailable,

    #[error("Slot no longer available, please retry")]
    SlotTaken,

    #[error("Invalid availability template: {0}")]
    InvalidTemplate(String),

    #[error("Appointment cannot leave status {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<doctor_cell::models::DoctorError> for SchedulerError {
    fn from(err: doctor_cell::models::DoctorError) -> Self {
        match err {
            doctor_cell::models::DoctorError::NotFound => SchedulerError::DoctorNotFound,
            doctor_cell::models::DoctorError::InvalidTemplate(msg) => {
                SchedulerError::InvalidTemplate(msg)
            }
            doctor_cell::models::DoctorError::DatabaseError(msg) => {
                SchedulerError::DatabaseError(msg)
            }
        }
    }
}
