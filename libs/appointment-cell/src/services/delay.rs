// libs/appointment-cell/src/services/delay.rs
//
// When a consultation runs past its scheduled end, every later pending or
// confirmed appointment on that doctor's day shifts forward by the overrun.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::ClockTime;

use doctor_cell::services::DoctorService;

use crate::models::{Appointment, SchedulerError};
use crate::services::store::AppointmentStore;

/// The rows to rewrite after an overrun of `overrun_minutes`.
///
/// Ordering is by `slot_index`, not wall-clock time, so an appointment that
/// was reassigned or edited earlier in the day is still handled correctly.
/// Forward-only: the plan is empty unless the overrun is positive.
pub fn propagation_plan(
    appointments: &[Appointment],
    trigger_slot_index: i32,
    overrun_minutes: i64,
) -> Vec<Appointment> {
    if overrun_minutes <= 0 {
        return vec![];
    }

    appointments
        .iter()
        .filter(|appt| {
            appt.is_awaiting_consultation() && appt.slot_index > trigger_slot_index
        })
        .map(|appt| {
            let mut shifted = appt.clone();
            shifted.time = appt.time.plus_minutes(overrun_minutes);
            shifted.delay_minutes = appt.delay_minutes + overrun_minutes as i32;
            shifted
        })
        .collect()
}

pub struct DelayPropagationEngine {
    store: AppointmentStore,
    doctor_service: DoctorService,
}

impl DelayPropagationEngine {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: AppointmentStore::new(supabase),
            doctor_service: DoctorService::new(config),
        }
    }

    /// Measure the overrun of the just-completed appointment and shift
    /// everything behind it. Returns the number of rewritten appointments;
    /// zero when the consultation finished on time.
    pub async fn on_consultation_completed(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        completed_appointment_id: Uuid,
        actual_end_time: ClockTime,
        auth_token: Option<&str>,
    ) -> Result<usize, SchedulerError> {
        let doctor = self.doctor_service.get_doctor(doctor_id, auth_token).await?;
        let appointments = self.store.day_appointments(doctor_id, date, auth_token).await?;

        let trigger = appointments
            .iter()
            .find(|appt| appt.id == completed_appointment_id)
            .ok_or(SchedulerError::NotFound)?;

        let scheduled_end = trigger
            .time
            .plus_minutes(doctor.average_consulting_minutes as i64);
        let overrun_minutes = scheduled_end.minutes_until(actual_end_time);

        if overrun_minutes <= 0 {
            debug!(
                "Appointment {} finished on time, nothing to shift",
                completed_appointment_id
            );
            return Ok(0);
        }

        let plan = propagation_plan(&appointments, trigger.slot_index, overrun_minutes);
        let shifted = self.store.apply_batch(plan, auth_token).await?;

        info!(
            "Overrun of {}min on appointment {} shifted {} later appointments",
            overrun_minutes, completed_appointment_id, shifted
        );
        Ok(shifted)
    }
}
