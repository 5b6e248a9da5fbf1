// libs/appointment-cell/src/services/vacancy.rs
//
// When a slot is vacated (cancellation or no-show), the delay that overrun
// propagation pushed onto later appointments is partly unwarranted: one
// intervening consultation will simply not happen. This engine hands one
// slot-duration of delay back to every later appointment. The displayed
// `time` is deliberately left untouched; only the delay bookkeeping and the
// no-show deadline are corrected.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use doctor_cell::services::DoctorService;

use crate::models::{Appointment, SchedulerError, SchedulingPolicy};
use crate::services::store::AppointmentStore;

/// Rows to rewrite after the slot at `vacated_slot_index` frees up.
/// Delay is floored at zero; appointments at or before the vacated slot are
/// never touched.
pub fn recovery_plan(
    appointments: &[Appointment],
    vacated_slot_index: i32,
    slot_minutes: u16,
    policy: &SchedulingPolicy,
) -> Vec<Appointment> {
    appointments
        .iter()
        .filter(|appt| {
            appt.is_awaiting_consultation() && appt.slot_index > vacated_slot_index
        })
        .filter_map(|appt| {
            let recovered_delay = (appt.delay_minutes - slot_minutes as i32).max(0);
            let no_show_time = appt
                .time
                .plus_minutes(policy.no_show_grace_minutes + recovered_delay as i64);

            if recovered_delay == appt.delay_minutes && no_show_time == appt.no_show_time {
                return None;
            }

            let mut recovered = appt.clone();
            recovered.delay_minutes = recovered_delay;
            recovered.no_show_time = no_show_time;
            Some(recovered)
        })
        .collect()
}

pub struct VacancyRecoveryEngine {
    store: AppointmentStore,
    doctor_service: DoctorService,
    policy: SchedulingPolicy,
}

impl VacancyRecoveryEngine {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: AppointmentStore::new(supabase),
            doctor_service: DoctorService::new(config),
            policy: SchedulingPolicy::default(),
        }
    }

    /// Recover one slot-duration of delay for everything behind the vacated
    /// slot. Returns the number of rewritten appointments.
    pub async fn on_slot_vacated(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        vacated_slot_index: i32,
        auth_token: Option<&str>,
    ) -> Result<usize, SchedulerError> {
        let doctor = self.doctor_service.get_doctor(doctor_id, auth_token).await?;
        let appointments = self.store.day_appointments(doctor_id, date, auth_token).await?;

        let plan = recovery_plan(
            &appointments,
            vacated_slot_index,
            doctor.average_consulting_minutes,
            &self.policy,
        );
        let recovered = self.store.apply_batch(plan, auth_token).await?;

        info!(
            "Vacated slot {} on {} recovered delay for {} appointments",
            vacated_slot_index, date, recovered
        );
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use shared_utils::ClockTime;

    use crate::models::{AppointmentStatus, BookingChannel};

    fn t(hour: u16, minute: u16) -> ClockTime {
        ClockTime::new(hour, minute).unwrap()
    }

    fn appt(
        slot_index: i32,
        time: ClockTime,
        delay_minutes: i32,
        status: AppointmentStatus,
    ) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: "clinic-1".to_string(),
            doctor_id: Uuid::new_v4(),
            doctor_name: "Dr. Rao".to_string(),
            patient_name: "Patient".to_string(),
            patient_phone: None,
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            time,
            slot_index,
            session_index: 0,
            token_number: slot_index + 1,
            status,
            booked_via: BookingChannel::Advance,
            delay_minutes,
            cut_off_time: time.plus_minutes(-15),
            no_show_time: time.plus_minutes(15 + delay_minutes as i64),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn gives_back_one_slot_duration_of_delay() {
        // The 09:40 appointment was shifted to 09:50 (delay 10) by an
        // overrun; the 09:20 appointment then cancels.
        let appointments = vec![
            appt(1, t(9, 20), 0, AppointmentStatus::Cancelled),
            appt(2, t(9, 50), 10, AppointmentStatus::Confirmed),
        ];

        let plan = recovery_plan(&appointments, 1, 20, &SchedulingPolicy::default());

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].delay_minutes, 0);
        // Time stays where propagation put it.
        assert_eq!(plan[0].time.to_wire(), "09:50");
        assert_eq!(plan[0].no_show_time.to_wire(), "10:05");
    }

    #[test]
    fn delay_never_goes_negative() {
        let appointments = vec![appt(2, t(9, 40), 5, AppointmentStatus::Pending)];

        let plan = recovery_plan(&appointments, 0, 20, &SchedulingPolicy::default());
        assert_eq!(plan[0].delay_minutes, 0);
    }

    #[test]
    fn appointments_before_the_vacated_slot_are_unaffected() {
        let appointments = vec![
            appt(0, t(9, 0), 10, AppointmentStatus::Confirmed),
            appt(1, t(9, 20), 10, AppointmentStatus::Confirmed),
            appt(3, t(10, 0), 10, AppointmentStatus::Confirmed),
        ];

        let plan = recovery_plan(&appointments, 1, 20, &SchedulingPolicy::default());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].slot_index, 3);
    }

    #[test]
    fn undelayed_appointments_with_current_deadline_are_left_alone() {
        // delay already 0 and no_show already at time + grace: nothing to do.
        let appointments = vec![appt(2, t(9, 40), 0, AppointmentStatus::Confirmed)];

        let plan = recovery_plan(&appointments, 0, 20, &SchedulingPolicy::default());
        assert!(plan.is_empty());
    }

    #[test]
    fn partial_recovery_keeps_the_remainder() {
        let appointments = vec![appt(2, t(10, 10), 30, AppointmentStatus::Confirmed)];

        let plan = recovery_plan(&appointments, 1, 20, &SchedulingPolicy::default());
        assert_eq!(plan[0].delay_minutes, 10);
        assert_eq!(plan[0].no_show_time.to_wire(), "10:35");
    }
}
