// libs/appointment-cell/src/services/booking.rs
//
// Earliest-free-slot allocation. The occupancy check and the insert run
// under a per-slot lock row so that two concurrent bookings can never both
// claim the same (doctor, date, slot).

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::{Clock, ClockTime, SystemClock};

use doctor_cell::models::Slot;
use doctor_cell::services::slots;
use doctor_cell::services::DoctorService;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, BookingChannel, SchedulerError,
    SchedulingPolicy,
};
use crate::services::store::AppointmentStore;

/// Pick the earliest bookable slot for a new appointment.
///
/// A slot is occupied while a non-cancelled, non-no-show appointment holds
/// its index. Advance and phone bookings for the current date are barred
/// from slots starting inside the exclusion window; walk-ins are not.
pub fn allocate_slot<'a>(
    slot_calendar: &'a [Slot],
    appointments: &[Appointment],
    channel: BookingChannel,
    booking_for_today: bool,
    now: ClockTime,
    policy: &SchedulingPolicy,
) -> Option<&'a Slot> {
    let earliest_remote: ClockTime = now.plus_minutes(policy.online_exclusion_minutes);

    slot_calendar.iter().find(|slot| {
        let occupied = appointments
            .iter()
            .any(|appt| appt.occupies_slot() && appt.slot_index == slot.global_slot_index);
        if occupied {
            return false;
        }
        if channel != BookingChannel::WalkIn && booking_for_today && slot.start < earliest_remote {
            return false;
        }
        true
    })
}

pub struct BookingAllocator {
    supabase: Arc<SupabaseClient>,
    store: AppointmentStore,
    doctor_service: DoctorService,
    clinic_id: String,
    policy: SchedulingPolicy,
    clock: Arc<dyn Clock>,
}

impl BookingAllocator {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: AppointmentStore::new(Arc::clone(&supabase)),
            doctor_service: DoctorService::new(config),
            clinic_id: config.clinic_id.clone(),
            policy: SchedulingPolicy::default(),
            clock,
            supabase,
        }
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulerError> {
        info!(
            "Booking {} appointment with doctor {} on {}",
            request.booked_via, request.doctor_id, request.date
        );

        let doctor = self
            .doctor_service
            .get_doctor(request.doctor_id, auth_token)
            .await?;
        let slot_calendar = slots::slots_for_date(&doctor, request.date)?;
        let booking_for_today = request.date == self.clock.today();

        for attempt in 1..=self.policy.max_booking_attempts {
            debug!(
                "Booking attempt {} for doctor {} on {}",
                attempt, request.doctor_id, request.date
            );

            match self
                .try_book_once(&request, &doctor.full_name, &slot_calendar, booking_for_today, auth_token)
                .await
            {
                Ok(appointment) => {
                    info!(
                        "Appointment {} booked at slot {} ({})",
                        appointment.id, appointment.slot_index, appointment.time
                    );
                    return Ok(appointment);
                }
                Err(SchedulerError::SlotTaken) if attempt < self.policy.max_booking_attempts => {
                    warn!(
                        "Slot race lost, retrying attempt {}/{}",
                        attempt, self.policy.max_booking_attempts
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(SchedulerError::SlotTaken)
    }

    async fn try_book_once(
        &self,
        request: &BookAppointmentRequest,
        doctor_name: &str,
        slot_calendar: &[Slot],
        booking_for_today: bool,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulerError> {
        let appointments = self
            .store
            .day_appointments(request.doctor_id, request.date, auth_token)
            .await?;

        let slot = allocate_slot(
            slot_calendar,
            &appointments,
            request.booked_via,
            booking_for_today,
            self.clock.time_of_day(),
            &self.policy,
        )
        .ok_or(SchedulerError::NoSlotAvailable)?;

        let lock_key = self.slot_lock_key(request.doctor_id, request.date, slot.global_slot_index);
        if !self.acquire_slot_lock(&lock_key, request.doctor_id).await? {
            return Err(SchedulerError::SlotTaken);
        }

        // Final occupancy check under the lock.
        let latest = self
            .store
            .day_appointments(request.doctor_id, request.date, auth_token)
            .await;
        let still_free = match &latest {
            Ok(current) => !current
                .iter()
                .any(|appt| appt.occupies_slot() && appt.slot_index == slot.global_slot_index),
            Err(_) => false,
        };
        if !still_free {
            self.release_slot_lock(&lock_key).await?;
            return Err(SchedulerError::SlotTaken);
        }

        let appointment = self.build_appointment(request, doctor_name, slot);
        let result = self.insert_appointment(&appointment, auth_token).await;

        self.release_slot_lock(&lock_key).await?;
        result?;

        Ok(appointment)
    }

    fn build_appointment(
        &self,
        request: &BookAppointmentRequest,
        doctor_name: &str,
        slot: &Slot,
    ) -> Appointment {
        let now = Utc::now();
        // Walk-in patients are at the desk; remote channels wait for check-in.
        let status = if request.booked_via == BookingChannel::WalkIn {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        };

        Appointment {
            id: Uuid::new_v4(),
            clinic_id: self.clinic_id.clone(),
            doctor_id: request.doctor_id,
            doctor_name: doctor_name.to_string(),
            patient_name: request.patient_name.clone(),
            patient_phone: request.patient_phone.clone(),
            date: request.date,
            time: slot.start,
            slot_index: slot.global_slot_index,
            session_index: slot.session_index,
            token_number: slot.global_slot_index + 1,
            status,
            booked_via: request.booked_via,
            delay_minutes: 0,
            cut_off_time: slot.start.plus_minutes(-self.policy.cut_off_lead_minutes),
            no_show_time: slot.start.plus_minutes(self.policy.no_show_grace_minutes),
            created_at: now,
            updated_at: now,
        }
    }

    async fn insert_appointment(
        &self,
        appointment: &Appointment,
        auth_token: Option<&str>,
    ) -> Result<(), SchedulerError> {
        let record = serde_json::to_value(appointment)
            .map_err(|e| SchedulerError::DatabaseError(e.to_string()))?;

        let result = self
            .supabase
            .insert_returning("appointments", record, auth_token)
            .await
            .map_err(|e| SchedulerError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(SchedulerError::DatabaseError(
                "Appointment insert returned no representation".to_string(),
            ));
        }
        Ok(())
    }

    // Slot lock plumbing. A lock row in `slot_locks` guards one
    // (doctor, date, slot) triple; stale rows are reaped on contention.

    fn slot_lock_key(&self, doctor_id: Uuid, date: NaiveDate, slot_index: i32) -> String {
        format!("slot_{}_{}_{}", doctor_id, date, slot_index)
    }

    async fn acquire_slot_lock(
        &self,
        lock_key: &str,
        doctor_id: Uuid,
    ) -> Result<bool, SchedulerError> {
        if self.try_insert_lock(lock_key, doctor_id).await? {
            debug!("Slot lock acquired: {}", lock_key);
            return Ok(true);
        }

        // Lock row exists; reap it if expired, then try once more.
        if self.cleanup_expired_lock(lock_key).await? {
            return self.try_insert_lock(lock_key, doctor_id).await;
        }

        Ok(false)
    }

    async fn try_insert_lock(
        &self,
        lock_key: &str,
        doctor_id: Uuid,
    ) -> Result<bool, SchedulerError> {
        let lock_data = json!({
            "lock_key": lock_key,
            "doctor_id": doctor_id,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + chrono::Duration::seconds(self.policy.lock_timeout_seconds)).to_rfc3339(),
            "process_id": format!("scheduler_{}", Uuid::new_v4()),
        });

        match self
            .supabase
            .insert_returning("slot_locks", lock_data, None)
            .await
        {
            Ok(_) => Ok(true),
            // Unique violation on lock_key means someone else holds it.
            Err(_) => Ok(false),
        }
    }

    async fn release_slot_lock(&self, lock_key: &str) -> Result<(), SchedulerError> {
        let path = format!("/rest/v1/slot_locks?lock_key=eq.{}", lock_key);
        self.supabase
            .delete_returning(&path, None)
            .await
            .map_err(|e| SchedulerError::DatabaseError(format!("Lock release failed: {}", e)))?;

        debug!("Slot lock released: {}", lock_key);
        Ok(())
    }

    async fn cleanup_expired_lock(&self, lock_key: &str) -> Result<bool, SchedulerError> {
        let path = format!("/rest/v1/slot_locks?lock_key=eq.{}&select=*", lock_key);
        let response: Value = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| SchedulerError::DatabaseError(format!("Lock check failed: {}", e)))?;

        if let Some(lock) = response.as_array().and_then(|locks| locks.first()) {
            if let Some(expires_at) = lock
                .get("expires_at")
                .and_then(|v| v.as_str())
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            {
                if expires_at.with_timezone(&Utc) < Utc::now() {
                    self.release_slot_lock(lock_key).await?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}
