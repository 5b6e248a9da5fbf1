// libs/appointment-cell/src/services/reassignment.rs
//
// Patients who are already at the clinic but scheduled later than necessary
// are pulled forward into vacant slots of the same session. Runs only for
// the current date, as a detached best-effort optimization.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::{Clock, ClockTime, SystemClock};

use doctor_cell::models::Slot;
use doctor_cell::services::slots;
use doctor_cell::services::DoctorService;

use crate::models::{Appointment, AppointmentStatus, SchedulerError, SchedulingPolicy};
use crate::services::store::AppointmentStore;

/// Candidate ordering, most entitled first. Kept as an explicit ranked key
/// so the policy stays independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CandidateRank {
    /// Walk-in that can use a slot inside the exclusion window.
    WalkInWindowEligible,
    /// Walk-in limited to slots past the window.
    WalkIn,
    /// Checked-in advance or phone booking.
    Advance,
}

#[derive(Debug, Clone, Copy)]
struct EmptySlot {
    slot: Slot,
    in_window: bool,
}

/// Plan the forward moves for one session. Pure over the snapshot.
///
/// Empty slots inside the one-hour exclusion window are reserved for
/// walk-in candidates; slots past it are open to every candidate. Pending
/// appointments never move. Each empty slot is consumed at most once, and
/// slots already in the past are not offered at all.
pub fn reassignment_plan(
    session_slots: &[Slot],
    appointments: &[Appointment],
    session_index: i32,
    now: ClockTime,
    policy: &SchedulingPolicy,
) -> Vec<Appointment> {
    let window_end = now.plus_minutes(policy.online_exclusion_minutes);

    let occupied: HashSet<i32> = appointments
        .iter()
        .filter(|appt| appt.occupies_slot())
        .map(|appt| appt.slot_index)
        .collect();

    let empties: Vec<EmptySlot> = session_slots
        .iter()
        .filter(|slot| !occupied.contains(&slot.global_slot_index) && slot.start >= now)
        .map(|slot| EmptySlot {
            slot: *slot,
            in_window: slot.start < window_end,
        })
        .collect();

    if empties.is_empty() {
        return vec![];
    }

    let eligible = |appt: &Appointment, empty: &EmptySlot| {
        empty.slot.global_slot_index < appt.slot_index && (appt.is_walk_in() || !empty.in_window)
    };

    // Only patients actually present move: confirmed appointments, never
    // pending ones, and only within their own session.
    let mut candidates: Vec<&Appointment> = appointments
        .iter()
        .filter(|appt| {
            appt.status == AppointmentStatus::Confirmed
                && appt.session_index == session_index
                && empties.iter().any(|empty| eligible(appt, empty))
        })
        .collect();

    let rank = |appt: &Appointment| {
        if appt.is_walk_in() {
            let window_eligible = empties
                .iter()
                .any(|empty| empty.in_window && eligible(appt, empty));
            if window_eligible {
                CandidateRank::WalkInWindowEligible
            } else {
                CandidateRank::WalkIn
            }
        } else {
            CandidateRank::Advance
        }
    };

    candidates.sort_by_key(|appt| (rank(appt), appt.time, appt.slot_index));

    let mut consumed: HashSet<i32> = HashSet::new();
    let mut moves = Vec::new();

    for candidate in candidates {
        // Walk-ins drain window slots first; the partition order also keeps
        // window slots (which start sooner) ahead of the rest.
        let chosen = empties
            .iter()
            .filter(|empty| empty.in_window)
            .chain(empties.iter().filter(|empty| !empty.in_window))
            .find(|empty| {
                !consumed.contains(&empty.slot.global_slot_index) && eligible(candidate, empty)
            });

        let Some(target) = chosen else {
            continue;
        };

        consumed.insert(target.slot.global_slot_index);

        let mut moved = candidate.clone();
        moved.slot_index = target.slot.global_slot_index;
        moved.time = target.slot.start;
        moved.cut_off_time = target.slot.start.plus_minutes(-policy.cut_off_lead_minutes);
        moved.no_show_time = target.slot.start.plus_minutes(policy.no_show_grace_minutes);
        moves.push(moved);
    }

    moves
}

pub struct ArrivedPatientReassignment {
    store: AppointmentStore,
    doctor_service: DoctorService,
    policy: SchedulingPolicy,
    clock: Arc<dyn Clock>,
}

impl ArrivedPatientReassignment {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: AppointmentStore::new(supabase),
            doctor_service: DoctorService::new(config),
            policy: SchedulingPolicy::default(),
            clock,
        }
    }

    /// Pull arrived patients forward within one session of the current
    /// date. Any other date is a no-op. Returns the number of moves.
    pub async fn run_for_session(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        session_index: i32,
        auth_token: Option<&str>,
    ) -> Result<usize, SchedulerError> {
        if date != self.clock.today() {
            debug!("Reassignment skipped: {} is not the current date", date);
            return Ok(0);
        }

        let doctor = self.doctor_service.get_doctor(doctor_id, auth_token).await?;
        let calendar = slots::slots_for_date(&doctor, date)?;
        let session = slots::session_slots(&calendar, session_index);
        let appointments = self.store.day_appointments(doctor_id, date, auth_token).await?;

        let plan = reassignment_plan(
            &session,
            &appointments,
            session_index,
            self.clock.time_of_day(),
            &self.policy,
        );
        let moved = self.store.apply_batch(plan, auth_token).await?;

        if moved > 0 {
            info!(
                "Reassignment moved {} arrived patients forward in session {} of {}",
                moved, session_index, date
            );
        }
        Ok(moved)
    }
}
