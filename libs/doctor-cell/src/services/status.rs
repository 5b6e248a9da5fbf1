// libs/doctor-cell/src/services/status.rs
//
// Periodic sweep of each doctor's live in/out consultation flag. The flag
// is owned by this sweep alone; nothing else writes it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::{Clock, ClockTime, SystemClock};

use crate::models::{AvailabilityTemplate, ConsultationStatus, DoctorError};
use crate::services::doctor::DoctorService;

pub struct DoctorStatusUpdater {
    supabase: SupabaseClient,
    doctor_service: DoctorService,
    clock: Arc<dyn Clock>,
    sweep_gate: Mutex<()>,
}

impl DoctorStatusUpdater {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctor_service: DoctorService::new(config),
            clock,
            sweep_gate: Mutex::new(()),
        }
    }

    /// The status a doctor should show right now: `in` iff the current
    /// time falls inside any of today's template session windows.
    pub fn expected_status(template: &AvailabilityTemplate, weekday: chrono::Weekday, now: ClockTime) -> ConsultationStatus {
        let inside = template
            .day(weekday)
            .map(|day| day.sessions.iter().any(|window| window.contains(now)))
            .unwrap_or(false);

        if inside {
            ConsultationStatus::In
        } else {
            ConsultationStatus::Out
        }
    }

    /// One pass over the clinic's doctors. Writes only the doctors whose
    /// stored status differs from the computed one; each write touches a
    /// single doctor's status field. Returns the number of writes.
    pub async fn sweep_clinic(&self, clinic_id: &str) -> Result<usize, DoctorError> {
        let doctors = self.doctor_service.list_clinic_doctors(clinic_id, None).await?;
        let weekday = self.clock.today().weekday();
        let now = self.clock.time_of_day();

        let mut updated = 0;
        for doctor in &doctors {
            let expected = Self::expected_status(&doctor.availability, weekday, now);
            if expected == doctor.consultation_status {
                continue;
            }

            debug!(
                "Doctor {} flips {} -> {}",
                doctor.id, doctor.consultation_status, expected
            );

            let path = format!("/rest/v1/doctors?id=eq.{}", doctor.id);
            let update = json!({
                "consultation_status": expected,
                "updated_at": Utc::now().to_rfc3339(),
            });

            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                "Prefer",
                reqwest::header::HeaderValue::from_static("return=representation"),
            );

            let result: Result<Vec<Value>, _> = self
                .supabase
                .request_with_headers(Method::PATCH, &path, None, Some(update), Some(headers))
                .await;

            match result {
                Ok(_) => updated += 1,
                // One stuck doctor must not stall the rest of the sweep.
                Err(e) => warn!("Status write failed for doctor {}: {}", doctor.id, e),
            }
        }

        if updated > 0 {
            info!("Status sweep updated {}/{} doctors", updated, doctors.len());
        }
        Ok(updated)
    }

    /// Fixed-interval sweep loop. Single-flight: a tick that fires while
    /// the previous sweep is still running is skipped, not queued.
    pub async fn run(self: Arc<Self>, clinic_id: String, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "Doctor status sweep running every {}s for clinic {}",
            period.as_secs(),
            clinic_id
        );

        loop {
            ticker.tick().await;

            let Ok(_gate) = self.sweep_gate.try_lock() else {
                debug!("Previous status sweep still running, skipping tick");
                continue;
            };

            if let Err(e) = self.sweep_clinic(&clinic_id).await {
                warn!("Status sweep failed: {}", e);
            }
        }
    }
}
