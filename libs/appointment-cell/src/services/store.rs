// libs/appointment-cell/src/services/store.rs
//
// The appointments read/write seam shared by the booking allocator and the
// retiming engines: one snapshot read per operation, one batch write back.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::{parse_rows, SupabaseClient};

use crate::models::{Appointment, AppointmentStatus, SchedulerError};

pub struct AppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl AppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// The full appointment set for one doctor/date, slot order.
    /// Unparseable records are skipped at the boundary.
    pub async fn day_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, SchedulerError> {
        debug!("Fetching appointments for doctor {} on {}", doctor_id, date);

        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&order=slot_index.asc",
            doctor_id, date
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| SchedulerError::DatabaseError(e.to_string()))?;

        Ok(parse_rows(result, "appointments"))
    }

    pub async fn get(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulerError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| SchedulerError::DatabaseError(e.to_string()))?;

        let mut rows: Vec<Appointment> = parse_rows(result, "appointments");
        rows.pop().ok_or(SchedulerError::NotFound)
    }

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulerError> {
        debug!("Appointment {} -> {}", appointment_id, status);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let update = json!({
            "status": status,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, auth_token, Some(update), Some(headers))
            .await
            .map_err(|e| SchedulerError::DatabaseError(e.to_string()))?;

        let mut rows: Vec<Appointment> = parse_rows(result, "appointments");
        rows.pop().ok_or(SchedulerError::NotFound)
    }

    /// Apply a retiming plan as one atomic multi-record write.
    pub async fn apply_batch(
        &self,
        mut rows: Vec<Appointment>,
        auth_token: Option<&str>,
    ) -> Result<usize, SchedulerError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        for row in &mut rows {
            row.updated_at = now;
        }

        let count = rows.len();
        let mut values = Vec::with_capacity(count);
        for row in rows {
            values.push(
                serde_json::to_value(row)
                    .map_err(|e| SchedulerError::DatabaseError(e.to_string()))?,
            );
        }

        self.supabase
            .batch_upsert("appointments", values, auth_token)
            .await
            .map_err(|e| SchedulerError::DatabaseError(e.to_string()))?;

        Ok(count)
    }
}
