// libs/doctor-cell/src/services/doctor.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{parse_rows, SupabaseClient};
use shared_utils::TimeRange;

use crate::models::{Doctor, DoctorError, ReplaceAvailabilityRequest};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let mut doctors: Vec<Doctor> = parse_rows(result, "doctors");
        doctors.pop().ok_or(DoctorError::NotFound)
    }

    /// All doctors of one clinic; unparseable records are skipped.
    pub async fn list_clinic_doctors(
        &self,
        clinic_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Listing doctors for clinic: {}", clinic_id);

        let path = format!(
            "/rest/v1/doctors?clinic_id=eq.{}&order=full_name.asc",
            urlencoding::encode(clinic_id)
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        Ok(parse_rows(result, "doctors"))
    }

    /// Replace the weekly template and consultation duration wholesale.
    pub async fn replace_availability(
        &self,
        doctor_id: Uuid,
        request: ReplaceAvailabilityRequest,
        auth_token: Option<&str>,
    ) -> Result<Doctor, DoctorError> {
        debug!("Replacing availability for doctor: {}", doctor_id);

        if request.average_consulting_minutes == 0 {
            return Err(DoctorError::InvalidTemplate(
                "average consulting time must be positive".to_string(),
            ));
        }
        request.availability.validate()?;

        let update = json!({
            "availability": request.availability,
            "average_consulting_minutes": request.average_consulting_minutes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_doctor(doctor_id, update, auth_token).await
    }

    /// Record the blackout intervals for one date. An empty interval list is
    /// stored as-is: the override exists but blocks nothing.
    pub async fn set_leave_override(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        intervals: Vec<TimeRange>,
        auth_token: Option<&str>,
    ) -> Result<Doctor, DoctorError> {
        debug!("Setting leave override for doctor {} on {}", doctor_id, date);

        let mut doctor = self.get_doctor(doctor_id, auth_token).await?;
        doctor.leave_overrides.insert(date, intervals);

        let update = json!({
            "leave_overrides": doctor.leave_overrides,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_doctor(doctor_id, update, auth_token).await
    }

    async fn patch_doctor(
        &self,
        doctor_id: Uuid,
        update: Value,
        auth_token: Option<&str>,
    ) -> Result<Doctor, DoctorError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, auth_token, Some(update), Some(headers))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let mut doctors: Vec<Doctor> = parse_rows(result, "doctors");
        doctors.pop().ok_or(DoctorError::NotFound)
    }
}
