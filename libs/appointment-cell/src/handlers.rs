// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{
    AppointmentStatus, BookAppointmentRequest, CompleteConsultationRequest,
    ReassignSessionRequest, SchedulerError,
};
use crate::services::{
    AppointmentLifecycleService, AppointmentStore, ArrivedPatientReassignment, BookingAllocator,
    DelayPropagationEngine, VacancyRecoveryEngine,
};

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            SchedulerError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            SchedulerError::NoSlotAvailable => {
                AppError::Conflict("No slot available".to_string())
            }
            SchedulerError::SlotTaken => {
                AppError::Conflict("Slot no longer available, please retry".to_string())
            }
            SchedulerError::InvalidTemplate(msg) => AppError::ValidationError(msg),
            SchedulerError::InvalidStatusTransition(status) => {
                AppError::BadRequest(format!("Appointment cannot leave status {}", status))
            }
            SchedulerError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let allocator = BookingAllocator::new(&state);
    let appointment = allocator
        .book_appointment(request, Some(auth.token()))
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_day_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, AppError> {
    let store = AppointmentStore::new(Arc::new(SupabaseClient::new(&state)));
    let appointments = store
        .day_appointments(query.doctor_id, query.date, Some(auth.token()))
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

/// Front-desk check-in: the patient has arrived.
#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let updated = transition_status(
        &state,
        appointment_id,
        AppointmentStatus::Confirmed,
        auth.token(),
    )
    .await?;

    Ok(Json(json!(updated)))
}

/// Consultation finished. The status change must succeed; the downstream
/// delay propagation is synchronous but its failure never rolls it back.
#[axum::debug_handler]
pub async fn complete_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CompleteConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    let completed = transition_status(
        &state,
        appointment_id,
        AppointmentStatus::Completed,
        auth.token(),
    )
    .await?;

    let engine = DelayPropagationEngine::new(&state);
    let shifted = match engine
        .on_consultation_completed(
            completed.doctor_id,
            completed.date,
            completed.id,
            request.actual_end_time,
            Some(auth.token()),
        )
        .await
    {
        Ok(count) => count,
        Err(e) => {
            warn!("Delay propagation failed for appointment {}: {}", appointment_id, e);
            0
        }
    };

    Ok(Json(json!({
        "appointment": completed,
        "shifted_appointments": shifted,
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    vacate_appointment(state, appointment_id, AppointmentStatus::Cancelled, auth.token()).await
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    vacate_appointment(state, appointment_id, AppointmentStatus::NoShow, auth.token()).await
}

/// Explicit reassignment trigger for the current date.
#[axum::debug_handler]
pub async fn reassign_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<ReassignSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let reassignment = ArrivedPatientReassignment::new(&state);
    let today = chrono::Utc::now().date_naive();
    let moved = reassignment
        .run_for_session(
            request.doctor_id,
            today,
            request.session_index,
            Some(auth.token()),
        )
        .await?;

    Ok(Json(json!({ "moved_appointments": moved })))
}

async fn transition_status(
    config: &Arc<AppConfig>,
    appointment_id: Uuid,
    new_status: AppointmentStatus,
    auth_token: &str,
) -> Result<crate::models::Appointment, SchedulerError> {
    let store = AppointmentStore::new(Arc::new(SupabaseClient::new(config)));
    let lifecycle = AppointmentLifecycleService::new();

    let current = store.get(appointment_id, Some(auth_token)).await?;
    lifecycle.validate_status_transition(&current.status, &new_status)?;

    store
        .set_status(appointment_id, new_status, Some(auth_token))
        .await
}

/// Shared cancel/no-show path: transition, recover downstream delay, then
/// kick off reassignment in the background.
async fn vacate_appointment(
    state: Arc<AppConfig>,
    appointment_id: Uuid,
    new_status: AppointmentStatus,
    auth_token: &str,
) -> Result<Json<Value>, AppError> {
    let vacated = transition_status(&state, appointment_id, new_status, auth_token).await?;

    let recovery = VacancyRecoveryEngine::new(&state);
    let recovered = match recovery
        .on_slot_vacated(
            vacated.doctor_id,
            vacated.date,
            vacated.slot_index,
            Some(auth_token),
        )
        .await
    {
        Ok(count) => count,
        Err(e) => {
            warn!("Vacancy recovery failed for appointment {}: {}", appointment_id, e);
            0
        }
    };

    // Best-effort: the vacated slot may let an arrived patient move up.
    let config = Arc::clone(&state);
    let token = auth_token.to_string();
    let doctor_id = vacated.doctor_id;
    let date = vacated.date;
    let session_index = vacated.session_index;
    tokio::spawn(async move {
        let reassignment = ArrivedPatientReassignment::new(&config);
        if let Err(e) = reassignment
            .run_for_session(doctor_id, date, session_index, Some(&token))
            .await
        {
            warn!("Background reassignment failed for doctor {}: {}", doctor_id, e);
        }
    });

    Ok(Json(json!({
        "appointment": vacated,
        "recovered_appointments": recovered,
    })))
}
