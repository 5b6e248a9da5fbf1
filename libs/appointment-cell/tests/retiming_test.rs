// libs/appointment-cell/tests/retiming_test.rs
//
// The three retiming engines end-to-end against a mocked store: an overrun
// shifts the queue, a cancellation hands the delay back, and an arrived
// patient is pulled forward. Mirrors a front desk morning:
// 09:00-10:00 session, 20-minute consultations, slots 09:00/09:20/09:40.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::services::{
    ArrivedPatientReassignment, DelayPropagationEngine, VacancyRecoveryEngine,
};
use shared_utils::test_utils::TestConfig;
use shared_utils::{ClockTime, FixedClock};

const DOCTOR_ID: &str = "11111111-1111-1111-1111-111111111111";
const COMPLETED_ID: &str = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
const TRAILING_ID: &str = "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
}

fn doctor_json(session_end: &str, consulting_minutes: u16) -> serde_json::Value {
    json!({
        "id": DOCTOR_ID,
        "clinic_id": "clinic-1",
        "full_name": "Dr. Asha Rao",
        "specialty": "General Medicine",
        "average_consulting_minutes": consulting_minutes,
        "availability": {
            "monday": { "sessions": [ { "start": "09:00", "end": session_end } ] }
        },
        "leave_overrides": {},
        "consultation_status": "in",
        "created_at": "2025-01-06T08:00:00Z",
        "updated_at": "2025-01-06T08:00:00Z"
    })
}

fn appointment_json(
    id: &str,
    slot_index: i32,
    time: &str,
    status: &str,
    booked_via: &str,
    delay_minutes: i32,
    no_show_time: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "clinic_id": "clinic-1",
        "doctor_id": DOCTOR_ID,
        "doctor_name": "Dr. Asha Rao",
        "patient_name": format!("Patient {}", slot_index),
        "date": "2025-01-06",
        "time": time,
        "slot_index": slot_index,
        "session_index": 0,
        "token_number": slot_index + 1,
        "status": status,
        "booked_via": booked_via,
        "delay_minutes": delay_minutes,
        "cut_off_time": "08:45",
        "no_show_time": no_show_time,
        "created_at": "2025-01-06T08:00:00Z",
        "updated_at": "2025-01-06T08:00:00Z"
    })
}

async fn batch_bodies(mock_server: &MockServer) -> Vec<serde_json::Value> {
    mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/rest/v1/appointments")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

struct TestSetup {
    mock_server: MockServer,
    config: shared_config::AppConfig,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;
        let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
        Self { mock_server, config }
    }

    async fn mock_doctor(&self, doctor: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor]))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_day(&self, appointments: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(appointments))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_batch_write(&self) {
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(vec![json!({"ok": true})]))
            .mount(&self.mock_server)
            .await;
    }
}

// ==============================================================================
// DELAY PROPAGATION
// ==============================================================================

#[tokio::test]
async fn ten_minute_overrun_shifts_the_next_appointment() {
    let setup = TestSetup::new().await;
    setup.mock_doctor(doctor_json("10:00", 20)).await;
    setup
        .mock_day(vec![
            appointment_json(COMPLETED_ID, 1, "09:20", "completed", "walk_in", 0, "09:35"),
            appointment_json(TRAILING_ID, 2, "09:40", "confirmed", "advance", 0, "09:55"),
        ])
        .await;
    setup.mock_batch_write().await;

    let engine = DelayPropagationEngine::new(&setup.config);
    // Scheduled 09:20 + 20min = 09:40; actually ended 09:50.
    let shifted = engine
        .on_consultation_completed(
            Uuid::parse_str(DOCTOR_ID).unwrap(),
            monday(),
            Uuid::parse_str(COMPLETED_ID).unwrap(),
            ClockTime::new(9, 50).unwrap(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(shifted, 1);

    let bodies = batch_bodies(&setup.mock_server).await;
    assert_eq!(bodies.len(), 1);
    let rows = bodies[0].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(TRAILING_ID));
    assert_eq!(rows[0]["time"], json!("09:50"));
    assert_eq!(rows[0]["delay_minutes"], json!(10));
}

#[tokio::test]
async fn on_time_completion_writes_nothing() {
    let setup = TestSetup::new().await;
    setup.mock_doctor(doctor_json("10:00", 20)).await;
    setup
        .mock_day(vec![
            appointment_json(COMPLETED_ID, 1, "09:20", "completed", "walk_in", 0, "09:35"),
            appointment_json(TRAILING_ID, 2, "09:40", "confirmed", "advance", 0, "09:55"),
        ])
        .await;

    let engine = DelayPropagationEngine::new(&setup.config);
    let shifted = engine
        .on_consultation_completed(
            Uuid::parse_str(DOCTOR_ID).unwrap(),
            monday(),
            Uuid::parse_str(COMPLETED_ID).unwrap(),
            ClockTime::new(9, 40).unwrap(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(shifted, 0);
    assert!(batch_bodies(&setup.mock_server).await.is_empty());
}

// ==============================================================================
// VACANCY RECOVERY
// ==============================================================================

#[tokio::test]
async fn cancellation_hands_the_delay_back_but_not_the_time() {
    let setup = TestSetup::new().await;
    setup.mock_doctor(doctor_json("10:00", 20)).await;
    // The trailing appointment was already shifted to 09:50 with delay 10.
    setup
        .mock_day(vec![
            appointment_json(COMPLETED_ID, 1, "09:20", "cancelled", "advance", 0, "09:35"),
            appointment_json(TRAILING_ID, 2, "09:50", "confirmed", "advance", 10, "10:15"),
        ])
        .await;
    setup.mock_batch_write().await;

    let engine = VacancyRecoveryEngine::new(&setup.config);
    let recovered = engine
        .on_slot_vacated(Uuid::parse_str(DOCTOR_ID).unwrap(), monday(), 1, None)
        .await
        .unwrap();

    assert_eq!(recovered, 1);

    let bodies = batch_bodies(&setup.mock_server).await;
    let rows = bodies[0].as_array().unwrap();
    assert_eq!(rows[0]["id"], json!(TRAILING_ID));
    assert_eq!(rows[0]["delay_minutes"], json!(0));
    assert_eq!(rows[0]["no_show_time"], json!("10:05"));
    // The displayed time stays where propagation put it.
    assert_eq!(rows[0]["time"], json!("09:50"));
}

#[tokio::test]
async fn appointments_before_the_vacancy_are_untouched() {
    let setup = TestSetup::new().await;
    setup.mock_doctor(doctor_json("10:00", 20)).await;
    setup
        .mock_day(vec![
            appointment_json(COMPLETED_ID, 0, "09:00", "confirmed", "advance", 10, "09:25"),
            appointment_json(TRAILING_ID, 2, "09:40", "no_show", "advance", 0, "09:55"),
        ])
        .await;

    let engine = VacancyRecoveryEngine::new(&setup.config);
    let recovered = engine
        .on_slot_vacated(Uuid::parse_str(DOCTOR_ID).unwrap(), monday(), 2, None)
        .await
        .unwrap();

    assert_eq!(recovered, 0);
    assert!(batch_bodies(&setup.mock_server).await.is_empty());
}

// ==============================================================================
// ARRIVED-PATIENT REASSIGNMENT
// ==============================================================================

#[tokio::test]
async fn arrived_walk_in_is_pulled_into_the_vacated_slot() {
    let setup = TestSetup::new().await;
    // 09:00-11:00 on a 20-minute step: slots 09:00..10:40.
    setup.mock_doctor(doctor_json("11:00", 20)).await;
    setup
        .mock_day(vec![
            appointment_json(COMPLETED_ID, 0, "09:00", "cancelled", "advance", 0, "09:15"),
            appointment_json(TRAILING_ID, 3, "10:00", "confirmed", "walk_in", 0, "10:15"),
        ])
        .await;
    setup.mock_batch_write().await;

    let clock = FixedClock::at(monday(), ClockTime::new(9, 0).unwrap());
    let engine = ArrivedPatientReassignment::with_clock(&setup.config, Arc::new(clock));
    let moved = engine
        .run_for_session(Uuid::parse_str(DOCTOR_ID).unwrap(), monday(), 0, None)
        .await
        .unwrap();

    assert_eq!(moved, 1);

    let bodies = batch_bodies(&setup.mock_server).await;
    let rows = bodies[0].as_array().unwrap();
    assert_eq!(rows[0]["id"], json!(TRAILING_ID));
    assert_eq!(rows[0]["slot_index"], json!(0));
    assert_eq!(rows[0]["time"], json!("09:00"));
    assert_eq!(rows[0]["cut_off_time"], json!("08:45"));
    assert_eq!(rows[0]["no_show_time"], json!("09:15"));
    // Token travels with the patient.
    assert_eq!(rows[0]["token_number"], json!(4));
}

#[tokio::test]
async fn pending_patients_stay_where_they_are() {
    let setup = TestSetup::new().await;
    setup.mock_doctor(doctor_json("11:00", 20)).await;
    setup
        .mock_day(vec![appointment_json(
            TRAILING_ID,
            3,
            "10:00",
            "pending",
            "advance",
            0,
            "10:15",
        )])
        .await;

    let clock = FixedClock::at(monday(), ClockTime::new(9, 0).unwrap());
    let engine = ArrivedPatientReassignment::with_clock(&setup.config, Arc::new(clock));
    let moved = engine
        .run_for_session(Uuid::parse_str(DOCTOR_ID).unwrap(), monday(), 0, None)
        .await
        .unwrap();

    assert_eq!(moved, 0);
    assert!(batch_bodies(&setup.mock_server).await.is_empty());
}

#[tokio::test]
async fn reassignment_never_runs_for_a_future_date() {
    let setup = TestSetup::new().await;
    // No store mocks: a future date must short-circuit before any read.

    let clock = FixedClock::at(monday(), ClockTime::new(9, 0).unwrap());
    let engine = ArrivedPatientReassignment::with_clock(&setup.config, Arc::new(clock));
    let tomorrow = monday().succ_opt().unwrap();
    let moved = engine
        .run_for_session(Uuid::parse_str(DOCTOR_ID).unwrap(), tomorrow, 0, None)
        .await
        .unwrap();

    assert_eq!(moved, 0);
    assert!(setup.mock_server.received_requests().await.unwrap().is_empty());
}
