mod common;

use api_shared::auth::Role;
use axum::http::{Method, StatusCode};
use clinic_core::crud::Scope;
use common::{id, in_days, TestApp};
use serde_json::{json, Value};

struct Clinic {
    clinic_id: String,
    doctor_id: String,
    slots: Vec<String>,
}

/// Clinic with a doctor, two open 30-minute slots two days out and, optionally, a free trial.
async fn open_clinic(app: &TestApp, with_trial: bool) -> Clinic {
    let admin = app.admin();
    let (clinic_id, branch_id) = app.create_clinic("Sunrise Clinic").await;
    let doctor_id = app.create_doctor(&clinic_id, &branch_id).await;

    if with_trial {
        let (status, trial) = app
            .send(
                Method::POST,
                "/subscriptions/free-trial",
                Some(&admin),
                Some(json!({ "clinic_id": clinic_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{trial}");
    }

    let (status, created) = app
        .send(
            Method::POST,
            "/doctor-availabilities",
            Some(&admin),
            Some(json!({
                "doctor_id": doctor_id,
                "date": in_days(2),
                "start_time": "09:00:00",
                "end_time": "10:00:00",
                "slot_minutes": 30
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let slots = created["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();

    Clinic {
        clinic_id,
        doctor_id,
        slots,
    }
}

fn booking_body(slot_id: &str) -> Value {
    json!({
        "slot_id": slot_id,
        "patient": { "name": "Ravi Kumar", "phone": "98765 43210" },
        "reason": "Fever"
    })
}

#[tokio::test]
async fn test_availability_generates_slots() {
    let app = TestApp::new();
    let clinic = open_clinic(&app, false).await;
    assert_eq!(clinic.slots.len(), 2);

    let uri = format!("/doctor-time-slots?doctor_id={}&available=true", clinic.doctor_id);
    let (status, list) = app.send(Method::GET, &uri, Some(&app.admin()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 2);
    assert_eq!(list["items"][0]["start_time"], "09:00:00");
    assert_eq!(list["items"][1]["start_time"], "09:30:00");
}

#[tokio::test]
async fn test_booking_locks_slot_and_rejects_second_booking() {
    let app = TestApp::new();
    let clinic = open_clinic(&app, true).await;
    let scope = Scope::clinic(id(&clinic.clinic_id));
    let token = app.token(Role::Clinic, scope);

    let (status, booking) = app
        .send(
            Method::POST,
            "/patient-bookings",
            Some(&token),
            Some(booking_body(&clinic.slots[0])),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{booking}");
    assert_eq!(booking["status"], "booked");
    assert_eq!(booking["doctor_id"], clinic.doctor_id.as_str());

    let (status, body) = app
        .send(
            Method::POST,
            "/patient-bookings",
            Some(&token),
            Some(booking_body(&clinic.slots[0])),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("already booked"));

    let uri = format!("/doctor-time-slots?doctor_id={}&available=true", clinic.doctor_id);
    let (_, open) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(open["total"], 1);

    let uri = format!("/clinics/{}/subscription", clinic.clinic_id);
    let (status, subscription) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subscription["kind"], "free_trial");
    assert_eq!(subscription["remaining_bookings"], 49);

    let (_, patients) = app.send(Method::GET, "/patients", Some(&token), None).await;
    assert_eq!(patients["total"], 1);
}

#[tokio::test]
async fn test_booking_without_subscription_is_rejected() {
    let app = TestApp::new();
    let clinic = open_clinic(&app, false).await;

    let (status, _) = app
        .send(
            Method::POST,
            "/patient-bookings",
            Some(&app.admin()),
            Some(booking_body(&clinic.slots[0])),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let uri = format!("/doctor-time-slots?doctor_id={}&available=true", clinic.doctor_id);
    let (_, open) = app.send(Method::GET, &uri, Some(&app.admin()), None).await;
    assert_eq!(open["total"], 2, "a failed booking leaves the slot open");
}

#[tokio::test]
async fn test_reschedule_then_cancel_releases_slots() {
    let app = TestApp::new();
    let clinic = open_clinic(&app, true).await;
    let admin = app.admin();

    let (_, booking) = app
        .send(
            Method::POST,
            "/patient-bookings",
            Some(&admin),
            Some(booking_body(&clinic.slots[0])),
        )
        .await;
    let path = format!("/patient-bookings/{}", booking["id"].as_str().unwrap());

    let move_to = json!({ "slot_id": clinic.slots[1] });
    let (status, moved) = app
        .send(Method::PATCH, &path, Some(&admin), Some(move_to.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{moved}");
    assert_eq!(moved["slot_id"], clinic.slots[1].as_str());
    let (_, repeated) = app.send(Method::PATCH, &path, Some(&admin), Some(move_to)).await;
    assert_eq!(moved, repeated);

    let (status, _) = app.send(Method::DELETE, &path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(Method::GET, &path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/doctor-time-slots?doctor_id={}&available=true", clinic.doctor_id);
    let (_, open) = app.send(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(open["total"], 2);
}

#[tokio::test]
async fn test_booked_availability_cannot_be_deleted() {
    let app = TestApp::new();
    let clinic = open_clinic(&app, true).await;
    let admin = app.admin();

    let (_, booking) = app
        .send(
            Method::POST,
            "/patient-bookings",
            Some(&admin),
            Some(booking_body(&clinic.slots[0])),
        )
        .await;
    let uri = format!("/doctor-availabilities?doctor_id={}", clinic.doctor_id);
    let (_, availabilities) = app.send(Method::GET, &uri, Some(&admin), None).await;
    let availability_id = availabilities["items"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(booking["status"], "booked");

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/doctor-availabilities/{availability_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
