use crate::error::ApiError;
use crate::extract::{record_id, ApiJson, ApiQuery, Caller};
use crate::state::AppState;
use api_shared::auth::Action;
use api_shared::ListResponse;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use clinic_core::models::{BookingCreate, BookingFilter, BookingPatch, PatientBooking};
use clinic_core::services::booking;

const RESOURCE: &str = "bookings";

#[utoipa::path(
    post,
    path = "/patient-bookings",
    request_body = BookingCreate,
    responses(
        (status = 201, description = "Booking created and slot locked", body = PatientBooking),
        (status = 400, description = "Invalid input or slot in the past"),
        (status = 404, description = "Unknown slot or patient"),
        (status = 422, description = "Slot already booked, or no usable subscription")
    ),
    security(("bearer" = []))
)]
/// Book a slot for a patient.
///
/// The patient is either referenced by id or matched by phone within the clinic, and created
/// when no match exists. The slot is locked and one booking is taken from the clinic's quota.
#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<BookingCreate>,
) -> Result<(StatusCode, Json<PatientBooking>), ApiError> {
    caller.require(RESOURCE, Action::Create)?;
    let created =
        booking::create_booking(&state.store, input, Utc::now(), |s| caller.can_access(s))?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/patient-bookings",
    params(
        ("doctor_id" = Option<String>, Query, description = "Only this doctor's bookings"),
        ("patient_id" = Option<String>, Query, description = "Only this patient's bookings"),
        ("status" = Option<String>, Query, description = "booked, cancelled, completed or no_show")
    ),
    responses((status = 200, description = "`{ items, total }` of bookings")),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn list_bookings(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(filter): ApiQuery<BookingFilter>,
) -> Result<Json<ListResponse<PatientBooking>>, ApiError> {
    caller.require(RESOURCE, Action::Read)?;
    let items = booking::list_bookings(&state.store, &filter, |s| caller.can_access(s))?;
    Ok(Json(items.into()))
}

#[utoipa::path(
    get,
    path = "/patient-bookings/{id}",
    params(("id" = String, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking", body = PatientBooking),
        (status = 404, description = "Not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<PatientBooking>, ApiError> {
    caller.require(RESOURCE, Action::Read)?;
    let id = record_id(&id)?;
    Ok(Json(booking::get_booking(&state.store, id, |s| caller.can_access(s))?))
}

#[utoipa::path(
    patch,
    path = "/patient-bookings/{id}",
    params(("id" = String, Path, description = "Booking id")),
    request_body = BookingPatch,
    responses(
        (status = 200, description = "Updated booking", body = PatientBooking),
        (status = 404, description = "Not found"),
        (status = 422, description = "Booking cancelled or target slot unavailable")
    ),
    security(("bearer" = []))
)]
/// Reschedule, change status or edit notes. Repeating an identical update changes nothing.
#[axum::debug_handler]
pub async fn update_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<BookingPatch>,
) -> Result<Json<PatientBooking>, ApiError> {
    caller.require(RESOURCE, Action::Update)?;
    let id = record_id(&id)?;
    let updated =
        booking::update_booking(&state.store, id, patch, Utc::now(), |s| caller.can_access(s))?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/patient-bookings/{id}",
    params(("id" = String, Path, description = "Booking id")),
    responses(
        (status = 204, description = "Booking cancelled, slot released"),
        (status = 404, description = "Not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(RESOURCE, Action::Delete)?;
    let id = record_id(&id)?;
    booking::cancel_booking(&state.store, id, Utc::now(), |s| caller.can_access(s))?;
    Ok(StatusCode::NO_CONTENT)
}
