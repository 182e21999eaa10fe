use crate::error::ApiError;
use crate::extract::{record_id, ApiJson, ApiQuery, Caller};
use crate::state::AppState;
use api_shared::auth::Action;
use api_shared::ListResponse;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use clinic_core::models::{AvailabilityCreate, DoctorAvailability, DoctorTimeSlot, SlotFilter};
use clinic_core::services::scheduling::{self, AvailabilityWithSlots};
use clinic_uuid::RecordId;
use serde::Deserialize;

const RESOURCE: &str = "availability";

#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Option<RecordId>,
}

#[utoipa::path(
    post,
    path = "/doctor-availabilities",
    request_body = AvailabilityCreate,
    responses(
        (status = 201, description = "Availability and its slots", body = AvailabilityWithSlots),
        (status = 400, description = "Invalid window or slot length"),
        (status = 422, description = "Overlaps an existing availability")
    ),
    security(("bearer" = []))
)]
/// Open a doctor's availability window and cut it into bookable slots.
#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<AvailabilityCreate>,
) -> Result<(StatusCode, Json<AvailabilityWithSlots>), ApiError> {
    caller.require(RESOURCE, Action::Create)?;
    let created =
        scheduling::create_availability(&state.store, input, Utc::now(), |s| caller.can_access(s))?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/doctor-availabilities",
    params(("doctor_id" = Option<String>, Query, description = "Only this doctor's windows")),
    responses((status = 200, description = "`{ items, total }` of availabilities")),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn list_availabilities(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<AvailabilityQuery>,
) -> Result<Json<ListResponse<DoctorAvailability>>, ApiError> {
    caller.require(RESOURCE, Action::Read)?;
    let items =
        scheduling::list_availabilities(&state.store, query.doctor_id, |s| caller.can_access(s))?;
    Ok(Json(items.into()))
}

#[utoipa::path(
    get,
    path = "/doctor-availabilities/{id}",
    params(("id" = String, Path, description = "Availability id")),
    responses(
        (status = 200, description = "Availability", body = DoctorAvailability),
        (status = 404, description = "Not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<DoctorAvailability>, ApiError> {
    caller.require(RESOURCE, Action::Read)?;
    let id = record_id(&id)?;
    let availability = scheduling::get_availability(&state.store, id, |s| caller.can_access(s))?;
    Ok(Json(availability))
}

#[utoipa::path(
    delete,
    path = "/doctor-availabilities/{id}",
    params(("id" = String, Path, description = "Availability id")),
    responses(
        (status = 204, description = "Availability and its slots deleted"),
        (status = 404, description = "Not found"),
        (status = 422, description = "A slot in the window is booked")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(RESOURCE, Action::Delete)?;
    let id = record_id(&id)?;
    scheduling::delete_availability(&state.store, id, Utc::now(), |s| caller.can_access(s))?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/doctor-time-slots",
    params(
        ("doctor_id" = Option<String>, Query, description = "Only this doctor's slots"),
        ("date" = Option<String>, Query, description = "Only slots on this date (YYYY-MM-DD)"),
        ("available" = Option<bool>, Query, description = "Only unbooked slots")
    ),
    responses((status = 200, description = "`{ items, total }` of slots by date and start")),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(filter): ApiQuery<SlotFilter>,
) -> Result<Json<ListResponse<DoctorTimeSlot>>, ApiError> {
    caller.require(RESOURCE, Action::Read)?;
    let slots = scheduling::list_slots(&state.store, &filter, |s| caller.can_access(s))?;
    Ok(Json(slots.into()))
}
