use crate::error::ApiError;
use crate::extract::{record_id, ApiJson, Caller};
use crate::state::AppState;
use api_shared::auth::Action;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use clinic_core::integrations::GeoLocation;
use clinic_core::models::{ClinicCreate, ClinicSubscription};
use clinic_core::services::clinics::{create_clinic_with_branch, ClinicWithBranch};
use clinic_core::services::subscriptions::clinic_current_subscription;
use clinic_core::ClinicError;
use clinic_types::PostalCode;

#[utoipa::path(
    post,
    path = "/clinics",
    request_body = ClinicCreate,
    responses(
        (status = 201, description = "Clinic and first branch created", body = ClinicWithBranch),
        (status = 400, description = "Invalid clinic or branch"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Missing clinics:create")
    ),
    security(("bearer" = []))
)]
/// Create a clinic together with its first branch.
///
/// Both records are written in one transaction; an invalid branch leaves no clinic behind.
#[axum::debug_handler]
pub async fn create_clinic(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<ClinicCreate>,
) -> Result<(StatusCode, Json<ClinicWithBranch>), ApiError> {
    caller.require("clinics", Action::Create)?;
    let created =
        create_clinic_with_branch(&state.store, input, Utc::now(), |s| caller.can_access(s))?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/clinics/{id}/subscription",
    params(("id" = String, Path, description = "Clinic id")),
    responses(
        (status = 200, description = "Current active subscription", body = ClinicSubscription),
        (status = 404, description = "Unknown clinic or no current subscription")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn current_subscription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ClinicSubscription>, ApiError> {
    caller.require("subscriptions", Action::Read)?;
    let clinic_id = record_id(&id)?;
    let subscription =
        clinic_current_subscription(&state.store, clinic_id, Utc::now(), |s| caller.can_access(s))?;
    Ok(Json(subscription))
}

#[utoipa::path(
    get,
    path = "/geocode/{postal_code}",
    params(("postal_code" = String, Path, description = "Postal code to resolve")),
    responses(
        (status = 200, description = "Resolved location", body = GeoLocation),
        (status = 400, description = "Malformed postal code"),
        (status = 404, description = "Unknown postal code"),
        (status = 502, description = "Geocoder unavailable or not configured")
    ),
    security(("bearer" = []))
)]
/// Resolve a postal code to coordinates for clinic and branch addresses.
#[axum::debug_handler]
pub async fn geocode(
    State(state): State<AppState>,
    caller: Caller,
    Path(postal_code): Path<String>,
) -> Result<Json<GeoLocation>, ApiError> {
    caller.require("clinics", Action::Read)?;
    let postal_code = PostalCode::parse(&postal_code).map_err(ClinicError::from)?;
    let location = state.geocoder()?.lookup(postal_code.as_str()).await?;
    Ok(Json(location))
}
