use crate::error::ApiError;
use crate::extract::{record_id, ApiJson, ApiQuery, Caller};
use crate::state::AppState;
use api_shared::auth::Action;
use api_shared::ListResponse;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use clinic_core::models::{
    ClinicSubscription, FreeTrialRequest, PaymentVerification, SubscriptionRequest,
};
use clinic_core::services::subscriptions::{self, SubscriptionCheckout};
use clinic_core::ClinicError;
use clinic_uuid::RecordId;
use serde::Deserialize;

const RESOURCE: &str = "subscriptions";

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    pub clinic_id: Option<RecordId>,
}

#[utoipa::path(
    post,
    path = "/subscriptions/free-trial",
    request_body = FreeTrialRequest,
    responses(
        (status = 201, description = "Free trial activated", body = ClinicSubscription),
        (status = 404, description = "Unknown clinic"),
        (status = 422, description = "Clinic already used its free trial")
    ),
    security(("bearer" = []))
)]
/// Start the clinic's one-time free trial.
#[axum::debug_handler]
pub async fn start_free_trial(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<FreeTrialRequest>,
) -> Result<(StatusCode, Json<ClinicSubscription>), ApiError> {
    caller.require(RESOURCE, Action::Create)?;
    let trial = subscriptions::start_free_trial(
        &state.store,
        &state.cfg,
        input.clinic_id,
        Utc::now(),
        |s| caller.can_access(s),
    )?;
    Ok((StatusCode::CREATED, Json(trial)))
}

#[utoipa::path(
    post,
    path = "/subscriptions",
    request_body = SubscriptionRequest,
    responses(
        (status = 201, description = "Pending subscription and order", body = SubscriptionCheckout),
        (status = 404, description = "Unknown clinic or plan"),
        (status = 502, description = "Payment gateway failed or is not configured")
    ),
    security(("bearer" = []))
)]
/// Buy a plan: prices it, opens a gateway order and records a pending subscription.
#[axum::debug_handler]
pub async fn create_subscription(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<SubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionCheckout>), ApiError> {
    caller.require(RESOURCE, Action::Create)?;
    let checkout = subscriptions::create_subscription(
        &state.store,
        state.payments()?,
        &state.cfg,
        input.clinic_id,
        input.plan_id,
        Utc::now(),
        |s| caller.can_access(s),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

#[utoipa::path(
    post,
    path = "/subscriptions/verify",
    request_body = PaymentVerification,
    responses(
        (status = 200, description = "Active, or `failed`", body = ClinicSubscription),
        (status = 404, description = "No subscription for the order")
    ),
    security(("bearer" = []))
)]
/// Check the checkout callback and activate the subscription when the payment is captured.
#[axum::debug_handler]
pub async fn verify_payment(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<PaymentVerification>,
) -> Result<Json<ClinicSubscription>, ApiError> {
    caller.require(RESOURCE, Action::Create)?;
    let key_secret = state
        .cfg
        .payment_key_secret()
        .ok_or_else(|| ClinicError::Gateway("payment key secret is not configured".into()))?;
    let subscription = subscriptions::verify_payment(
        &state.store,
        state.payments()?,
        key_secret,
        input,
        Utc::now(),
        |s| caller.can_access(s),
    )
    .await?;
    Ok(Json(subscription))
}

#[utoipa::path(
    get,
    path = "/subscriptions",
    params(("clinic_id" = Option<String>, Query, description = "Only this clinic's subscriptions")),
    responses((status = 200, description = "`{ items, total }` of subscriptions")),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<SubscriptionQuery>,
) -> Result<Json<ListResponse<ClinicSubscription>>, ApiError> {
    caller.require(RESOURCE, Action::Read)?;
    let items =
        subscriptions::list_subscriptions(&state.store, query.clinic_id, |s| caller.can_access(s))?;
    Ok(Json(items.into()))
}

#[utoipa::path(
    get,
    path = "/subscriptions/{id}",
    params(("id" = String, Path, description = "Subscription id")),
    responses(
        (status = 200, description = "Subscription", body = ClinicSubscription),
        (status = 404, description = "Not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_subscription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ClinicSubscription>, ApiError> {
    caller.require(RESOURCE, Action::Read)?;
    let id = record_id(&id)?;
    Ok(Json(subscriptions::get_subscription(&state.store, id, |s| caller.can_access(s))?))
}
