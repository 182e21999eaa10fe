use api_shared::{HealthRes, HealthService};
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks; needs no token.
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}
