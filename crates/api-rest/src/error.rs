//! Mapping of domain and auth failures onto HTTP responses.
//!
//! Every error body is `{ "error": "<message>" }`. Internal failures are logged and answered
//! with a generic message.

use api_shared::auth::AuthError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clinic_core::ClinicError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Clinic(ClinicError),
    Auth(AuthError),
    BadRequest(String),
}

impl From<ClinicError> for ApiError {
    fn from(e: ClinicError) -> Self {
        Self::Clinic(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(e) if e.is_unauthenticated() => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::MissingPermission(_)) => StatusCode::FORBIDDEN,
            ApiError::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Clinic(e) => match e {
                ClinicError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                ClinicError::NotFound { .. } => StatusCode::NOT_FOUND,
                ClinicError::Forbidden => StatusCode::FORBIDDEN,
                ClinicError::SlotAlreadyBooked(_)
                | ClinicError::FreeTrialAlreadyUsed(_)
                | ClinicError::NoActiveSubscription(_)
                | ClinicError::BookingQuotaExhausted(_)
                | ClinicError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ClinicError::Gateway(_) => StatusCode::BAD_GATEWAY,
                ClinicError::DataDirCreation(_)
                | ClinicError::SnapshotRead(_)
                | ClinicError::SnapshotWrite(_)
                | ClinicError::YamlSerialization(_)
                | ClinicError::YamlDeserialization(_)
                | ClinicError::StorePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:?}", self);
            "internal error".to_string()
        } else {
            match &self {
                ApiError::Clinic(e) => e.to_string(),
                ApiError::Auth(e) => e.to_string(),
                ApiError::BadRequest(msg) => msg.clone(),
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
