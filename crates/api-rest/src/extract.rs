//! Request extractors: the authenticated caller and JSON/query bodies whose rejections use the
//! API error format.

use crate::error::ApiError;
use crate::state::AppState;
use api_shared::auth::{bearer_token, Action, AuthError, Claims, ALL_PERMISSIONS};
use axum::extract::{FromRequest, FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use clinic_core::crud::Scope;
use clinic_core::ClinicError;
use clinic_uuid::RecordId;

/// The verified claims of the bearer token on the request.
#[derive(Clone, Debug)]
pub struct Caller(pub Claims);

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = bearer_token(header)?;
        let claims = state.tokens.codec().verify(token, Utc::now())?;
        Ok(Caller(claims))
    }
}

impl Caller {
    pub fn require(&self, resource: &str, action: Action) -> Result<(), ApiError> {
        self.0.require(resource, action).map_err(ApiError::from)
    }

    /// Operator-only routes need the wildcard permission.
    pub fn require_all(&self) -> Result<(), ApiError> {
        if self.0.permissions.iter().any(|p| p == ALL_PERMISSIONS) {
            Ok(())
        } else {
            Err(AuthError::MissingPermission(ALL_PERMISSIONS.into()).into())
        }
    }

    pub fn can_access(&self, scope: &Scope) -> bool {
        self.0.can_access(scope)
    }

    pub fn can_read(&self, scope: &Scope) -> bool {
        self.0.can_read(scope)
    }
}

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Parses a path id; anything but the canonical form is a 400.
pub fn record_id(raw: &str) -> Result<RecordId, ApiError> {
    RecordId::parse(raw).map_err(|e| ClinicError::from(e).into())
}
