#![allow(dead_code)]

use api_rest::{build_router, AppState};
use api_shared::auth::{Claims, Role, TokenConfig};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use clinic_core::crud::Scope;
use clinic_core::{CoreConfig, Store};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

pub const TOKEN_SECRET: &str = "integration-test-secret";
pub const PAYMENT_SECRET: &str = "integration-payment-secret";

pub struct TestApp {
    pub router: Router,
    tokens: TokenConfig,
}

pub fn state() -> AppState {
    let cfg = CoreConfig::with_defaults(PathBuf::from("unused"))
        .with_payment_key_secret(Some(PAYMENT_SECRET.into()));
    let tokens = TokenConfig::new(TOKEN_SECRET, 24).unwrap();
    AppState::new(Arc::new(Store::in_memory()), Arc::new(cfg), tokens)
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_state(state())
    }

    pub fn with_state(state: AppState) -> Self {
        let tokens = (*state.tokens).clone();
        Self {
            router: build_router(state),
            tokens,
        }
    }

    pub fn token(&self, role: Role, scope: Scope) -> String {
        let claims = Claims::new("tester", role, scope, Utc::now(), 1);
        self.tokens.codec().issue(&claims).unwrap()
    }

    pub fn admin(&self) -> String {
        self.token(Role::SuperAdmin, Scope::global())
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Creates a clinic with its first branch and returns `(clinic_id, branch_id)`.
    pub async fn create_clinic(&self, name: &str) -> (String, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/clinics",
                Some(&self.admin()),
                Some(json!({
                    "name": name,
                    "email": "desk@sunrise.example",
                    "phone": "+91 98123 45678",
                    "first_branch": { "name": "Main" }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["clinic"]["id"].as_str().unwrap().to_string(),
            body["branch"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub async fn create_doctor(&self, clinic_id: &str, branch_id: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/doctors",
                Some(&self.admin()),
                Some(json!({
                    "clinic_id": clinic_id,
                    "branch_id": branch_id,
                    "name": "Dr. Meera Rao",
                    "consultation_fee": 50000
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

pub fn in_days(days: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(days)
}

pub fn id(value: &str) -> clinic_uuid::RecordId {
    clinic_uuid::RecordId::parse(value).unwrap()
}
