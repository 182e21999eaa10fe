//! Generic CRUD routes: `POST/GET /{resource}` and `GET/PATCH/DELETE /{resource}/:id`.
//!
//! Each route checks the `{resource}:{action}` permission, then hands the caller's tenancy to
//! [`CrudService`] as the access predicate.

use crate::error::ApiError;
use crate::extract::{record_id, ApiJson, Caller};
use crate::state::AppState;
use api_shared::auth::Action;
use api_shared::ListResponse;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use clinic_core::crud::{CrudService, Entity, Scope};
use clinic_core::models::{
    Branch, Clinic, Doctor, Hospital, Patient, Plan, Prescription, Referral, ReportSummary,
    Specialization, User,
};

/// An entity exposed through the generic routes.
pub trait Resource: Entity {
    /// Permission prefix, e.g. `"doctors"`.
    const RESOURCE: &'static str;
    /// Global records (no tenant) that every caller may read.
    const SHARED: bool = false;
}

macro_rules! resources {
    ($($ty:ty => $name:literal $(, shared = $shared:literal)?;)+) => {
        $(
            impl Resource for $ty {
                const RESOURCE: &'static str = $name;
                $(const SHARED: bool = $shared;)?
            }
        )+
    };
}

resources! {
    Clinic => "clinics";
    Branch => "branches";
    Hospital => "hospitals";
    Doctor => "doctors";
    Specialization => "specializations", shared = true;
    Patient => "patients";
    Plan => "plans", shared = true;
    Prescription => "prescriptions";
    ReportSummary => "reports";
    Referral => "referrals";
    User => "users";
}

fn readable<E: Resource>(caller: &Caller) -> impl Fn(&Scope) -> bool + '_ {
    move |scope| {
        if E::SHARED {
            caller.can_read(scope)
        } else {
            caller.can_access(scope)
        }
    }
}

/// Both generic routes for `path`.
pub fn routes<E: Resource>(path: &str) -> Router<AppState> {
    Router::new()
        .route(path, get(list::<E>).post(create::<E>))
        .route(&format!("{path}/:id"), item::<E>())
}

/// `GET/PATCH/DELETE` on a single record.
pub fn item<E: Resource>() -> axum::routing::MethodRouter<AppState> {
    get(fetch::<E>).patch(update::<E>).delete(remove::<E>)
}

pub async fn create<E: Resource>(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<E::Create>,
) -> Result<(StatusCode, Json<E>), ApiError> {
    caller.require(E::RESOURCE, Action::Create)?;
    let record = CrudService::<E>::new(state.store.clone()).create(input, Utc::now(), |s| {
        caller.can_access(s)
    })?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list<E: Resource>(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListResponse<E>>, ApiError> {
    caller.require(E::RESOURCE, Action::Read)?;
    let records = CrudService::<E>::new(state.store.clone()).list(readable::<E>(&caller))?;
    Ok(Json(records.into()))
}

pub async fn fetch<E: Resource>(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<E>, ApiError> {
    caller.require(E::RESOURCE, Action::Read)?;
    let id = record_id(&id)?;
    let record = CrudService::<E>::new(state.store.clone()).get(id, readable::<E>(&caller))?;
    Ok(Json(record))
}

pub async fn update<E: Resource>(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<E::Patch>,
) -> Result<Json<E>, ApiError> {
    caller.require(E::RESOURCE, Action::Update)?;
    let id = record_id(&id)?;
    let record = CrudService::<E>::new(state.store.clone()).patch(id, patch, Utc::now(), |s| {
        caller.can_access(s)
    })?;
    Ok(Json(record))
}

pub async fn remove<E: Resource>(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(E::RESOURCE, Action::Delete)?;
    let id = record_id(&id)?;
    CrudService::<E>::new(state.store.clone()).delete(id, Utc::now(), |s| caller.can_access(s))?;
    Ok(StatusCode::NO_CONTENT)
}
