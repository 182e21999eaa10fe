//! # API REST
//!
//! REST API implementation for the clinic service.
//!
//! Handles:
//! - HTTP endpoints with axum, guarded by bearer tokens from `api-shared`
//! - Generic CRUD for plain records, dedicated handlers for bookings, scheduling and billing
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON error bodies, CORS)

#![warn(rust_2018_idioms)]

pub mod config;
pub mod crud;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use clinic_core::models::{
    Branch, Clinic, Doctor, Hospital, Patient, Plan, Prescription, Referral, ReportSummary,
    Specialization, User,
};
use handlers::{bookings, clinics, health, reminders, scheduling, subscriptions};
use tower_http::cors::CorsLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        clinics::create_clinic,
        clinics::current_subscription,
        clinics::geocode,
        scheduling::create_availability,
        scheduling::list_availabilities,
        scheduling::get_availability,
        scheduling::delete_availability,
        scheduling::list_slots,
        bookings::create_booking,
        bookings::list_bookings,
        bookings::get_booking,
        bookings::update_booking,
        bookings::cancel_booking,
        subscriptions::start_free_trial,
        subscriptions::create_subscription,
        subscriptions::verify_payment,
        subscriptions::list_subscriptions,
        subscriptions::get_subscription,
        reminders::poll_reminders,
    ),
    components(schemas(
        api_shared::HealthRes,
        clinic_core::models::Clinic,
        clinic_core::models::ClinicCreate,
        clinic_core::models::Branch,
        clinic_core::models::BranchDraft,
        clinic_core::models::DoctorAvailability,
        clinic_core::models::AvailabilityCreate,
        clinic_core::models::DoctorTimeSlot,
        clinic_core::models::PatientBooking,
        clinic_core::models::BookingCreate,
        clinic_core::models::BookingPatch,
        clinic_core::models::BookingStatus,
        clinic_core::models::PatientDetails,
        clinic_core::models::ClinicSubscription,
        clinic_core::models::SubscriptionKind,
        clinic_core::models::SubscriptionStatus,
        clinic_core::models::FreeTrialRequest,
        clinic_core::models::SubscriptionRequest,
        clinic_core::models::PaymentVerification,
        clinic_core::models::ReminderLog,
        clinic_core::models::ReminderStatus,
        clinic_core::integrations::GatewayOrder,
        clinic_core::integrations::GeoLocation,
        clinic_core::services::clinics::ClinicWithBranch,
        clinic_core::services::scheduling::AvailabilityWithSlots,
        clinic_core::services::subscriptions::SubscriptionCheckout,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// The complete REST router, including Swagger UI and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Organisation
        .route(
            "/clinics",
            get(crud::list::<Clinic>).post(clinics::create_clinic),
        )
        .route("/clinics/:id", crud::item::<Clinic>())
        .route("/clinics/:id/subscription", get(clinics::current_subscription))
        .merge(crud::routes::<Branch>("/branches"))
        .merge(crud::routes::<Hospital>("/hospitals"))
        .route("/geocode/:postal_code", get(clinics::geocode))
        // Directory
        .merge(crud::routes::<Doctor>("/doctors"))
        .merge(crud::routes::<Specialization>("/specializations"))
        .merge(crud::routes::<Patient>("/patients"))
        .merge(crud::routes::<User>("/users"))
        // Scheduling
        .route(
            "/doctor-availabilities",
            get(scheduling::list_availabilities).post(scheduling::create_availability),
        )
        .route(
            "/doctor-availabilities/:id",
            get(scheduling::get_availability).delete(scheduling::delete_availability),
        )
        .route("/doctor-time-slots", get(scheduling::list_slots))
        .route(
            "/patient-bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route(
            "/patient-bookings/:id",
            get(bookings::get_booking)
                .patch(bookings::update_booking)
                .delete(bookings::cancel_booking),
        )
        // Billing
        .merge(crud::routes::<Plan>("/plans"))
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::create_subscription),
        )
        .route("/subscriptions/free-trial", post(subscriptions::start_free_trial))
        .route("/subscriptions/verify", post(subscriptions::verify_payment))
        .route("/subscriptions/:id", get(subscriptions::get_subscription))
        // Clinical
        .merge(crud::routes::<Prescription>("/prescriptions"))
        .route("/prescriptions/reminders/poll", post(reminders::poll_reminders))
        .merge(crud::routes::<ReportSummary>("/report-summaries"))
        .merge(crud::routes::<Referral>("/referrals"))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
