//! # Clinic Core
//!
//! Core business logic for the clinic management service.
//!
//! This crate contains the data model and every operation on it:
//! - Validated domain records for clinics, doctors, patients, bookings and subscriptions
//! - A transactional, snapshot-persisted [`Store`]
//! - Generic CRUD ([`crud`]) plus the multi-step services ([`services`])
//! - Traits for the external integrations ([`integrations`])
//!
//! **No API concerns**: authentication and HTTP servers belong in `api-shared` and `api-rest`.

pub mod config;
pub mod constants;
pub mod crud;
pub mod error;
pub mod integrations;
pub mod models;
pub mod services;
pub mod store;

pub use config::CoreConfig;
pub use error::{ClinicError, ClinicResult};
pub use store::Store;
