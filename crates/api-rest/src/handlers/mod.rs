//! Handlers for the routes that do more than generic CRUD.

pub mod bookings;
pub mod clinics;
pub mod health;
pub mod reminders;
pub mod scheduling;
pub mod subscriptions;
