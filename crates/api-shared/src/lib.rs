//! # API Shared
//!
//! Shared definitions for the clinic APIs.
//!
//! Contains:
//! - Bearer-token authentication, roles and permissions ([`auth`])
//! - The health service
//! - The list envelope returned by every collection endpoint

pub mod auth;
pub mod health;

pub use health::{HealthRes, HealthService};

use serde::Serialize;

/// `{ "items": [...], "total": n }`
#[derive(Clone, Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}
