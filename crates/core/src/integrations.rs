//! Seams to third-party services.
//!
//! The core only talks to payment, geocoding and messaging providers through these traits; the
//! HTTP implementations live in `clinic-gateways`, and tests plug in in-memory fakes.

use crate::ClinicResult;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use clinic_uuid::RecordId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// An order created with the payment provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
}

/// A payment as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoLocation {
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: Option<String>,
}

/// One medication reminder addressed to a patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub prescription_id: RecordId,
    pub patient_id: RecordId,
    pub patient_name: String,
    pub phone: String,
    pub medication: String,
    pub dosage: String,
    pub scheduled_for: NaiveDateTime,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an order for `amount` minor units.
    async fn create_order(&self, amount: u64, currency: &str, receipt: &str)
        -> ClinicResult<GatewayOrder>;

    async fn fetch_payment(&self, payment_id: &str) -> ClinicResult<GatewayPayment>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves a postal code; an unknown code is `NotFound`.
    async fn lookup(&self, postal_code: &str) -> ClinicResult<GeoLocation>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &ReminderMessage) -> ClinicResult<()>;
}
