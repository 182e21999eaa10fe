//! Subscription plans and the subscriptions clinics hold against them.

use super::{optional_text, patch_field};
use crate::crud::{Entity, Scope};
use crate::store::{Dataset, RecordMeta, Table};
use crate::{ClinicError, ClinicResult};
use chrono::{DateTime, Utc};
use clinic_types::NonEmptyText;
use clinic_uuid::RecordId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// PLAN
// ============================================================================

/// A purchasable subscription plan. Amounts are in minor currency units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Plan {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: NonEmptyText,
    pub description: Option<String>,
    pub price: u64,
    pub tax_percent: u32,
    pub duration_days: u32,
    pub booking_limit: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct PlanCreate {
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: Option<String>,
    pub price: u64,
    #[serde(default)]
    pub tax_percent: u32,
    pub duration_days: u32,
    pub booking_limit: u32,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct PlanPatch {
    pub name: Option<NonEmptyText>,
    pub description: Option<String>,
    pub price: Option<u64>,
    pub tax_percent: Option<u32>,
    pub duration_days: Option<u32>,
    pub booking_limit: Option<u32>,
    pub is_active: Option<bool>,
}

impl Plan {
    fn validate(&self) -> ClinicResult<()> {
        if self.tax_percent > 100 {
            return Err(ClinicError::InvalidInput(
                "tax_percent must be between 0 and 100".into(),
            ));
        }
        if self.duration_days == 0 {
            return Err(ClinicError::InvalidInput(
                "duration_days must be greater than zero".into(),
            ));
        }
        if self.booking_limit == 0 {
            return Err(ClinicError::InvalidInput(
                "booking_limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Entity for Plan {
    type Create = PlanCreate;
    type Patch = PlanPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.plans
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.plans
    }

    fn build(_ds: &Dataset, input: PlanCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        let plan = Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            name: input.name,
            description: optional_text(input.description),
            price: input.price,
            tax_percent: input.tax_percent,
            duration_days: input.duration_days,
            booking_limit: input.booking_limit,
            is_active: true,
        };
        plan.validate()?;
        Ok(plan)
    }

    fn apply(&mut self, _ds: &Dataset, patch: PlanPatch) -> ClinicResult<()> {
        patch_field(&mut self.name, patch.name);
        patch_field(&mut self.price, patch.price);
        patch_field(&mut self.tax_percent, patch.tax_percent);
        patch_field(&mut self.duration_days, patch.duration_days);
        patch_field(&mut self.booking_limit, patch.booking_limit);
        patch_field(&mut self.is_active, patch.is_active);
        if patch.description.is_some() {
            self.description = optional_text(patch.description);
        }
        self.validate()
    }

    fn scope(&self) -> Scope {
        Scope::global()
    }
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    FreeTrial,
    Paid,
}

/// Subscription lifecycle.
///
/// ```text
/// pending --(payment verified)--> active --(renewed)--> superseded
///    \--(verification failed)--> failed
/// ```
/// Free trials are created directly as `active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Failed,
    Superseded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClinicSubscription {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    /// `None` for the free trial.
    pub plan_id: Option<RecordId>,
    pub kind: SubscriptionKind,
    pub status: SubscriptionStatus,
    pub amount: u64,
    pub tax: u64,
    pub total: u64,
    pub currency: String,
    pub duration_days: u32,
    pub booking_limit: u32,
    pub remaining_bookings: u32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl ClinicSubscription {
    /// True when active and `now` falls inside `[starts_at, expires_at)`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.starts_at.is_some_and(|s| s <= now)
            && self.expires_at.is_some_and(|e| now < e)
    }

    pub fn scope(&self) -> Scope {
        Scope::clinic(self.clinic_id)
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct FreeTrialRequest {
    pub clinic_id: RecordId,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SubscriptionRequest {
    pub clinic_id: RecordId,
    pub plan_id: RecordId,
}

/// Callback payload sent by the checkout widget after payment.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct PaymentVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}
