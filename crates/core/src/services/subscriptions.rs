//! Free trials, paid plans and payment verification.
//!
//! A paid subscription is created `pending` together with a payment-gateway order. It becomes
//! `active` only after the checkout callback is verified: the HMAC signature must match and the
//! provider must report the payment as captured. Anything else marks it `failed`; gateway
//! problems during verification are recorded on the subscription rather than returned.
//!
//! Renewal carries unused time and booking quota forward: when a clinic still has a current
//! subscription, the new one extends from its expiry and adds its remaining bookings, and the
//! old one is marked `superseded`.

use super::visible_record;
use crate::config::CoreConfig;
use crate::constants::PAYMENT_STATUS_CAPTURED;
use crate::crud::Scope;
use crate::integrations::{GatewayOrder, PaymentGateway};
use crate::models::{
    ClinicSubscription, PaymentVerification, Plan, SubscriptionKind, SubscriptionStatus,
};
use crate::store::{Dataset, RecordMeta};
use crate::{ClinicError, ClinicResult, Store};
use chrono::{DateTime, Duration, Utc};
use clinic_uuid::RecordId;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// PRICING AND RENEWAL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct PriceBreakdown {
    pub amount: u64,
    pub tax: u64,
    pub total: u64,
}

/// Plan price plus tax, rounding the tax half-up to the nearest minor unit.
pub fn price_breakdown(plan: &Plan) -> PriceBreakdown {
    let scaled = u128::from(plan.price) * u128::from(plan.tax_percent);
    let tax = u64::try_from((scaled + 50) / 100).unwrap_or(u64::MAX);
    PriceBreakdown {
        amount: plan.price,
        tax,
        total: plan.price.saturating_add(tax),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenewalTerms {
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_bookings: u32,
}

/// Window and quota for a subscription activated at `now`.
///
/// An unexpired `last_active` subscription donates its remaining time and bookings.
pub fn renewal_terms(
    last_active: Option<&ClinicSubscription>,
    plan_days: u32,
    plan_limit: u32,
    now: DateTime<Utc>,
) -> RenewalTerms {
    let carried = last_active
        .filter(|s| s.status == SubscriptionStatus::Active)
        .and_then(|s| s.expires_at.filter(|e| *e > now).map(|e| (e, s.remaining_bookings)));

    let (base, remaining) = match carried {
        Some((expires_at, remaining)) => (expires_at, remaining.saturating_add(plan_limit)),
        None => (now, plan_limit),
    };

    RenewalTerms {
        starts_at: now,
        expires_at: base + Duration::days(i64::from(plan_days)),
        remaining_bookings: remaining,
    }
}

/// The clinic's active subscription whose window contains `now`, latest expiry first.
pub fn current_subscription(
    ds: &Dataset,
    clinic_id: RecordId,
    now: DateTime<Utc>,
) -> Option<&ClinicSubscription> {
    ds.subscriptions
        .live()
        .filter(|s| s.clinic_id == clinic_id && s.is_current(now))
        .max_by_key(|s| s.expires_at)
}

/// Activates `subscription_id` with `terms`, superseding whatever was current.
fn activate(
    ds: &mut Dataset,
    subscription_id: RecordId,
    superseded: Option<RecordId>,
    terms: RenewalTerms,
    now: DateTime<Utc>,
) -> ClinicResult<ClinicSubscription> {
    if let Some(previous) = superseded.filter(|p| *p != subscription_id) {
        let previous = ds.subscriptions.require_mut(previous)?;
        previous.status = SubscriptionStatus::Superseded;
        previous.meta.updated_at = now;
        tracing::info!("subscription {} superseded", previous.id);
    }

    let subscription = ds.subscriptions.require_mut(subscription_id)?;
    subscription.status = SubscriptionStatus::Active;
    subscription.starts_at = Some(terms.starts_at);
    subscription.expires_at = Some(terms.expires_at);
    subscription.remaining_bookings = terms.remaining_bookings;
    subscription.failure_reason = None;
    subscription.meta.updated_at = now;
    tracing::info!(
        "subscription {} active until {} with {} bookings",
        subscription.id,
        terms.expires_at,
        terms.remaining_bookings
    );
    Ok(subscription.clone())
}

// ============================================================================
// FREE TRIAL
// ============================================================================

/// Starts the clinic's one free trial.
///
/// Trial length and booking limit come from `cfg`. Any current subscription is superseded and
/// its unused time and bookings carry over.
///
/// # Errors
///
/// Returns `NotFound` if the clinic is missing or hidden from the caller, and
/// `FreeTrialAlreadyUsed` on every call after the first.
pub fn start_free_trial(
    store: &Store,
    cfg: &CoreConfig,
    clinic_id: RecordId,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<ClinicSubscription> {
    store.transaction(|ds| {
        let clinic = ds.clinics.require(clinic_id)?;
        if !access(&Scope::clinic(clinic.id)) {
            return Err(ClinicError::not_found("clinic", clinic_id));
        }

        let trial_exists = clinic.free_trial_used
            || ds
                .subscriptions
                .live()
                .any(|s| s.clinic_id == clinic_id && s.kind == SubscriptionKind::FreeTrial);
        if trial_exists {
            return Err(ClinicError::FreeTrialAlreadyUsed(clinic_id));
        }

        let current = current_subscription(ds, clinic_id, now);
        let previous = current.map(|s| s.id);
        let terms = renewal_terms(
            current,
            cfg.free_trial_days(),
            cfg.free_trial_booking_limit(),
            now,
        );

        let trial = ClinicSubscription {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id,
            plan_id: None,
            kind: SubscriptionKind::FreeTrial,
            status: SubscriptionStatus::Pending,
            amount: 0,
            tax: 0,
            total: 0,
            currency: cfg.currency().to_string(),
            duration_days: cfg.free_trial_days(),
            booking_limit: cfg.free_trial_booking_limit(),
            remaining_bookings: 0,
            starts_at: None,
            expires_at: None,
            gateway_order_id: None,
            gateway_payment_id: None,
            failure_reason: None,
        };
        let trial_id = ds.subscriptions.insert(trial).id;
        let trial = activate(ds, trial_id, previous, terms, now)?;

        let clinic = ds.clinics.require_mut(clinic_id)?;
        clinic.free_trial_used = true;
        clinic.meta.updated_at = now;

        tracing::info!("clinic {clinic_id} started its free trial");
        Ok(trial)
    })
}

// ============================================================================
// PAID SUBSCRIPTIONS
// ============================================================================

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct SubscriptionCheckout {
    pub subscription: ClinicSubscription,
    pub order: GatewayOrder,
}

/// Opens a gateway order for `plan_id` and records a pending subscription for it.
///
/// Nothing is stored if the gateway refuses the order.
///
/// # Arguments
///
/// * `store` - Store holding clinics, plans and subscriptions
/// * `gateway` - Payment gateway that creates the order
/// * `cfg` - Supplies the currency
/// * `clinic_id` - Clinic buying the plan
/// * `plan_id` - Plan being bought
/// * `now` - Creation time
/// * `access` - Tenancy predicate of the caller
///
/// # Returns
///
/// The pending subscription and the gateway order. The order receipt is the subscription id.
///
/// # Errors
///
/// Returns `ClinicError` if:
/// - the clinic is missing or hidden from the caller (`NotFound`)
/// - the plan is unknown or inactive (`InvalidInput`)
/// - the gateway call fails (`Gateway`)
pub async fn create_subscription(
    store: &Store,
    gateway: &dyn PaymentGateway,
    cfg: &CoreConfig,
    clinic_id: RecordId,
    plan_id: RecordId,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<SubscriptionCheckout> {
    let plan = store.read(|ds| -> ClinicResult<Plan> {
        let clinic = ds.clinics.require(clinic_id)?;
        if !access(&Scope::clinic(clinic.id)) {
            return Err(ClinicError::not_found("clinic", clinic_id));
        }
        let plan = ds.plans.reference(plan_id)?;
        if !plan.is_active {
            return Err(ClinicError::InvalidInput(format!(
                "plan {plan_id} is not available"
            )));
        }
        Ok(plan.clone())
    })??;

    let price = price_breakdown(&plan);
    let subscription_id = RecordId::new();
    let order = gateway
        .create_order(price.total, cfg.currency(), &subscription_id.to_string())
        .await?;

    let subscription = store.transaction(|ds| {
        ds.clinics.require(clinic_id)?;
        let pending = ClinicSubscription {
            id: subscription_id,
            meta: RecordMeta::new(now),
            clinic_id,
            plan_id: Some(plan.id),
            kind: SubscriptionKind::Paid,
            status: SubscriptionStatus::Pending,
            amount: price.amount,
            tax: price.tax,
            total: price.total,
            currency: cfg.currency().to_string(),
            duration_days: plan.duration_days,
            booking_limit: plan.booking_limit,
            remaining_bookings: 0,
            starts_at: None,
            expires_at: None,
            gateway_order_id: Some(order.id.clone()),
            gateway_payment_id: None,
            failure_reason: None,
        };
        Ok(ds.subscriptions.insert(pending).clone())
    })?;

    tracing::info!(
        "subscription {} pending on order {} for clinic {clinic_id}",
        subscription.id,
        order.id
    );
    Ok(SubscriptionCheckout {
        subscription,
        order,
    })
}

/// True when `signature` is the hex HMAC-SHA256 of `"{order_id}|{payment_id}"` under `key_secret`.
pub fn signature_matches(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Settles a checkout callback.
///
/// Verification failures are recorded as a `failed` subscription and returned as `Ok`; only a
/// missing subscription or a storage problem is an error.
///
/// # Arguments
///
/// * `store` - Store holding subscriptions
/// * `gateway` - Payment gateway used to fetch the payment
/// * `key_secret` - Secret the checkout signature is computed with
/// * `input` - Order id, payment id and signature from the checkout
/// * `now` - Activation time
/// * `access` - Tenancy predicate of the caller
///
/// # Returns
///
/// The subscription after settlement: `active` when the signature matches and the payment was
/// captured, otherwise `failed` with a `failure_reason`. An already active subscription is returned
/// unchanged.
///
/// # Errors
///
/// Returns `NotFound` when no visible subscription has the order id, and `InvalidState` when the
/// subscription has been superseded.
pub async fn verify_payment(
    store: &Store,
    gateway: &dyn PaymentGateway,
    key_secret: &str,
    input: PaymentVerification,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<ClinicSubscription> {
    let order_id = input.razorpay_order_id.trim().to_string();
    let payment_id = input.razorpay_payment_id.trim().to_string();

    let subscription = store.read(|ds| {
        ds.subscriptions
            .live()
            .find(|s| s.gateway_order_id.as_deref() == Some(order_id.as_str()))
            .filter(|s| access(&s.scope()))
            .cloned()
            .ok_or_else(|| ClinicError::not_found("subscription", &order_id))
    })??;

    match subscription.status {
        SubscriptionStatus::Active => return Ok(subscription),
        SubscriptionStatus::Superseded => {
            return Err(ClinicError::InvalidState(format!(
                "subscription {} has been superseded",
                subscription.id
            )))
        }
        SubscriptionStatus::Pending | SubscriptionStatus::Failed => {}
    }

    let signed = signature_matches(
        key_secret,
        &order_id,
        &payment_id,
        &input.razorpay_signature,
    );
    let verdict = if !signed {
        Err("payment signature mismatch".to_string())
    } else {
        match gateway.fetch_payment(&payment_id).await {
            Ok(payment) if payment.order_id.as_deref().is_some_and(|o| o != order_id) => {
                Err(format!("payment {payment_id} belongs to another order"))
            }
            Ok(payment) if payment.status == PAYMENT_STATUS_CAPTURED => Ok(()),
            Ok(payment) => Err(format!("payment status is {}", payment.status)),
            Err(e) => Err(format!("could not fetch payment: {e}")),
        }
    };

    store.transaction(|ds| {
        let stored = visible_record(
            &ds.subscriptions,
            subscription.id,
            ClinicSubscription::scope,
            &access,
        )?;
        if stored.status == SubscriptionStatus::Active {
            return Ok(stored);
        }

        match verdict {
            Ok(()) => {
                let current = current_subscription(ds, stored.clinic_id, now);
                let previous = current.map(|s| s.id);
                let terms = renewal_terms(current, stored.duration_days, stored.booking_limit, now);

                ds.subscriptions.require_mut(stored.id)?.gateway_payment_id = Some(payment_id);
                activate(ds, stored.id, previous, terms, now)
            }
            Err(reason) => {
                tracing::warn!(
                    "payment verification failed for subscription {}: {reason}",
                    stored.id
                );
                let failed = ds.subscriptions.require_mut(stored.id)?;
                failed.status = SubscriptionStatus::Failed;
                failed.gateway_payment_id = Some(payment_id);
                failed.failure_reason = Some(reason);
                failed.meta.updated_at = now;
                Ok(failed.clone())
            }
        }
    })
}

/// A live subscription visible to the caller, or `NotFound`.
pub fn get_subscription(
    store: &Store,
    id: RecordId,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<ClinicSubscription> {
    store.read(|ds| visible_record(&ds.subscriptions, id, ClinicSubscription::scope, &access))?
}

/// Subscriptions visible to the caller, optionally for one clinic, oldest first.
pub fn list_subscriptions(
    store: &Store,
    clinic_id: Option<RecordId>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<Vec<ClinicSubscription>> {
    store.read(|ds| {
        let mut items: Vec<ClinicSubscription> = ds
            .subscriptions
            .live()
            .filter(|s| clinic_id.is_none_or(|c| s.clinic_id == c))
            .filter(|s| access(&s.scope()))
            .cloned()
            .collect();
        items.sort_by_key(|s| s.meta.created_at);
        items
    })
}

/// The current subscription of a visible clinic, or `NotFound`.
pub fn clinic_current_subscription(
    store: &Store,
    clinic_id: RecordId,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<ClinicSubscription> {
    store.read(|ds| {
        if ds.clinics.get(clinic_id).is_none() || !access(&Scope::clinic(clinic_id)) {
            return Err(ClinicError::not_found("clinic", clinic_id));
        }
        current_subscription(ds, clinic_id, now)
            .cloned()
            .ok_or_else(|| ClinicError::not_found("subscription", clinic_id))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::GatewayPayment;
    use crate::services::fixtures::{allow_all, seed_subscription, seed_world};
    use async_trait::async_trait;
    use clinic_types::NonEmptyText;
    use std::sync::Mutex;

    const SECRET: &str = "test_key_secret";

    struct FakeGateway {
        payment_status: String,
        payment_order_id: Option<String>,
        fail_orders: bool,
        fail_payments: bool,
        orders: Mutex<u32>,
    }

    impl FakeGateway {
        fn new(payment_status: &str) -> Self {
            Self {
                payment_status: payment_status.into(),
                payment_order_id: None,
                fail_orders: false,
                fail_payments: false,
                orders: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_order(
            &self,
            amount: u64,
            currency: &str,
            receipt: &str,
        ) -> ClinicResult<GatewayOrder> {
            if self.fail_orders {
                return Err(ClinicError::Gateway("order rejected".into()));
            }
            let n = {
                let mut orders = self.orders.lock().unwrap();
                *orders += 1;
                *orders
            };
            Ok(GatewayOrder {
                id: format!("order_{n}"),
                amount,
                currency: currency.into(),
                receipt: receipt.into(),
                status: "created".into(),
            })
        }

        async fn fetch_payment(&self, payment_id: &str) -> ClinicResult<GatewayPayment> {
            if self.fail_payments {
                return Err(ClinicError::Gateway("payment lookup timed out".into()));
            }
            Ok(GatewayPayment {
                id: payment_id.into(),
                order_id: self.payment_order_id.clone(),
                status: self.payment_status.clone(),
                amount: 0,
            })
        }
    }

    fn sign(order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn plan(price: u64, tax_percent: u32) -> Plan {
        Plan {
            id: RecordId::new(),
            meta: RecordMeta::new(Utc::now()),
            name: NonEmptyText::new("Starter").unwrap(),
            description: None,
            price,
            tax_percent,
            duration_days: 30,
            booking_limit: 10,
            is_active: true,
        }
    }

    fn seed_plan(store: &Store) -> Plan {
        let plan = plan(99900, 18);
        store
            .transaction(|ds| Ok(ds.plans.insert(plan).clone()))
            .unwrap()
    }

    fn cfg() -> CoreConfig {
        CoreConfig::with_defaults("unused".into())
    }

    #[test]
    fn test_price_breakdown_rounds_tax_half_up() {
        assert_eq!(
            price_breakdown(&plan(99900, 18)),
            PriceBreakdown {
                amount: 99900,
                tax: 17982,
                total: 117882
            }
        );
        // 250 * 5% = 12.5 -> 13
        assert_eq!(price_breakdown(&plan(250, 5)).tax, 13);
        // 249 * 5% = 12.45 -> 12
        assert_eq!(price_breakdown(&plan(249, 5)).tax, 12);
    }

    #[test]
    fn test_renewal_carries_quota_and_extends_from_prior_expiry() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let id = seed_subscription(&store, world.clinic_id, now, 5);
        let last = store.read(|ds| ds.subscriptions.get(id).cloned().unwrap()).unwrap();

        let terms = renewal_terms(Some(&last), 30, 10, now);

        assert_eq!(terms.remaining_bookings, 15);
        assert_eq!(terms.starts_at, now);
        assert_eq!(Some(terms.expires_at), last.expires_at.map(|e| e + Duration::days(30)));
    }

    #[test]
    fn test_renewal_after_expiry_starts_from_now() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let id = seed_subscription(&store, world.clinic_id, now - Duration::days(60), 5);
        let expired = store.read(|ds| ds.subscriptions.get(id).cloned().unwrap()).unwrap();

        let terms = renewal_terms(Some(&expired), 30, 10, now);

        assert_eq!(terms.remaining_bookings, 10);
        assert_eq!(terms.expires_at, now + Duration::days(30));
    }

    #[test]
    fn test_free_trial_only_once() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);

        let trial = start_free_trial(&store, &cfg(), world.clinic_id, now, allow_all)
            .expect("first trial should start");
        assert_eq!(trial.status, SubscriptionStatus::Active);
        assert_eq!(trial.remaining_bookings, cfg().free_trial_booking_limit());
        assert_eq!(
            trial.expires_at,
            Some(now + Duration::days(i64::from(cfg().free_trial_days())))
        );

        let err = start_free_trial(&store, &cfg(), world.clinic_id, now, allow_all)
            .expect_err("second trial must be refused");
        assert!(matches!(err, ClinicError::FreeTrialAlreadyUsed(_)));
    }

    #[test]
    fn test_signature_matches_only_exact_digest() {
        let good = sign("order_1", "pay_1");
        assert!(signature_matches(SECRET, "order_1", "pay_1", &good));
        assert!(!signature_matches(SECRET, "order_1", "pay_2", &good));
        assert!(!signature_matches("other", "order_1", "pay_1", &good));
        assert!(!signature_matches(SECRET, "order_1", "pay_1", "not-hex"));
    }

    #[tokio::test]
    async fn test_verified_payment_activates_and_supersedes() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let previous = seed_subscription(&store, world.clinic_id, now, 5);
        let plan = seed_plan(&store);
        let gateway = FakeGateway::new("captured");

        let checkout = create_subscription(
            &store,
            &gateway,
            &cfg(),
            world.clinic_id,
            plan.id,
            now,
            allow_all,
        )
        .await
        .expect("checkout should be created");
        assert_eq!(checkout.subscription.status, SubscriptionStatus::Pending);
        assert_eq!(checkout.order.amount, 117882);
        assert_eq!(checkout.order.receipt, checkout.subscription.id.to_string());

        let verified = verify_payment(
            &store,
            &gateway,
            SECRET,
            PaymentVerification {
                razorpay_order_id: checkout.order.id.clone(),
                razorpay_payment_id: "pay_1".into(),
                razorpay_signature: sign(&checkout.order.id, "pay_1"),
            },
            now,
            allow_all,
        )
        .await
        .unwrap();

        assert_eq!(verified.status, SubscriptionStatus::Active);
        assert_eq!(verified.remaining_bookings, 15);
        assert_eq!(verified.gateway_payment_id.as_deref(), Some("pay_1"));
        let old = store.read(|ds| ds.subscriptions.get(previous).unwrap().status).unwrap();
        assert_eq!(old, SubscriptionStatus::Superseded);
        let current = store
            .read(|ds| current_subscription(ds, world.clinic_id, now).map(|s| s.id))
            .unwrap();
        assert_eq!(current, Some(verified.id));
    }

    #[tokio::test]
    async fn test_bad_signature_marks_subscription_failed() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let plan = seed_plan(&store);
        let gateway = FakeGateway::new("captured");

        let checkout = create_subscription(
            &store,
            &gateway,
            &cfg(),
            world.clinic_id,
            plan.id,
            now,
            allow_all,
        )
        .await
        .unwrap();
        let result = verify_payment(
            &store,
            &gateway,
            SECRET,
            PaymentVerification {
                razorpay_order_id: checkout.order.id.clone(),
                razorpay_payment_id: "pay_1".into(),
                razorpay_signature: sign(&checkout.order.id, "pay_forged"),
            },
            now,
            allow_all,
        )
        .await
        .unwrap();

        assert_eq!(result.status, SubscriptionStatus::Failed);
        assert!(result.failure_reason.is_some());
        assert_eq!(result.expires_at, None);
    }

    #[tokio::test]
    async fn test_uncaptured_payment_marks_subscription_failed() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let plan = seed_plan(&store);
        let gateway = FakeGateway::new("authorized");

        let checkout = create_subscription(
            &store,
            &gateway,
            &cfg(),
            world.clinic_id,
            plan.id,
            now,
            allow_all,
        )
        .await
        .unwrap();
        let result = verify_payment(
            &store,
            &gateway,
            SECRET,
            PaymentVerification {
                razorpay_order_id: checkout.order.id.clone(),
                razorpay_payment_id: "pay_1".into(),
                razorpay_signature: sign(&checkout.order.id, "pay_1"),
            },
            now,
            allow_all,
        )
        .await
        .unwrap();

        assert_eq!(result.status, SubscriptionStatus::Failed);
        assert_eq!(result.failure_reason.as_deref(), Some("payment status is authorized"));
    }

    #[tokio::test]
    async fn test_gateway_refusal_stores_nothing() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let plan = seed_plan(&store);
        let mut gateway = FakeGateway::new("captured");
        gateway.fail_orders = true;

        let err = create_subscription(
            &store,
            &gateway,
            &cfg(),
            world.clinic_id,
            plan.id,
            now,
            allow_all,
        )
        .await
        .expect_err("gateway refusal should surface");
        assert!(matches!(err, ClinicError::Gateway(_)));
        assert_eq!(store.read(|ds| ds.subscriptions.live().count()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let store = Store::in_memory();
        let gateway = FakeGateway::new("captured");
        let err = verify_payment(
            &store,
            &gateway,
            SECRET,
            PaymentVerification {
                razorpay_order_id: "order_missing".into(),
                razorpay_payment_id: "pay_1".into(),
                razorpay_signature: sign("order_missing", "pay_1"),
            },
            Utc::now(),
            allow_all,
        )
        .await
        .expect_err("unknown order");
        assert!(matches!(err, ClinicError::NotFound { .. }));
    }

    fn signed(order_id: &str, payment_id: &str) -> PaymentVerification {
        PaymentVerification {
            razorpay_order_id: order_id.into(),
            razorpay_payment_id: payment_id.into(),
            razorpay_signature: sign(order_id, payment_id),
        }
    }

    #[tokio::test]
    async fn test_gateway_error_during_verify_marks_failed() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let plan = seed_plan(&store);
        let mut gateway = FakeGateway::new("captured");
        gateway.fail_payments = true;

        let checkout = create_subscription(
            &store,
            &gateway,
            &cfg(),
            world.clinic_id,
            plan.id,
            now,
            allow_all,
        )
        .await
        .unwrap();
        let result = verify_payment(
            &store,
            &gateway,
            SECRET,
            signed(&checkout.order.id, "pay_1"),
            now,
            allow_all,
        )
        .await
        .expect("gateway errors are recorded, not returned");

        assert_eq!(result.status, SubscriptionStatus::Failed);
        let reason = result.failure_reason.unwrap_or_default();
        assert!(reason.starts_with("could not fetch payment"), "{reason}");
        assert!(reason.contains("timed out"), "{reason}");
        let stored = store
            .read(|ds| ds.subscriptions.get(result.id).unwrap().status)
            .unwrap();
        assert_eq!(stored, SubscriptionStatus::Failed);
    }

    #[tokio::test]
    async fn test_payment_for_another_order_marks_failed() {
        let now = Utc::now();
        let store = Store::in_memory();
        let world = seed_world(&store, now);
        let plan = seed_plan(&store);
        let mut gateway = FakeGateway::new("captured");
        gateway.payment_order_id = Some("order_elsewhere".into());

        let checkout = create_subscription(
            &store,
            &gateway,
            &cfg(),
            world.clinic_id,
            plan.id,
            now,
            allow_all,
        )
        .await
        .unwrap();
        let result = verify_payment(
            &store,
            &gateway,
            SECRET,
            signed(&checkout.order.id, "pay_1"),
            now,
            allow_all,
        )
        .await
        .unwrap();

        assert_eq!(result.status, SubscriptionStatus::Failed);
        assert_eq!(
            result.failure_reason.as_deref(),
            Some("payment pay_1 belongs to another order")
        );
        assert_eq!(result.expires_at, None);
    }
}
