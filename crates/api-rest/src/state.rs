use api_shared::auth::TokenConfig;
use clinic_core::integrations::{Geocoder, MessageSender, PaymentGateway};
use clinic_core::{ClinicError, ClinicResult, CoreConfig, Store};
use std::sync::Arc;

/// Application state shared by every handler.
///
/// The external integrations are optional; a route that needs one that is not configured
/// answers 502.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub cfg: Arc<CoreConfig>,
    pub tokens: Arc<TokenConfig>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub reminders: Option<Arc<dyn MessageSender>>,
}

impl AppState {
    pub fn new(store: Arc<Store>, cfg: Arc<CoreConfig>, tokens: TokenConfig) -> Self {
        Self {
            store,
            cfg,
            tokens: Arc::new(tokens),
            payments: None,
            geocoder: None,
            reminders: None,
        }
    }

    pub fn with_payments(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(gateway);
        self
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_reminders(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.reminders = Some(sender);
        self
    }

    pub(crate) fn payments(&self) -> ClinicResult<&dyn PaymentGateway> {
        self.payments
            .as_deref()
            .ok_or_else(|| ClinicError::Gateway("payment gateway is not configured".into()))
    }

    pub(crate) fn geocoder(&self) -> ClinicResult<&dyn Geocoder> {
        self.geocoder
            .as_deref()
            .ok_or_else(|| ClinicError::Gateway("geocoder is not configured".into()))
    }

    pub(crate) fn reminders(&self) -> ClinicResult<&dyn MessageSender> {
        self.reminders
            .as_deref()
            .ok_or_else(|| ClinicError::Gateway("reminder webhook is not configured".into()))
    }
}
