//! Startup configuration read from the process environment.
//!
//! Both the standalone REST binary and `clinic-run` build their [`AppState`] here, once, before
//! serving. Handlers never touch the environment.

use crate::state::AppState;
use anyhow::Context;
use api_shared::auth::{TokenConfig, DEFAULT_TOKEN_TTL_HOURS};
use clinic_core::config::u32_from_env_value;
use clinic_core::constants::{
    DEFAULT_CURRENCY, DEFAULT_DATA_DIR, DEFAULT_FREE_TRIAL_BOOKING_LIMIT, DEFAULT_FREE_TRIAL_DAYS,
    DEFAULT_REMINDER_WINDOW_MINUTES,
};
use clinic_core::{CoreConfig, Store};
use clinic_gateways::{GoogleGeocoder, RazorpayGateway, WebhookSender, DEFAULT_GEOCODING_URL};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_REMINDER_POLL_SECONDS: u32 = 60;

/// Reads `name`, treating an unset or blank variable as absent.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u32(name: &str, default: u32) -> anyhow::Result<u32> {
    Ok(u32_from_env_value(name, std::env::var(name).ok(), default)?)
}

pub fn rest_addr_from_env() -> String {
    env_value("CLINIC_REST_ADDR").unwrap_or_else(|| DEFAULT_REST_ADDR.into())
}

pub fn reminder_poll_interval_from_env() -> anyhow::Result<Duration> {
    let seconds = env_u32("REMINDER_POLL_SECONDS", DEFAULT_REMINDER_POLL_SECONDS)?;
    anyhow::ensure!(seconds > 0, "REMINDER_POLL_SECONDS must be greater than zero");
    Ok(Duration::from_secs(u64::from(seconds)))
}

pub fn core_config_from_env() -> anyhow::Result<CoreConfig> {
    let data_dir = env_value("CLINIC_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into());
    let cfg = CoreConfig::new(
        PathBuf::from(data_dir),
        env_u32("FREE_TRIAL_DAYS", DEFAULT_FREE_TRIAL_DAYS)?,
        env_u32("FREE_TRIAL_BOOKING_LIMIT", DEFAULT_FREE_TRIAL_BOOKING_LIMIT)?,
        env_value("CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.into()),
        env_u32("REMINDER_WINDOW_MINUTES", DEFAULT_REMINDER_WINDOW_MINUTES)?,
    )?;
    Ok(cfg.with_payment_key_secret(env_value("RAZORPAY_KEY_SECRET")))
}

pub fn token_config_from_env() -> anyhow::Result<TokenConfig> {
    let secret = env_value("AUTH_TOKEN_SECRET").context("AUTH_TOKEN_SECRET must be set")?;
    let ttl_hours = env_u32("AUTH_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?;
    Ok(TokenConfig::new(&secret, ttl_hours)?)
}

/// Opens the store and wires whichever integrations are configured.
pub fn state_from_env() -> anyhow::Result<AppState> {
    let cfg = core_config_from_env()?;
    let tokens = token_config_from_env()?;
    let store = Store::open(cfg.data_dir())
        .with_context(|| format!("opening store in {}", cfg.data_dir().display()))?;

    let mut state = AppState::new(Arc::new(store), Arc::new(cfg), tokens);

    match (env_value("RAZORPAY_KEY_ID"), env_value("RAZORPAY_KEY_SECRET")) {
        (Some(key_id), Some(key_secret)) => {
            state = state.with_payments(Arc::new(RazorpayGateway::new(key_id, key_secret)?));
        }
        _ => tracing::warn!(
            "RAZORPAY_KEY_ID/RAZORPAY_KEY_SECRET not set, paid subscriptions are disabled"
        ),
    }

    match env_value("GEOCODING_API_KEY") {
        Some(api_key) => {
            let base_url =
                env_value("GEOCODING_BASE_URL").unwrap_or_else(|| DEFAULT_GEOCODING_URL.into());
            state = state.with_geocoder(Arc::new(GoogleGeocoder::new(base_url, api_key)?));
        }
        None => tracing::warn!("GEOCODING_API_KEY not set, geocoding is disabled"),
    }

    match env_value("REMINDER_WEBHOOK_URL") {
        Some(url) => state = state.with_reminders(Arc::new(WebhookSender::new(url)?)),
        None => tracing::info!("REMINDER_WEBHOOK_URL not set, medication reminders are disabled"),
    }

    Ok(state)
}
