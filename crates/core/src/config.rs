//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. Services
//! never read process-wide environment variables during request handling.

use crate::constants::{
    DEFAULT_CURRENCY, DEFAULT_FREE_TRIAL_BOOKING_LIMIT, DEFAULT_FREE_TRIAL_DAYS,
    DEFAULT_REMINDER_WINDOW_MINUTES,
};
use crate::{ClinicError, ClinicResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    free_trial_days: u32,
    free_trial_booking_limit: u32,
    currency: String,
    reminder_window_minutes: u32,
    payment_key_secret: Option<String>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`, rejecting zero durations and an empty currency.
    pub fn new(
        data_dir: PathBuf,
        free_trial_days: u32,
        free_trial_booking_limit: u32,
        currency: String,
        reminder_window_minutes: u32,
    ) -> ClinicResult<Self> {
        if free_trial_days == 0 {
            return Err(ClinicError::InvalidInput(
                "free_trial_days must be greater than zero".into(),
            ));
        }
        if free_trial_booking_limit == 0 {
            return Err(ClinicError::InvalidInput(
                "free_trial_booking_limit must be greater than zero".into(),
            ));
        }
        if reminder_window_minutes == 0 {
            return Err(ClinicError::InvalidInput(
                "reminder_window_minutes must be greater than zero".into(),
            ));
        }
        let currency = currency.trim().to_ascii_uppercase();
        if currency.is_empty() {
            return Err(ClinicError::InvalidInput("currency cannot be empty".into()));
        }

        Ok(Self {
            data_dir,
            free_trial_days,
            free_trial_booking_limit,
            currency,
            reminder_window_minutes,
            payment_key_secret: None,
        })
    }

    /// Configuration with all defaults, rooted at `data_dir`.
    pub fn with_defaults(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            free_trial_days: DEFAULT_FREE_TRIAL_DAYS,
            free_trial_booking_limit: DEFAULT_FREE_TRIAL_BOOKING_LIMIT,
            currency: DEFAULT_CURRENCY.into(),
            reminder_window_minutes: DEFAULT_REMINDER_WINDOW_MINUTES,
            payment_key_secret: None,
        }
    }

    /// Attach the payment provider secret used to check payment signatures.
    pub fn with_payment_key_secret(mut self, secret: Option<String>) -> Self {
        self.payment_key_secret = secret.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn free_trial_days(&self) -> u32 {
        self.free_trial_days
    }

    pub fn free_trial_booking_limit(&self) -> u32 {
        self.free_trial_booking_limit
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn reminder_window_minutes(&self) -> u32 {
        self.reminder_window_minutes
    }

    pub fn payment_key_secret(&self) -> Option<&str> {
        self.payment_key_secret.as_deref()
    }
}

/// Parse an optional numeric setting, falling back to `default` when unset or blank.
pub fn u32_from_env_value(name: &str, value: Option<String>, default: u32) -> ClinicResult<u32> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse::<u32>().map_err(|_| {
            ClinicError::InvalidInput(format!("{name} must be a whole number, got '{v}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_trial_days() {
        let err = CoreConfig::new(PathBuf::from("x"), 0, 10, "INR".into(), 15)
            .expect_err("zero trial days should be rejected");
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }

    #[test]
    fn test_new_normalises_currency() {
        let cfg = CoreConfig::new(PathBuf::from("x"), 14, 10, " inr ".into(), 15).unwrap();
        assert_eq!(cfg.currency(), "INR");
    }

    #[test]
    fn test_blank_payment_secret_is_ignored() {
        let cfg = CoreConfig::with_defaults(PathBuf::from("x"))
            .with_payment_key_secret(Some("  ".into()));
        assert_eq!(cfg.payment_key_secret(), None);
    }

    #[test]
    fn test_u32_from_env_value() {
        assert_eq!(u32_from_env_value("X", None, 7).unwrap(), 7);
        assert_eq!(u32_from_env_value("X", Some(" ".into()), 7).unwrap(), 7);
        assert_eq!(u32_from_env_value("X", Some("30".into()), 7).unwrap(), 30);
        assert!(u32_from_env_value("X", Some("-1".into()), 7).is_err());
    }
}
