//! Constants used throughout the clinic core crate.

/// Default directory for the persisted store when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "clinic_data";

/// Filename of the store snapshot inside the data directory.
pub const STORE_SNAPSHOT_FILENAME: &str = "store.yaml";

/// Default free-trial length in days.
pub const DEFAULT_FREE_TRIAL_DAYS: u32 = 14;

/// Default free-trial booking quota.
pub const DEFAULT_FREE_TRIAL_BOOKING_LIMIT: u32 = 50;

/// Default currency for payment-gateway orders.
pub const DEFAULT_CURRENCY: &str = "INR";

/// Default width of the prescription reminder window, in minutes.
pub const DEFAULT_REMINDER_WINDOW_MINUTES: u32 = 15;

/// Payment status reported by the gateway for a settled payment.
pub const PAYMENT_STATUS_CAPTURED: &str = "captured";

/// Bounds for generated slot lengths, in minutes.
pub const MIN_SLOT_MINUTES: u32 = 5;
pub const MAX_SLOT_MINUTES: u32 = 240;
