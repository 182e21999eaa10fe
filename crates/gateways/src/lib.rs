//! # Clinic Gateways
//!
//! reqwest-backed implementations of the integration traits in `clinic_core::integrations`:
//! - [`RazorpayGateway`]: orders and payment lookups
//! - [`GoogleGeocoder`]: postal code to coordinates
//! - [`WebhookSender`]: medication reminders posted to a messaging webhook

mod error;
mod geocoding;
mod razorpay;
mod webhook;

pub use error::GatewayError;
pub use geocoding::{GoogleGeocoder, DEFAULT_BASE_URL as DEFAULT_GEOCODING_URL};
pub use razorpay::RazorpayGateway;
pub use webhook::WebhookSender;

use std::time::Duration;

/// Request timeout shared by every outbound client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(GatewayError::Client)
}

/// Reads a response body, turning a non-2xx status into [`GatewayError::Status`].
async fn checked_body(
    service: &'static str,
    response: reqwest::Response,
) -> Result<String, GatewayError> {
    let status = response.status();
    let body = response.text().await.map_err(GatewayError::Request)?;
    if !status.is_success() {
        return Err(GatewayError::Status {
            service,
            status: status.as_u16(),
            body: body.chars().take(512).collect(),
        });
    }
    Ok(body)
}
