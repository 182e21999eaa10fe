use crate::{checked_body, http_client, GatewayError};
use async_trait::async_trait;
use clinic_core::integrations::{GatewayOrder, GatewayPayment, PaymentGateway};
use clinic_core::ClinicResult;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "razorpay";
pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com/v1";

/// Razorpay REST client authenticated with `key_id:key_secret` basic auth.
#[derive(Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct OrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: u64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct PaymentResponse {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    status: String,
    #[serde(default)]
    amount: u64,
}

impl RazorpayGateway {
    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        Self::with_base_url(DEFAULT_BASE_URL, key_id, key_secret)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }
}

fn decode_order(body: &str, receipt: &str) -> Result<GatewayOrder, GatewayError> {
    let order: OrderResponse =
        serde_json::from_str(body).map_err(|source| GatewayError::Decode {
            service: SERVICE,
            source,
        })?;
    Ok(GatewayOrder {
        id: order.id,
        amount: order.amount,
        currency: order.currency,
        receipt: order.receipt.unwrap_or_else(|| receipt.to_string()),
        status: order.status,
    })
}

fn decode_payment(body: &str) -> Result<GatewayPayment, GatewayError> {
    let payment: PaymentResponse =
        serde_json::from_str(body).map_err(|source| GatewayError::Decode {
            service: SERVICE,
            source,
        })?;
    Ok(GatewayPayment {
        id: payment.id,
        order_id: payment.order_id,
        status: payment.status,
        amount: payment.amount,
    })
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
    ) -> ClinicResult<GatewayOrder> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&OrderRequest {
                amount,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(GatewayError::Request)?;

        let body = checked_body(SERVICE, response).await?;
        let order = decode_order(&body, receipt)?;
        tracing::info!(
            "created {SERVICE} order {} for {} {}",
            order.id,
            order.amount,
            order.currency
        );
        Ok(order)
    }

    async fn fetch_payment(&self, payment_id: &str) -> ClinicResult<GatewayPayment> {
        let response = self
            .client
            .get(format!("{}/payments/{payment_id}", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(GatewayError::Request)?;

        let body = checked_body(SERVICE, response).await?;
        Ok(decode_payment(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_order_keeps_provider_fields() {
        let body = r#"{"id":"order_9A33XWu170gUtm","entity":"order","amount":117882,"amount_paid":0,
            "currency":"INR","receipt":"5b1f","status":"created","attempts":0}"#;
        let order = decode_order(body, "ignored").unwrap();
        assert_eq!(order.id, "order_9A33XWu170gUtm");
        assert_eq!(order.amount, 117882);
        assert_eq!(order.receipt, "5b1f");
        assert_eq!(order.status, "created");
    }

    #[test]
    fn test_decode_payment_reads_status_and_order() {
        let body = r#"{"id":"pay_29QQoUBi66xm2f","entity":"payment","amount":117882,
            "currency":"INR","status":"captured","order_id":"order_9A33XWu170gUtm"}"#;
        let payment = decode_payment(body).unwrap();
        assert_eq!(payment.status, "captured");
        assert_eq!(payment.order_id.as_deref(), Some("order_9A33XWu170gUtm"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_payment("<html>"),
            Err(GatewayError::Decode { .. })
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let gateway =
            RazorpayGateway::with_base_url("http://localhost:9/v1/", "id", "secret").unwrap();
        assert_eq!(gateway.base_url, "http://localhost:9/v1");
        assert!(!format!("{gateway:?}").contains("secret"));
    }
}
