use crate::{checked_body, http_client, GatewayError};
use async_trait::async_trait;
use clinic_core::integrations::{MessageSender, ReminderMessage};
use clinic_core::ClinicResult;

const SERVICE: &str = "reminder webhook";

/// Posts reminder messages as JSON to a messaging webhook.
#[derive(Clone, Debug)]
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookSender {
    pub fn new(url: impl Into<String>) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MessageSender for WebhookSender {
    async fn send(&self, message: &ReminderMessage) -> ClinicResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(GatewayError::Request)?;

        checked_body(SERVICE, response).await?;
        tracing::debug!("delivered reminder for prescription {}", message.prescription_id);
        Ok(())
    }
}
