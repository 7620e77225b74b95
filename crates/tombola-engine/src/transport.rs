//! Webhook delivery transport
//!
//! Delivers rendered messages as JSON POSTs to per-destination webhook
//! endpoints: `{base_url}/{delivery_id}/{delivery_token}`. The HTTP client
//! is blocking, so every call runs under `spawn_blocking` to keep the
//! engine's runtime threads free.

use crate::delivery::{DeliveryError, DeliveryReceipt, Messenger, RenderedMessage};
use async_trait::async_trait;
use tombola_core::DestinationRecord;
use tracing::debug;

/// [`Messenger`] implementation over plain HTTP webhooks
#[derive(Clone)]
pub struct WebhookMessenger {
    base_url: String,
    agent: ureq::Agent,
}

impl WebhookMessenger {
    /// Create a messenger posting to webhooks under `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(10))
                .build(),
        }
    }

    fn endpoint(&self, destination: &DestinationRecord) -> String {
        format!(
            "{}/{}/{}",
            self.base_url, destination.delivery_id, destination.delivery_token
        )
    }
}

fn map_error(err: ureq::Error) -> DeliveryError {
    match err {
        // Credentials rejected or endpoint deleted: the record is stale.
        ureq::Error::Status(401 | 403 | 404, _) => DeliveryError::Revoked,
        ureq::Error::Status(code, _) => {
            DeliveryError::Unreachable(format!("endpoint returned status {code}"))
        }
        ureq::Error::Transport(transport) => DeliveryError::Unreachable(transport.to_string()),
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    async fn send(
        &self,
        destination: &DestinationRecord,
        message: &RenderedMessage,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let agent = self.agent.clone();
        let url = self.endpoint(destination);
        let body = serde_json::json!({
            "content": message.text,
            "action": message.action,
        });

        let response = tokio::task::spawn_blocking(move || {
            agent.post(&url).send_json(body).map_err(map_error)
        })
        .await
        .map_err(|join| DeliveryError::Unreachable(format!("delivery task failed: {join}")))??;

        let message_id = response
            .into_json::<serde_json::Value>()
            .ok()
            .and_then(|value| match value.get("id") {
                Some(serde_json::Value::String(id)) => Some(id.clone()),
                Some(serde_json::Value::Number(id)) => Some(id.to_string()),
                _ => None,
            })
            .unwrap_or_default();
        debug!(url = %self.endpoint(destination), %message_id, "webhook delivered");
        Ok(DeliveryReceipt { message_id })
    }

    async fn retract(
        &self,
        destination: &DestinationRecord,
        receipt: &DeliveryReceipt,
    ) -> Result<(), DeliveryError> {
        if receipt.message_id.is_empty() {
            // Nothing to address the deletion with.
            return Ok(());
        }
        let agent = self.agent.clone();
        let url = format!(
            "{}/messages/{}",
            self.endpoint(destination),
            receipt.message_id
        );

        tokio::task::spawn_blocking(move || agent.delete(&url).call().map_err(map_error))
            .await
            .map_err(|join| DeliveryError::Unreachable(format!("delivery task failed: {join}")))??;
        Ok(())
    }
}
