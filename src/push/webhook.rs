use async_trait::async_trait;
use std::time::Duration;

use super::{PushError, PushGateway, PushMessage};

/// POSTs each message as JSON to a configured URL.
pub struct WebhookPushGateway {
    client: reqwest::Client,
    url: String,
}

impl WebhookPushGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl PushGateway for WebhookPushGateway {
    async fn deliver(&self, message: &PushMessage) -> Result<(), PushError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PushError::Rejected(response.status().as_u16()))
        }
    }
}
