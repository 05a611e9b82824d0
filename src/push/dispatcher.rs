use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{PushError, PushGateway, PushMessage, WebhookPushGateway};
use crate::config;
use crate::database::models::NotificationStatus;
use crate::database::{Collection, Store, WriteOp};

#[derive(Debug, Clone)]
pub struct PushSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub queue_capacity: usize,
}

impl PushSettings {
    pub fn from_config() -> Self {
        let n = &config::config().notifications;
        Self {
            timeout: Duration::from_millis(n.push_timeout_ms),
            max_retries: n.push_max_retries,
            backoff: Duration::from_millis(n.push_retry_backoff_ms),
            queue_capacity: n.queue_capacity.max(1),
        }
    }
}

/// Hands committed notifications to the background push worker.
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct PushDispatcher {
    tx: Option<mpsc::Sender<PushMessage>>,
}

impl PushDispatcher {
    /// No gateway configured: notifications stay `pending`.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Start the worker on the current tokio runtime.
    pub fn spawn(gateway: Arc<dyn PushGateway>, store: Arc<dyn Store>, settings: PushSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        tokio::spawn(run_worker(rx, gateway, store, settings));
        Self { tx: Some(tx) }
    }

    /// Webhook gateway when `PUSH_WEBHOOK_URL` is set, otherwise disabled.
    pub fn from_config(store: Arc<dyn Store>) -> Self {
        let settings = PushSettings::from_config();
        match &config::config().notifications.push_webhook_url {
            Some(url) => match WebhookPushGateway::new(url.clone(), settings.timeout) {
                Ok(gateway) => {
                    info!("Push delivery enabled via webhook");
                    Self::spawn(Arc::new(gateway), store, settings)
                }
                Err(e) => {
                    warn!("Push delivery disabled, could not build webhook client: {}", e);
                    Self::disabled()
                }
            },
            None => {
                info!("Push delivery disabled (PUSH_WEBHOOK_URL not set)");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Never blocks the caller. A full queue drops the push (the row stays `pending`).
    pub fn enqueue(&self, message: PushMessage) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(m)) => {
                warn!(notification_id = %m.notification_id, "Push queue full, dropping delivery");
            }
            Err(mpsc::error::TrySendError::Closed(m)) => {
                warn!(notification_id = %m.notification_id, "Push worker stopped, dropping delivery");
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<PushMessage>,
    gateway: Arc<dyn PushGateway>,
    store: Arc<dyn Store>,
    settings: PushSettings,
) {
    while let Some(message) = rx.recv().await {
        let status = match deliver_with_retry(gateway.as_ref(), &message, &settings).await {
            Ok(()) => NotificationStatus::Sent,
            Err(e) => {
                warn!(notification_id = %message.notification_id, user_id = %message.user_id, "Push delivery failed: {}", e);
                NotificationStatus::Failed
            }
        };

        let result = match WriteOp::update(Collection::Notifications, message.notification_id, json!({ "status": status.as_str() })) {
            Ok(op) => store.write(vec![op]).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(notification_id = %message.notification_id, "Could not record push status: {}", e);
        }
    }
    debug!("Push worker stopped");
}

/// One attempt plus up to `max_retries` retries with doubling backoff.
pub async fn deliver_with_retry(
    gateway: &dyn PushGateway,
    message: &PushMessage,
    settings: &PushSettings,
) -> Result<(), PushError> {
    let mut attempt: u32 = 0;
    loop {
        let result = match tokio::time::timeout(settings.timeout, gateway.deliver(message)).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout(settings.timeout.as_millis() as u64)),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < settings.max_retries => {
                let delay = settings.backoff * 2u32.saturating_pow(attempt);
                attempt += 1;
                debug!(notification_id = %message.notification_id, attempt, "Retrying push in {:?}: {}", delay, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
