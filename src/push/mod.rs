//! Best-effort push delivery for notifications.
//!
//! Notification rows are committed by the service layer first; the
//! [`PushDispatcher`] then hands them to a background worker which talks to the
//! [`PushGateway`]. Nothing here can fail the operation that raised the
//! notification.

pub mod dispatcher;
pub mod webhook;

pub use dispatcher::{PushDispatcher, PushSettings};
pub use webhook::WebhookPushGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::Notification;

/// Payload handed to the push collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: Option<String>,
}

impl From<&Notification> for PushMessage {
    fn from(n: &Notification) -> Self {
        Self {
            notification_id: n.id,
            user_id: n.user_id,
            title: n.title.clone(),
            message: n.message.clone(),
            kind: n.kind.clone(),
            link: n.link.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("push gateway rejected message: HTTP {0}")]
    Rejected(u16),

    #[error("push transport error: {0}")]
    Transport(String),
}

impl PushError {
    /// Client errors (4xx) will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PushError::Timeout(_) | PushError::Transport(_) => true,
            PushError::Rejected(status) => *status >= 500 || *status == 429,
        }
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn deliver(&self, message: &PushMessage) -> Result<(), PushError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_retry() {
        assert!(PushError::Timeout(100).is_retryable());
        assert!(PushError::Transport("reset".into()).is_retryable());
        assert!(PushError::Rejected(503).is_retryable());
        assert!(PushError::Rejected(429).is_retryable());
        assert!(!PushError::Rejected(400).is_retryable());
    }
}
