//! Push delivery of notifications to a user's registered device tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sprintify_core::models::Notification;
use sprintify_core::Database;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push webhook returned {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

impl PushMessage {
    pub fn for_notification(tokens: Vec<String>, notification: &Notification) -> Self {
        Self {
            tokens,
            title: notification.title.clone(),
            body: notification.body.clone(),
            link: notification.link.clone(),
        }
    }
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError>;
}

/// Posts each message as JSON to a configured URL.
#[derive(Debug, Clone)]
pub struct WebhookPush {
    http: Client,
    url: String,
}

impl WebhookPush {
    pub fn new(url: impl Into<String>) -> Result<Self, PushError> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushSender for WebhookPush {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        let res = self.http.post(&self.url).json(message).send().await?;
        if !res.status().is_success() {
            return Err(PushError::Status(res.status().as_u16()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPush;

#[async_trait]
impl PushSender for NoopPush {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        tracing::trace!(tokens = message.tokens.len(), "push disabled, dropping message");
        Ok(())
    }
}

/// The configured webhook, or [`NoopPush`] when none is set.
pub fn push_sender(config: &Config) -> Arc<dyn PushSender> {
    let Some(url) = config.push_webhook.as_deref() else {
        return Arc::new(NoopPush);
    };
    match WebhookPush::new(url) {
        Ok(webhook) => Arc::new(webhook),
        Err(e) => {
            tracing::warn!(error = %e, "push webhook unavailable, push disabled");
            Arc::new(NoopPush)
        }
    }
}

/// Push `notification` to its owner's devices. Failures are logged only.
pub async fn deliver(db: &Database, sender: &dyn PushSender, notification: &Notification) {
    let tokens = match db.get_user(&notification.user_id) {
        Ok(Some(user)) => user.fcm_tokens,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(user = %notification.user_id, error = %e, "failed to load device tokens");
            return;
        }
    };
    if tokens.is_empty() {
        return;
    }

    let message = PushMessage::for_notification(tokens, notification);
    if let Err(e) = sender.send(&message).await {
        tracing::warn!(
            user = %notification.user_id,
            notification = %notification.id,
            error = %e,
            "push delivery failed"
        );
    }
}
