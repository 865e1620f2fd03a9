//! Outbound notification port
//!
//! Permission mutations and finished deployments emit events to an external
//! notification service. Delivery is a decoupled side channel: senders retry
//! with bounded exponential backoff, and a delivery failure never becomes
//! the caller-visible error of the mutation that produced the event.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::permissions::PermissionType;
use crate::types::{FirmamentError, Result};

/// One outbound event, addressed to a wallet or describing a world change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum NotificationEvent {
    PermissionGranted {
        world: String,
        permission_type: PermissionType,
        address: String,
    },
    PermissionRevoked {
        world: String,
        permission_type: PermissionType,
        address: String,
    },
    WorldDeployed {
        world: String,
        entity_id: String,
    },
}

/// Outbound event sink. One call per batch of affected addresses.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_batch(&self, events: Vec<NotificationEvent>) -> Result<()>;
}

// ============================================================================
// HTTP sender
// ============================================================================

/// Delivery policy for the HTTP sender
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Attempts per batch before giving up
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt
    pub base_backoff: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// POSTs event batches as JSON to a notification endpoint
pub struct HttpNotificationSender {
    endpoint: String,
    config: NotificationConfig,
    client: reqwest::Client,
}

impl HttpNotificationSender {
    pub fn new(endpoint: impl Into<String>, config: NotificationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("elohim-firmament/1.0")
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.into(),
            config,
            client,
        }
    }

    async fn post_once(&self, events: &[NotificationEvent]) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(events)
            .send()
            .await
            .map_err(|e| FirmamentError::Notification(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FirmamentError::Notification(format!(
                "Notification endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send_batch(&self, events: Vec<NotificationEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut backoff = self.config.base_backoff;
        let mut last_err = None;

        for attempt in 1..=self.config.max_attempts {
            match self.post_once(&events).await {
                Ok(()) => {
                    debug!(count = events.len(), attempt, "Notification batch delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Notification delivery failed"
                    );
                    last_err = Some(e);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            FirmamentError::Notification("Notification delivery failed".to_string())
        }))
    }
}

// ============================================================================
// Non-delivering senders
// ============================================================================

/// Discards every event. Used when no notification endpoint is configured.
#[derive(Default)]
pub struct NoopNotificationSender;

#[async_trait]
impl NotificationSender for NoopNotificationSender {
    async fn send_batch(&self, _events: Vec<NotificationEvent>) -> Result<()> {
        Ok(())
    }
}

/// Captures events instead of delivering them. Backs dev mode and tests.
#[derive(Default)]
pub struct RecordingNotificationSender {
    batches: Mutex<Vec<Vec<NotificationEvent>>>,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivered batch, in order.
    pub async fn batches(&self) -> Vec<Vec<NotificationEvent>> {
        self.batches.lock().await.clone()
    }

    /// Every delivered event, flattened.
    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send_batch(&self, events: Vec<NotificationEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.batches.lock().await.push(events);
        Ok(())
    }
}
