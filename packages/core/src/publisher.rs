//! Change notifications.
//!
//! Every non-empty cache delta, and every analyst-driven interval update,
//! goes out as one [`SystemEvent`] carrying the full post-update state of
//! each changed interval. Two transports ship with the service:
//!
//! - [`BroadcastPublisher`]: in-process fan-out over a tokio broadcast
//!   channel, used when no external bus is configured.
//! - [`WebhookPublisher`]: JSON `POST` to the event bus endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::intervals::Interval;

/// Sequence number stamped on interval events. Consumers key on interval
/// identity, not on this value, and expect it to stay `0`.
pub const INTERVAL_EVENT_SEQUENCE: i64 = 0;

/// Upper bound on one webhook delivery, connect through response.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// One notification on the pub/sub bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    pub event_type: String,
    pub payload: Vec<Interval>,
    pub sequence: i64,
}

impl SystemEvent {
    /// Event announcing changed intervals.
    pub fn intervals(event_type: impl Into<String>, payload: Vec<Interval>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            sequence: INTERVAL_EVENT_SEQUENCE,
        }
    }
}

/// Errors from publishing a [`SystemEvent`].
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Event bus rejected event with HTTP {status}")]
    Rejected { status: u16 },

    #[error("Cannot build event bus client: {message}")]
    Client { message: String },
}

/// Sink for change notifications.
#[async_trait]
pub trait SystemEventPublisher {
    async fn publish(&self, event: SystemEvent) -> Result<(), PublishError>;

    /// Name of this publisher for logging.
    fn publisher_name(&self) -> &str;
}

/// In-process publisher backed by a tokio broadcast channel.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<SystemEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl SystemEventPublisher for BroadcastPublisher {
    async fn publish(&self, event: SystemEvent) -> Result<(), PublishError> {
        // No live subscribers is fine: nobody is listening yet.
        if let Ok(receivers) = self.sender.send(event) {
            tracing::debug!("Broadcast interval event to {} subscribers", receivers);
        }
        Ok(())
    }

    fn publisher_name(&self) -> &str {
        "broadcast"
    }
}

/// Publisher that POSTs events as JSON to an event bus endpoint.
#[derive(Clone)]
pub struct WebhookPublisher {
    url: String,
    http: Client,
}

impl WebhookPublisher {
    /// Every request is cut off after `timeout`, so a stalled bus surfaces as
    /// [`PublishError::Network`] instead of holding up the caller.
    pub fn new(url: String, timeout: Duration) -> Result<Self, PublishError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PublishError::Client {
                message: err.to_string(),
            })?;
        Ok(Self { url, http })
    }
}

#[async_trait]
impl SystemEventPublisher for WebhookPublisher {
    async fn publish(&self, event: SystemEvent) -> Result<(), PublishError> {
        let response = self
            .http
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .map_err(|err| PublishError::Network {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PublishError::Rejected {
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }

    fn publisher_name(&self) -> &str {
        "webhook"
    }
}
