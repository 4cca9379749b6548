//! Notification gateway trait and local implementations.
//!
//! The outbound messaging channel is an external collaborator: the engine
//! only needs "send text to phone number, fire-and-forget, best effort".
//! Delivery failure is reported to the caller as a warning, never as a
//! transition failure, and this core performs no retries.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::PhoneNumber;
use thiserror::Error;

/// Error reported by a gateway when delivery fails.
#[derive(Debug, Clone, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Trait for the outbound messaging channel (SMS/chat).
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Delivers a text to a phone number, best effort.
    async fn send(&self, phone: &PhoneNumber, message: &str) -> Result<(), NotificationError>;
}

/// A message captured by the in-memory gateway.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Destination phone in canonical form.
    pub phone: PhoneNumber,
    /// The delivered text.
    pub message: String,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sent: Vec<SentMessage>,
    fail_on_send: bool,
}

/// In-memory notification gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryNotificationGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail on subsequent send calls.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of messages delivered.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns the most recently delivered message.
    pub fn last_message(&self) -> Option<SentMessage> {
        self.state.read().unwrap().sent.last().cloned()
    }

    /// Returns all messages delivered to a phone number.
    pub fn messages_for(&self, phone: &PhoneNumber) -> Vec<SentMessage> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|m| &m.phone == phone)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for InMemoryNotificationGateway {
    async fn send(&self, phone: &PhoneNumber, message: &str) -> Result<(), NotificationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(NotificationError("channel unavailable".to_string()));
        }

        state.sent.push(SentMessage {
            phone: phone.clone(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Gateway that logs instead of delivering.
///
/// Stands in for a real SMS provider when none is configured; the message
/// body only appears at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationGateway;

impl LoggingNotificationGateway {
    /// Creates a new logging gateway.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationGateway for LoggingNotificationGateway {
    async fn send(&self, phone: &PhoneNumber, message: &str) -> Result<(), NotificationError> {
        tracing::info!(%phone, "no messaging channel configured, logging outbound text");
        tracing::debug!(%phone, message, "outbound text body");
        Ok(())
    }
}
