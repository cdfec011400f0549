//! Host notification channels.
//!
//! Each channel hides behind a small async trait so the dispatcher can be
//! exercised with in-memory fakes. Adapters are constructed by the
//! composition root from config; a channel without a configured adapter is
//! skipped at dispatch time, never an error.

pub mod dispatcher;
pub mod email;
pub mod inapp;
pub mod sms;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use dispatcher::{DispatchContext, NotificationDispatcher};

/// Outbound email, already rendered. Sender/reply-to identities belong to
/// the adapter's configuration.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, msg: &EmailMessage) -> Result<String>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// `to` is strict E.164; returns the provider's message id.
    async fn send(&self, to: &str, body: &str) -> Result<String>;
}

/// In-app notification document to drop into the host's feed.
#[derive(Debug, Clone)]
pub struct InAppNotification {
    pub kind: &'static str,
    pub title: String,
    pub body: String,
    pub event_id: String,
    pub reservation_id: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait InAppSink: Send + Sync {
    /// Returns the id of the created notification document.
    async fn create(&self, recipient_id: &str, note: &InAppNotification) -> Result<String>;
}
