//! model.rs — document shapes shared across the notification path.
//!
//! Field names mirror the wire format of the document store: reservation and
//! event documents are camelCase, host profiles keep their historical
//! snake_case keys (with aliases for the older spellings still present in
//! production data).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store collection holding reservation documents.
pub const RESERVATIONS: &str = "reservations";
/// Store collection holding event documents.
pub const EVENTS: &str = "events";
/// Store collection holding user/host profiles.
pub const USERS: &str = "users";
/// Store collection receiving in-app notification documents.
pub const NOTIFICATIONS: &str = "notifications";

/// Lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    CheckedIn,
    Cancelled,
    Waitlisted,
}

impl ReservationStatus {
    /// Only active reservations may trigger host notifications.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Reserved | Self::CheckedIn)
    }
}

/// One attendee's claim on one event occurrence.
///
/// Owned by the reservation-creation workflow; this crate only reads the
/// identity/content fields and read-modify-writes `host_notify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    #[serde(default)]
    pub attendee_name: Option<String>,
    #[serde(default)]
    pub attendee_email: Option<String>,
    pub status: ReservationStatus,
    #[serde(default)]
    pub is_guest_created: bool,
    #[serde(default)]
    pub host_notify: HostNotifyState,
}

/// The slice of an event document the notification path needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    pub id: String,
    pub host_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pricing_type: Option<String>,
    #[serde(default)]
    pub has_entry_fee: bool,
}

/// Pricing classification passed through to the dispatcher as context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingType {
    Free,
    Paid,
}

impl PricingType {
    /// Explicit `pricingType` wins when it parses; otherwise inferred from
    /// the entry-fee flag.
    pub fn from_event(event: &EventDoc) -> Self {
        match event.pricing_type.as_deref() {
            Some("free") => Self::Free,
            Some("paid") => Self::Paid,
            _ if event.has_entry_fee => Self::Paid,
            _ => Self::Free,
        }
    }
}

/// Host-facing notification preferences; both flags default to opted-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub email_opt_in: bool,
    #[serde(default = "default_true")]
    pub sms_opt_in: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_opt_in: true,
            sms_opt_in: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Host profile as read from the user collection (read-only here).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostProfile {
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "hostPhoneNumber")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub notification_settings: NotificationSettings,
}

/// A notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    InApp,
    Email,
    Sms,
}

impl Channel {
    /// Stable label used in `last_error` composition and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

/// Per-reservation delivery record embedded under the `hostNotify` field.
///
/// Invariant: a channel timestamp is set iff that channel has ever
/// succeeded, and once set it is never cleared. `last_error` reflects only
/// the most recent dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostNotifyState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HostNotifyState {
    /// True once the channel has succeeded for this reservation.
    pub fn is_channel_done(&self, channel: Channel) -> bool {
        self.channel_at(channel).is_some()
    }

    /// Mark the channel delivered at `at`. The first success wins; later
    /// calls keep the original timestamp.
    pub fn record_channel_success(&mut self, channel: Channel, at: DateTime<Utc>) {
        let slot = match channel {
            Channel::InApp => &mut self.in_app_at,
            Channel::Email => &mut self.email_at,
            Channel::Sms => &mut self.sms_at,
        };
        if slot.is_none() {
            *slot = Some(at);
        }
    }

    fn channel_at(&self, channel: Channel) -> Option<DateTime<Utc>> {
        match channel {
            Channel::InApp => self.in_app_at,
            Channel::Email => self.email_at,
            Channel::Sms => self.sms_at,
        }
    }

    /// Cooldown completeness: the previous attempt exists, recorded no
    /// error, and was not a total no-op. SMS is deliberately not consulted;
    /// it is treated as best-effort for cooldown purposes.
    pub fn channels_complete(&self) -> bool {
        self.last_attempt_at.is_some()
            && self.last_error.is_none()
            && (self.in_app_at.is_some() || self.email_at.is_some())
    }
}

/// Outcome of one channel within one dispatch pass; never persisted beyond
/// what lands in [`HostNotifyState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub attempted: bool,
    pub success: bool,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChannelResult {
    pub fn sent() -> Self {
        Self {
            attempted: true,
            success: true,
            skipped: false,
            reason: None,
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            attempted: false,
            success: false,
            skipped: true,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            attempted: true,
            success: false,
            skipped: false,
            reason: Some(reason.into()),
        }
    }

    /// Channel never reached (e.g. the host profile was missing).
    pub fn not_attempted() -> Self {
        Self::default()
    }

    /// Attempted but did not succeed; feeds `last_error` composition.
    pub fn is_failure(&self) -> bool {
        self.attempted && !self.success
    }
}

/// Aggregated outcome of one dispatcher invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResult {
    pub in_app: ChannelResult,
    pub email: ChannelResult,
    pub sms: ChannelResult,
    pub host_notify: HostNotifyState,
}
