//! dispatcher.rs — idempotent host notification fan-out.
//!
//! One invocation attempts each channel at most once per pending state,
//! merges the per-channel outcomes into the reservation's `hostNotify`
//! record, and persists it with a single merge-update. The function never
//! fails from the caller's point of view: every internal error degrades to a
//! structured reason inside the returned result.
//!
//! Channels run sequentially. Provider calls are not idempotent, and
//! sequential execution bounds worst-case side effects and keeps log
//! ordering deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Map;
use tracing::{debug, warn};

use super::{EmailMessage, EmailSender, InAppNotification, InAppSink, SmsSender};
use crate::model::{
    Channel, ChannelResult, HostNotifyState, HostProfile, NotificationResult, PricingType,
    Reservation, RESERVATIONS, USERS,
};
use crate::phone;
use crate::store::{get_typed, DocumentStore};

/// Reasons are stored on the reservation document; keep them short and free
/// of provider internals.
const MAX_REASON_LEN: usize = 80;

/// Locks tracked before idle entries are pruned.
const LOCK_MAP_CAP: usize = 512;

/// Everything the dispatcher needs to know about one reservation, resolved
/// by the gate before dispatch.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub reservation_id: String,
    pub event_id: String,
    pub host_id: String,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub event_title: String,
    pub pricing: PricingType,
    pub is_guest: bool,
}

/// Per-reservation async locks serializing the read-modify-write of
/// `hostNotify` within this process. Two instances of the service can still
/// race across processes; that remaining window is a documented weakness.
#[derive(Default)]
struct ReservationLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReservationLocks {
    fn lock_for(&self, reservation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("reservation locks mutex poisoned");
        if map.len() >= LOCK_MAP_CAP {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        map.entry(reservation_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    in_app: Arc<dyn InAppSink>,
    email: Option<Arc<dyn EmailSender>>,
    sms: Option<Arc<dyn SmsSender>>,
    locks: ReservationLocks,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        in_app: Arc<dyn InAppSink>,
        email: Option<Arc<dyn EmailSender>>,
        sms: Option<Arc<dyn SmsSender>>,
    ) -> Self {
        Self {
            store,
            in_app,
            email,
            sms,
            locks: ReservationLocks::default(),
        }
    }

    /// Run one dispatch pass. Infallible by contract: whatever goes wrong
    /// ends up in the result's reasons and `lastError`, never in a caller-
    /// visible error.
    pub async fn dispatch(&self, ctx: &DispatchContext, now: DateTime<Utc>) -> NotificationResult {
        let lock = self.locks.lock_for(&ctx.reservation_id);
        let _serialized = lock.lock().await;

        let mut result = NotificationResult {
            in_app: ChannelResult::not_attempted(),
            email: ChannelResult::not_attempted(),
            sms: ChannelResult::not_attempted(),
            host_notify: HostNotifyState::default(),
        };
        let mut state_loaded = false;

        if let Err(err) = self.run(ctx, now, &mut result, &mut state_loaded).await {
            warn!(
                reservation = %ctx.reservation_id,
                "host notification dispatch failed: {err:#}"
            );
            result.host_notify.last_attempt_at = Some(now);
            result.host_notify.last_error = Some(truncate_reason(&format!("{err:#}")));
            // Best-effort persist; only when the state was actually loaded,
            // otherwise a write would clobber earlier delivery markers.
            if state_loaded {
                if let Err(persist_err) = self.persist(ctx, &result.host_notify).await {
                    debug!(
                        reservation = %ctx.reservation_id,
                        "post-failure persist dropped: {persist_err:#}"
                    );
                }
            }
        }
        result
    }

    async fn run(
        &self,
        ctx: &DispatchContext,
        now: DateTime<Utc>,
        result: &mut NotificationResult,
        state_loaded: &mut bool,
    ) -> Result<()> {
        let reservation: Option<Reservation> =
            get_typed(self.store.as_ref(), RESERVATIONS, &ctx.reservation_id).await?;
        let mut state = reservation.map(|r| r.host_notify).unwrap_or_default();
        *state_loaded = true;
        result.host_notify = state.clone();

        let host: Option<HostProfile> =
            get_typed(self.store.as_ref(), USERS, &ctx.host_id).await?;
        let Some(host) = host else {
            state.last_attempt_at = Some(now);
            state.last_error = Some("host_not_found".to_string());
            result.host_notify = state.clone();
            if let Err(err) = self.persist(ctx, &state).await {
                warn!(reservation = %ctx.reservation_id, "persist failed: {err:#}");
            }
            return Ok(());
        };

        result.in_app = self.send_in_app(ctx, &mut state, now).await;
        record_outcome(Channel::InApp, &result.in_app);

        result.email = self.send_email(ctx, &host, &mut state, now).await;
        record_outcome(Channel::Email, &result.email);

        result.sms = self.send_sms(ctx, &host, &mut state, now).await;
        record_outcome(Channel::Sms, &result.sms);

        state.last_attempt_at = Some(now);
        state.last_error = compose_last_error(result);
        result.host_notify = state.clone();

        if let Err(err) = self.persist(ctx, &state).await {
            // A lost write means a future pass may re-send; accepted over
            // failing the whole dispatch.
            warn!(reservation = %ctx.reservation_id, "persist failed: {err:#}");
        }
        Ok(())
    }

    async fn send_in_app(
        &self,
        ctx: &DispatchContext,
        state: &mut HostNotifyState,
        now: DateTime<Utc>,
    ) -> ChannelResult {
        if state.is_channel_done(Channel::InApp) {
            return ChannelResult::skip("already_sent");
        }

        let note = InAppNotification {
            kind: "reservation_created",
            title: format!("New reservation: {}", ctx.event_title),
            body: format!(
                "{} reserved a spot for {}.",
                attendee_display(ctx),
                ctx.event_title
            ),
            event_id: ctx.event_id.clone(),
            reservation_id: ctx.reservation_id.clone(),
            created_at: now,
        };

        match self.in_app.create(&ctx.host_id, &note).await {
            Ok(id) => {
                debug!(reservation = %ctx.reservation_id, notification = %id, "in-app created");
                state.record_channel_success(Channel::InApp, now);
                ChannelResult::sent()
            }
            Err(err) => ChannelResult::failed(truncate_reason(&format!("{err:#}"))),
        }
    }

    async fn send_email(
        &self,
        ctx: &DispatchContext,
        host: &HostProfile,
        state: &mut HostNotifyState,
        now: DateTime<Utc>,
    ) -> ChannelResult {
        if state.is_channel_done(Channel::Email) {
            return ChannelResult::skip("already_sent");
        }
        let Some(to) = host.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return ChannelResult::skip("no_host_email");
        };
        if !host.notification_settings.email_opt_in {
            return ChannelResult::skip("email_opt_out");
        }
        let Some(sender) = &self.email else {
            return ChannelResult::skip("provider_not_configured");
        };

        let msg = EmailMessage {
            to: to.to_string(),
            subject: format!("New reservation for {}", ctx.event_title),
            html: email_html(ctx, host),
        };

        match sender.send(&msg).await {
            Ok(id) => {
                debug!(reservation = %ctx.reservation_id, message = %id, "email sent");
                state.record_channel_success(Channel::Email, now);
                ChannelResult::sent()
            }
            Err(err) => ChannelResult::failed(truncate_reason(&format!("{err:#}"))),
        }
    }

    async fn send_sms(
        &self,
        ctx: &DispatchContext,
        host: &HostProfile,
        state: &mut HostNotifyState,
        now: DateTime<Utc>,
    ) -> ChannelResult {
        if state.is_channel_done(Channel::Sms) {
            return ChannelResult::skip("already_sent");
        }
        let Some(raw_phone) = host.phone_number.as_deref().filter(|p| !p.trim().is_empty())
        else {
            return ChannelResult::skip("no_host_phone");
        };
        if !host.notification_settings.sms_opt_in {
            return ChannelResult::skip("sms_opt_out");
        }
        let Some(to) = phone::to_e164(raw_phone) else {
            return ChannelResult::skip("invalid_phone_format");
        };
        let Some(sender) = &self.sms else {
            return ChannelResult::skip("provider_not_configured");
        };

        let body = format!(
            "{} reserved a spot for {}.",
            attendee_display(ctx),
            ctx.event_title
        );

        match sender.send(&to, &body).await {
            Ok(id) => {
                debug!(
                    reservation = %ctx.reservation_id,
                    to = %phone::mask(&to),
                    message = %id,
                    "sms sent"
                );
                state.record_channel_success(Channel::Sms, now);
                ChannelResult::sent()
            }
            Err(err) => ChannelResult::failed(truncate_reason(&format!("{err:#}"))),
        }
    }

    async fn persist(&self, ctx: &DispatchContext, state: &HostNotifyState) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("hostNotify".to_string(), serde_json::to_value(state)?);
        self.store
            .update(RESERVATIONS, &ctx.reservation_id, fields)
            .await
    }
}

/// `"<channel>:<reason>"` for every attempted-but-failed channel, joined
/// with `"; "`; `None` when the pass had no failures.
fn compose_last_error(result: &NotificationResult) -> Option<String> {
    let failures: Vec<String> = [
        (Channel::InApp, &result.in_app),
        (Channel::Email, &result.email),
        (Channel::Sms, &result.sms),
    ]
    .into_iter()
    .filter(|(_, r)| r.is_failure())
    .map(|(channel, r)| {
        format!(
            "{}:{}",
            channel.label(),
            r.reason.as_deref().unwrap_or("unknown")
        )
    })
    .collect();

    if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    }
}

fn record_outcome(channel: Channel, result: &ChannelResult) {
    let outcome = if result.success {
        "sent"
    } else if result.skipped {
        "skipped"
    } else if result.attempted {
        "failed"
    } else {
        "unattempted"
    };
    counter!(
        "host_notify_channel_outcomes_total",
        "channel" => channel.label(),
        "outcome" => outcome
    )
    .increment(1);
}

fn attendee_display(ctx: &DispatchContext) -> String {
    ctx.attendee_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if ctx.is_guest {
                "A guest".to_string()
            } else {
                "Someone".to_string()
            }
        })
}

fn email_html(ctx: &DispatchContext, host: &HostProfile) -> String {
    let host_name = host
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("there");
    let pricing_note = match ctx.pricing {
        PricingType::Paid => " This is a paid event.",
        PricingType::Free => "",
    };
    format!(
        "<p>Hi {},</p><p><strong>{}</strong> reserved a spot for \
         <strong>{}</strong>.{}</p>",
        html_escape::encode_text(host_name),
        html_escape::encode_text(&attendee_display(ctx)),
        html_escape::encode_text(&ctx.event_title),
        pricing_note
    )
}

fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= MAX_REASON_LEN {
        return reason.to_string();
    }
    reason.chars().take(MAX_REASON_LEN).collect()
}
