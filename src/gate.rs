//! gate.rs — access & cooldown gate in front of the dispatcher.
//!
//! The externally invoked entry point. Order matters: input shape first
//! (no side effects on malformed requests), then the cheap in-memory rate
//! guards, then token verification, then store reads, then authorization
//! and the smart cooldown, and only then the dispatcher.
//!
//! The cooldown is deliberately asymmetric: it only suppresses re-dispatch
//! once the previous attempt completed cleanly. A failed attempt bypasses
//! the window so a fresh request can retry failed channels immediately.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::identity::{AdminPolicy, IdentityVerifier};
use crate::model::{EventDoc, NotificationResult, PricingType, Reservation, EVENTS, RESERVATIONS};
use crate::notify::{DispatchContext, NotificationDispatcher};
use crate::ratelimit::FixedWindowLimiter;
use crate::store::{get_typed, DocumentStore};

static RESERVATION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("reservation id regex"));

/// One inbound notify request, already stripped of transport details.
#[derive(Debug, Clone)]
pub struct NotifyRequest {
    pub reservation_id: String,
    pub bearer_token: Option<String>,
    pub client_ip: String,
}

/// What the gate decided.
#[derive(Debug)]
pub enum GateOutcome {
    /// The dispatcher ran; per-channel results inside.
    Dispatched(NotificationResult),
    /// Dispatch was suppressed for a benign reason.
    Skipped {
        reason: &'static str,
        remaining_seconds: Option<i64>,
    },
}

pub struct NotifyGate {
    store: Arc<dyn DocumentStore>,
    verifier: Arc<dyn IdentityVerifier>,
    admin_policy: AdminPolicy,
    dispatcher: NotificationDispatcher,
    per_ip: FixedWindowLimiter,
    per_reservation: FixedWindowLimiter,
    per_event: FixedWindowLimiter,
    cooldown: Duration,
}

impl NotifyGate {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn IdentityVerifier>,
        admin_policy: AdminPolicy,
        dispatcher: NotificationDispatcher,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            admin_policy,
            dispatcher,
            per_ip: FixedWindowLimiter::new(config.per_ip_limit, config.per_ip_window_secs),
            per_reservation: FixedWindowLimiter::new(
                config.per_reservation_limit,
                config.per_reservation_window_secs,
            ),
            per_event: FixedWindowLimiter::with_capacity(
                config.per_event_limit,
                config.per_event_window_secs,
                config.per_event_capacity,
            ),
            cooldown: Duration::seconds(config.cooldown_secs.max(0)),
        }
    }

    pub async fn handle(
        &self,
        req: &NotifyRequest,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, ApiError> {
        // 1. Input shape, before anything stateful.
        if !RESERVATION_ID.is_match(&req.reservation_id) {
            return Err(ApiError::InvalidReservationId);
        }

        // 2. Cheap in-memory guards, before any store read.
        if !self.per_ip.allow(&req.client_ip, now) {
            return Err(self.rate_limited("ip"));
        }
        if !self.per_reservation.allow(&req.reservation_id, now) {
            return Err(self.rate_limited("reservation"));
        }

        // 3. Caller identity.
        let token = req.bearer_token.as_deref().ok_or(ApiError::Unauthorized)?;
        let identity = self.verifier.verify(token).await.map_err(|err| {
            debug!("bearer verification failed: {err:#}");
            ApiError::Unauthorized
        })?;
        let is_admin = self.admin_policy.is_admin(&identity);

        // 4. Reservation and event state.
        let reservation: Reservation =
            get_typed(self.store.as_ref(), RESERVATIONS, &req.reservation_id)
                .await
                .map_err(internal)?
                .ok_or(ApiError::ReservationNotFound)?;
        let event: EventDoc = get_typed(self.store.as_ref(), EVENTS, &reservation.event_id)
            .await
            .map_err(internal)?
            .ok_or(ApiError::EventNotFound)?;
        if !reservation.status.is_active() {
            return Err(ApiError::ReservationNotActive);
        }

        // 5. Authorization: reservation owner, event host, or admin.
        let is_owner = identity.subject == reservation.user_id;
        let is_host = identity.subject == event.host_id;
        if !(is_owner || is_host || is_admin) {
            return Err(ApiError::Forbidden);
        }

        // 6. A host reserving their own event must not notify themselves.
        if reservation.user_id == event.host_id {
            return Ok(GateOutcome::Skipped {
                reason: "self_rsvp",
                remaining_seconds: None,
            });
        }

        // 7. Smart cooldown.
        if let Some(last_attempt) = reservation.host_notify.last_attempt_at {
            let elapsed = now - last_attempt;
            if elapsed < self.cooldown && reservation.host_notify.channels_complete() {
                let remaining = self.cooldown - elapsed;
                return Ok(GateOutcome::Skipped {
                    reason: "cooldown",
                    remaining_seconds: Some(ceil_seconds(remaining)),
                });
            }
        }

        // Event-level guard, immediately before dispatch work starts.
        if !self.per_event.allow(&event.id, now) {
            return Err(self.rate_limited("event"));
        }

        // 8–9. Pricing context, then dispatch.
        let ctx = DispatchContext {
            reservation_id: reservation.id.clone(),
            event_id: event.id.clone(),
            host_id: event.host_id.clone(),
            attendee_name: reservation.attendee_name.clone(),
            attendee_email: reservation.attendee_email.clone(),
            event_title: event.title.clone(),
            pricing: PricingType::from_event(&event),
            is_guest: reservation.is_guest_created,
        };
        let result = self.dispatcher.dispatch(&ctx, now).await;
        Ok(GateOutcome::Dispatched(result))
    }

    fn rate_limited(&self, scope: &'static str) -> ApiError {
        counter!("notify_rate_limited_total", "scope" => scope).increment(1);
        warn!(scope, "notify request rate-limited");
        ApiError::RateLimited { scope }
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    warn!("gate internal error: {err:#}");
    ApiError::Internal(format!("{err:#}"))
}

/// Whole seconds, rounded up; callers display "try again in N seconds".
fn ceil_seconds(d: Duration) -> i64 {
    let ms = d.num_milliseconds().max(0);
    (ms + 999) / 1000
}
