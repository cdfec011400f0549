// tests/notify_scenarios.rs
//
// End-to-end dispatch scenarios through the gate with a controlled clock
// and scripted providers: full success, opt-outs, provider failure with
// retry, and idempotency across passes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use rsvp_host_notify::config::AppConfig;
use rsvp_host_notify::gate::{GateOutcome, NotifyGate, NotifyRequest};
use rsvp_host_notify::identity::{AdminPolicy, StaticTokenVerifier, VerifiedIdentity};
use rsvp_host_notify::model::{HostNotifyState, EVENTS, RESERVATIONS, USERS};
use rsvp_host_notify::notify::inapp::StoreInAppSink;
use rsvp_host_notify::notify::{
    EmailMessage, EmailSender, NotificationDispatcher, SmsSender,
};
use rsvp_host_notify::store::{DocumentStore, MemoryStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Email fake that fails the first `fail_first` calls, then succeeds.
struct ScriptedEmail {
    calls: AtomicUsize,
    fail_first: usize,
}

impl ScriptedEmail {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        })
    }

    fn failing_once() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        })
    }
}

#[async_trait]
impl EmailSender for ScriptedEmail {
    async fn send(&self, _msg: &EmailMessage) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(anyhow!("timeout"))
        } else {
            Ok(format!("em-{call}"))
        }
    }
}

struct CountingSms {
    calls: AtomicUsize,
}

impl CountingSms {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SmsSender for CountingSms {
    async fn send(&self, _to: &str, _body: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("sm-1".to_string())
    }
}

fn seeded_store(host_doc: serde_json::Value) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        RESERVATIONS,
        "r1",
        json!({
            "id": "r1",
            "eventId": "e1",
            "userId": "u1",
            "attendeeName": "Alex",
            "status": "reserved",
            "isGuestCreated": true
        }),
    );
    store.insert(
        EVENTS,
        "e1",
        json!({"id": "e1", "hostId": "h1", "title": "Brunch", "hasEntryFee": true}),
    );
    store.insert(USERS, "h1", host_doc);
    store
}

fn gate(
    store: Arc<MemoryStore>,
    email: Option<Arc<dyn EmailSender>>,
    sms: Option<Arc<dyn SmsSender>>,
) -> NotifyGate {
    let verifier = Arc::new(StaticTokenVerifier::new().with_token(
        "attendee-token",
        VerifiedIdentity {
            subject: "u1".into(),
            email: None,
            admin_claim: false,
        },
    ));
    let sink = Arc::new(StoreInAppSink::new(store.clone()));
    let dispatcher = NotificationDispatcher::new(store.clone(), sink, email, sms);
    NotifyGate::new(
        store,
        verifier,
        AdminPolicy::new(vec![], None),
        dispatcher,
        &AppConfig::default(),
    )
}

fn request() -> NotifyRequest {
    NotifyRequest {
        reservation_id: "r1".into(),
        bearer_token: Some("attendee-token".into()),
        client_ip: "203.0.113.7".into(),
    }
}

async fn stored_state(store: &MemoryStore) -> HostNotifyState {
    let doc = store.get(RESERVATIONS, "r1").await.unwrap().unwrap();
    serde_json::from_value(doc["hostNotify"].clone()).unwrap()
}

#[tokio::test]
async fn full_success_marks_every_channel_once() {
    let store = seeded_store(json!({
        "display_name": "Dana",
        "email": "dana@example.com",
        "phone_number": "+14165551234"
    }));
    let email = ScriptedEmail::ok();
    let sms = CountingSms::ok();
    let gate = gate(
        store.clone(),
        Some(email.clone() as Arc<dyn EmailSender>),
        Some(sms.clone() as Arc<dyn SmsSender>),
    );

    let outcome = gate.handle(&request(), t0()).await.unwrap();
    let GateOutcome::Dispatched(result) = outcome else {
        panic!("expected dispatch");
    };
    assert!(result.in_app.success && result.email.success && result.sms.success);

    let state = stored_state(&store).await;
    assert_eq!(state.last_attempt_at, Some(t0()));
    assert_eq!(state.in_app_at, Some(t0()));
    assert_eq!(state.email_at, Some(t0()));
    assert_eq!(state.sms_at, Some(t0()));
    assert_eq!(state.last_error, None);
}

#[tokio::test]
async fn sms_opt_out_skips_without_an_error() {
    let store = seeded_store(json!({
        "email": "dana@example.com",
        "phone_number": "+14165551234",
        "notification_settings": {"sms_opt_in": false}
    }));
    let sms = CountingSms::ok();
    let gate = gate(
        store.clone(),
        Some(ScriptedEmail::ok() as Arc<dyn EmailSender>),
        Some(sms.clone() as Arc<dyn SmsSender>),
    );

    let GateOutcome::Dispatched(result) = gate.handle(&request(), t0()).await.unwrap() else {
        panic!("expected dispatch");
    };
    assert!(result.sms.skipped);
    assert_eq!(result.sms.reason.as_deref(), Some("sms_opt_out"));
    assert_eq!(sms.calls.load(Ordering::SeqCst), 0);

    let state = stored_state(&store).await;
    assert_eq!(state.sms_at, None);
    assert_eq!(state.last_error, None, "skips are not failures");
}

#[tokio::test]
async fn failed_email_bypasses_cooldown_and_retries() {
    let store = seeded_store(json!({"email": "dana@example.com"}));
    let email = ScriptedEmail::failing_once();
    let gate = gate(
        store.clone(),
        Some(email.clone() as Arc<dyn EmailSender>),
        None,
    );

    let GateOutcome::Dispatched(first) = gate.handle(&request(), t0()).await.unwrap() else {
        panic!("expected dispatch");
    };
    assert!(first.email.is_failure());
    let state = stored_state(&store).await;
    assert_eq!(state.last_error.as_deref(), Some("email:timeout"));
    assert_eq!(state.email_at, None);

    // 5 seconds later: well inside the 15s window, but the previous pass
    // recorded a failure, so the cooldown must not suppress the retry.
    let retry_at = t0() + Duration::seconds(5);
    let GateOutcome::Dispatched(second) = gate.handle(&request(), retry_at).await.unwrap()
    else {
        panic!("expected dispatch, not cooldown");
    };
    assert!(second.email.success);
    assert!(second.in_app.skipped, "in-app already delivered");

    let state = stored_state(&store).await;
    assert_eq!(state.email_at, Some(retry_at));
    assert_eq!(state.last_error, None);
    assert_eq!(email.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clean_pass_inside_cooldown_is_suppressed() {
    let store = seeded_store(json!({"email": "dana@example.com"}));
    let gate = gate(
        store.clone(),
        Some(ScriptedEmail::ok() as Arc<dyn EmailSender>),
        None,
    );

    gate.handle(&request(), t0()).await.unwrap();

    let outcome = gate
        .handle(&request(), t0() + Duration::seconds(10))
        .await
        .unwrap();
    match outcome {
        GateOutcome::Skipped {
            reason,
            remaining_seconds,
        } => {
            assert_eq!(reason, "cooldown");
            assert_eq!(remaining_seconds, Some(5));
        }
        other => panic!("expected cooldown skip, got {other:?}"),
    }
}

#[tokio::test]
async fn second_pass_after_cooldown_skips_delivered_channels() {
    let store = seeded_store(json!({
        "email": "dana@example.com",
        "phone_number": "+14165551234"
    }));
    let email = ScriptedEmail::ok();
    let sms = CountingSms::ok();
    let gate = gate(
        store.clone(),
        Some(email.clone() as Arc<dyn EmailSender>),
        Some(sms.clone() as Arc<dyn SmsSender>),
    );

    gate.handle(&request(), t0()).await.unwrap();

    let later = t0() + Duration::seconds(30);
    let GateOutcome::Dispatched(second) = gate.handle(&request(), later).await.unwrap() else {
        panic!("expected dispatch");
    };
    for channel in [&second.in_app, &second.email, &second.sms] {
        assert!(channel.skipped);
        assert_eq!(channel.reason.as_deref(), Some("already_sent"));
    }
    assert_eq!(email.calls.load(Ordering::SeqCst), 1, "email sent exactly once");
    assert_eq!(sms.calls.load(Ordering::SeqCst), 1, "sms sent exactly once");

    let state = stored_state(&store).await;
    assert_eq!(state.in_app_at, Some(t0()), "timestamps unchanged");
    assert_eq!(state.last_attempt_at, Some(later));
}

#[tokio::test]
async fn missing_host_email_and_phone_skip_with_specific_reasons() {
    let store = seeded_store(json!({"display_name": "Dana"}));
    let gate = gate(
        store.clone(),
        Some(ScriptedEmail::ok() as Arc<dyn EmailSender>),
        Some(CountingSms::ok() as Arc<dyn SmsSender>),
    );

    let GateOutcome::Dispatched(result) = gate.handle(&request(), t0()).await.unwrap() else {
        panic!("expected dispatch");
    };
    assert_eq!(result.email.reason.as_deref(), Some("no_host_email"));
    assert_eq!(result.sms.reason.as_deref(), Some("no_host_phone"));
    assert!(result.in_app.success, "in-app is unaffected");
}
