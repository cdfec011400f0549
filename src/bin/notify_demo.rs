//! Demo that runs two dispatch passes against the in-memory store to show
//! the per-channel idempotency (stdout/log only; no providers configured).

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use rsvp_host_notify::model::{PricingType, EVENTS, RESERVATIONS, USERS};
use rsvp_host_notify::notify::inapp::StoreInAppSink;
use rsvp_host_notify::store::MemoryStore;
use rsvp_host_notify::{DispatchContext, NotificationDispatcher};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let store = Arc::new(MemoryStore::new());
    store.insert(
        RESERVATIONS,
        "demo-res",
        json!({"id": "demo-res", "eventId": "demo-ev", "userId": "demo-user", "status": "reserved"}),
    );
    store.insert(
        EVENTS,
        "demo-ev",
        json!({"id": "demo-ev", "hostId": "demo-host", "title": "Rooftop Brunch"}),
    );
    store.insert(USERS, "demo-host", json!({"display_name": "Dana"}));

    let sink = Arc::new(StoreInAppSink::new(store.clone()));
    let dispatcher = NotificationDispatcher::new(store, sink, None, None);

    let ctx = DispatchContext {
        reservation_id: "demo-res".into(),
        event_id: "demo-ev".into(),
        host_id: "demo-host".into(),
        attendee_name: Some("Alex".into()),
        attendee_email: Some("alex@example.com".into()),
        event_title: "Rooftop Brunch".into(),
        pricing: PricingType::Free,
        is_guest: false,
    };

    let first = dispatcher.dispatch(&ctx, Utc::now()).await;
    println!("first pass:  in_app={:?}", first.in_app);

    let second = dispatcher.dispatch(&ctx, Utc::now()).await;
    println!("second pass: in_app={:?}", second.in_app);

    println!("notify-demo done");
}
