use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::{InAppNotification, InAppSink};
use crate::model::NOTIFICATIONS;
use crate::store::DocumentStore;

/// Writes in-app notification documents through the document store; the
/// host's client reads them out of the notifications collection.
pub struct StoreInAppSink {
    store: Arc<dyn DocumentStore>,
}

impl StoreInAppSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InAppSink for StoreInAppSink {
    async fn create(&self, recipient_id: &str, note: &InAppNotification) -> Result<String> {
        let doc = json!({
            "recipientId": recipient_id,
            "type": note.kind,
            "title": note.title,
            "body": note.body,
            "eventId": note.event_id,
            "reservationId": note.reservation_id,
            "createdAt": note.created_at,
            "read": false,
        });
        self.store.create(NOTIFICATIONS, doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn creates_an_unread_notification_document() {
        let store = Arc::new(MemoryStore::new());
        let sink = StoreInAppSink::new(store.clone());

        let id = sink
            .create(
                "host-1",
                &InAppNotification {
                    kind: "reservation_created",
                    title: "New reservation".into(),
                    body: "Alex reserved a spot for Brunch.".into(),
                    event_id: "e1".into(),
                    reservation_id: "r1".into(),
                    created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
                },
            )
            .await
            .unwrap();

        let doc = store.get(NOTIFICATIONS, &id).await.unwrap().unwrap();
        assert_eq!(doc["recipientId"], "host-1");
        assert_eq!(doc["type"], "reservation_created");
        assert_eq!(doc["read"], false);
    }
}
