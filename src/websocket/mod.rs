use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod messages;
pub mod pubsub;
pub mod session;

pub use messages::WsEvent;
pub use session::WsSession;

#[derive(Clone)]
struct Subscriber {
    connection_id: Uuid,
    participant_id: Uuid,
    sender: UnboundedSender<WsEvent>,
}

/// Registry of live websocket sessions, keyed by conversation. A
/// participant may hold several concurrent connections; dead senders are
/// pruned on the next delivery.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; returns the connection id used for cleanup.
    pub async fn subscribe(
        &self,
        conversation_id: Uuid,
        participant_id: Uuid,
        sender: UnboundedSender<WsEvent>,
    ) -> Uuid {
        let connection_id = Uuid::new_v4();
        let mut guard = self.inner.write().await;
        guard.entry(conversation_id).or_default().push(Subscriber {
            connection_id,
            participant_id,
            sender,
        });
        connection_id
    }

    pub async fn unsubscribe(&self, conversation_id: Uuid, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(&conversation_id) {
            list.retain(|s| s.connection_id != connection_id);
            if list.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    /// Deliver to every session in the conversation.
    pub async fn broadcast(&self, conversation_id: Uuid, event: &WsEvent) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(&conversation_id) {
            list.retain(|s| s.sender.send(event.clone()).is_ok());
        }
    }

    /// Deliver to the listed participants' sessions only.
    pub async fn send_to_participants(
        &self,
        conversation_id: Uuid,
        recipients: &[Uuid],
        event: &WsEvent,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(&conversation_id) {
            list.retain(|s| {
                if recipients.contains(&s.participant_id) {
                    s.sender.send(event.clone()).is_ok()
                } else {
                    true
                }
            });
        }
    }

    pub async fn connection_count(&self, participant_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard
            .values()
            .flatten()
            .filter(|s| s.participant_id == participant_id)
            .count()
    }

    pub async fn total_connections(&self) -> usize {
        let guard = self.inner.read().await;
        guard.values().map(|v| v.len()).sum()
    }
}

/// Channel pair handed to a new session.
pub fn session_channel() -> (UnboundedSender<WsEvent>, UnboundedReceiver<WsEvent>) {
    tokio::sync::mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use chrono::Utc;

    fn test_message(conversation_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            content: "bonjour".into(),
            original_language: "fr".into(),
            created_at: Utc::now(),
            is_edited: false,
            is_deleted: false,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let registry = ConnectionRegistry::new();
        let conversation_id = Uuid::new_v4();

        let (tx1, mut rx1) = session_channel();
        let (tx2, mut rx2) = session_channel();
        registry.subscribe(conversation_id, Uuid::new_v4(), tx1).await;
        registry.subscribe(conversation_id, Uuid::new_v4(), tx2).await;

        let event = WsEvent::message_new(&test_message(conversation_id));
        registry.broadcast(conversation_id, &event).await;

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_targeted_send_skips_other_participants() {
        let registry = ConnectionRegistry::new();
        let conversation_id = Uuid::new_v4();
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (tx1, mut rx1) = session_channel();
        let (tx2, mut rx2) = session_channel();
        registry.subscribe(conversation_id, target, tx1).await;
        registry.subscribe(conversation_id, other, tx2).await;

        let event = WsEvent::translation_failed(conversation_id, Uuid::new_v4(), "de", "down");
        registry
            .send_to_participants(conversation_id, &[target], &event)
            .await;

        assert!(rx1.recv().await.is_some());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_sessions_are_pruned_on_delivery() {
        let registry = ConnectionRegistry::new();
        let conversation_id = Uuid::new_v4();

        let (tx, rx) = session_channel();
        registry.subscribe(conversation_id, Uuid::new_v4(), tx).await;
        drop(rx);

        assert_eq!(registry.total_connections().await, 1);
        let event = WsEvent::message_new(&test_message(conversation_id));
        registry.broadcast(conversation_id, &event).await;
        assert_eq!(registry.total_connections().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_one_connection() {
        let registry = ConnectionRegistry::new();
        let conversation_id = Uuid::new_v4();
        let participant = Uuid::new_v4();

        let (tx1, _rx1) = session_channel();
        let (tx2, _rx2) = session_channel();
        let connection_id = registry.subscribe(conversation_id, participant, tx1).await;
        registry.subscribe(conversation_id, participant, tx2).await;

        assert_eq!(registry.connection_count(participant).await, 2);
        registry.unsubscribe(conversation_id, connection_id).await;
        assert_eq!(registry.connection_count(participant).await, 1);
    }
}
