//! Distribution layer
//!
//! Pushes the original message to every connected session the moment it is
//! accepted, then streams each translation variant to the participants whose
//! resolved preferred language matches it. Remote instances receive the same
//! events over redis pub/sub; push failures are not retried because the
//! persisted artifact store backs the pull path on reconnect.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::models::{Message, ParticipantLanguageProfile, TranslationArtifact};
use crate::services::resolver::LanguageResolver;
use crate::websocket::pubsub::{self, Envelope};
use crate::websocket::{ConnectionRegistry, WsEvent};

pub struct Distributor {
    registry: ConnectionRegistry,
    resolver: Arc<LanguageResolver>,
    redis: Option<redis::Client>,
    instance_id: Uuid,
}

impl Distributor {
    pub fn new(
        registry: ConnectionRegistry,
        resolver: Arc<LanguageResolver>,
        redis: Option<redis::Client>,
    ) -> Self {
        Self {
            registry,
            resolver,
            redis,
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Broadcast the original content immediately; participants reading in
    /// the source language need no further update.
    pub async fn on_message_created(&self, message: &Message) {
        let event = WsEvent::message_new(message);
        self.dispatch(message.conversation_id, None, event).await;
    }

    /// Push an incremental update to every participant whose resolved
    /// preference equals the artifact's target language.
    pub async fn on_artifact_ready(
        &self,
        message: &Message,
        artifact: &TranslationArtifact,
        roster: &[ParticipantLanguageProfile],
    ) {
        let recipients = self.recipients_for(roster, &artifact.target_language);
        if recipients.is_empty() {
            return;
        }
        let event = WsEvent::translation_ready(message.conversation_id, artifact);
        self.dispatch(message.conversation_id, Some(recipients), event)
            .await;
    }

    /// Surface an explicit per-language failure to the affected
    /// participants.
    pub async fn on_translation_failed(
        &self,
        message: &Message,
        target_language: &str,
        roster: &[ParticipantLanguageProfile],
        reason: &str,
    ) {
        let recipients = self.recipients_for(roster, target_language);
        if recipients.is_empty() {
            return;
        }
        let event =
            WsEvent::translation_failed(message.conversation_id, message.id, target_language, reason);
        self.dispatch(message.conversation_id, Some(recipients), event)
            .await;
    }

    fn recipients_for(&self, roster: &[ParticipantLanguageProfile], language: &str) -> Vec<Uuid> {
        roster
            .iter()
            .filter(|p| self.resolver.resolved_preference(p) == language)
            .map(|p| p.participant_id)
            .collect()
    }

    async fn dispatch(
        &self,
        conversation_id: Uuid,
        recipients: Option<Vec<Uuid>>,
        event: WsEvent,
    ) {
        match &recipients {
            None => self.registry.broadcast(conversation_id, &event).await,
            Some(list) => {
                self.registry
                    .send_to_participants(conversation_id, list, &event)
                    .await
            }
        }

        if let Some(client) = &self.redis {
            let envelope = Envelope {
                origin: self.instance_id,
                conversation_id,
                recipients,
                event,
            };
            if let Err(e) = pubsub::publish(client, &envelope).await {
                warn!(
                    error = %e,
                    conversation_id = %conversation_id,
                    "cross-instance publish failed; remote participants will catch up via the pull path"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelTier;
    use crate::services::membership::StaticParticipantDirectory;
    use crate::websocket::session_channel;
    use chrono::Utc;

    fn resolver() -> Arc<LanguageResolver> {
        Arc::new(LanguageResolver::new(
            StaticParticipantDirectory::shared(),
            "en",
        ))
    }

    fn message(conversation_id: Uuid) -> Message {
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

    fn artifact(message_id: Uuid, target: &str) -> TranslationArtifact {
        TranslationArtifact {
            message_id,
            source_language: "fr".into(),
            target_language: target.into(),
            translated_content: "hello".into(),
            model_tier: ModelTier::Medium,
            confidence_score: None,
            cache_key: "key".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_original_message_reaches_everyone() {
        let registry = ConnectionRegistry::new();
        let conversation_id = Uuid::new_v4();
        let distributor = Distributor::new(registry.clone(), resolver(), None);

        let (tx1, mut rx1) = session_channel();
        let (tx2, mut rx2) = session_channel();
        registry.subscribe(conversation_id, Uuid::new_v4(), tx1).await;
        registry.subscribe(conversation_id, Uuid::new_v4(), tx2).await;

        distributor.on_message_created(&message(conversation_id)).await;

        assert!(matches!(rx1.try_recv().unwrap(), WsEvent::MessageNew { .. }));
        assert!(matches!(rx2.try_recv().unwrap(), WsEvent::MessageNew { .. }));
    }

    #[tokio::test]
    async fn test_artifact_routed_by_resolved_preference() {
        let registry = ConnectionRegistry::new();
        let conversation_id = Uuid::new_v4();
        let distributor = Distributor::new(registry.clone(), resolver(), None);

        let english = ParticipantLanguageProfile::new(Uuid::new_v4(), "en");
        let german = ParticipantLanguageProfile::new(Uuid::new_v4(), "de");
        let roster = vec![english.clone(), german.clone()];

        let (tx_en, mut rx_en) = session_channel();
        let (tx_de, mut rx_de) = session_channel();
        registry
            .subscribe(conversation_id, english.participant_id, tx_en)
            .await;
        registry
            .subscribe(conversation_id, german.participant_id, tx_de)
            .await;

        let msg = message(conversation_id);
        distributor
            .on_artifact_ready(&msg, &artifact(msg.id, "en"), &roster)
            .await;

        assert!(matches!(
            rx_en.try_recv().unwrap(),
            WsEvent::TranslationReady { .. }
        ));
        assert!(rx_de.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_signal_routed_to_affected_participants() {
        let registry = ConnectionRegistry::new();
        let conversation_id = Uuid::new_v4();
        let distributor = Distributor::new(registry.clone(), resolver(), None);

        let german = ParticipantLanguageProfile::new(Uuid::new_v4(), "de");
        let roster = vec![german.clone()];

        let (tx, mut rx) = session_channel();
        registry
            .subscribe(conversation_id, german.participant_id, tx)
            .await;

        let msg = message(conversation_id);
        distributor
            .on_translation_failed(&msg, "de", &roster, "inference unavailable")
            .await;

        match rx.try_recv().unwrap() {
            WsEvent::TranslationFailed {
                target_language,
                reason,
                ..
            } => {
                assert_eq!(target_language, "de");
                assert_eq!(reason, "inference unavailable");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
