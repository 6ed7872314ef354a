//! Websocket event types
//!
//! Every event follows the "object.action" naming convention and carries a
//! flat, self-describing JSON structure tagged by `type`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, TranslationArtifact};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    /// Original message, pushed immediately on creation in its source
    /// language.
    #[serde(rename = "message.new")]
    MessageNew {
        conversation_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        content: String,
        original_language: String,
        created_at: String,
    },

    /// A translation variant became available for a message.
    #[serde(rename = "translation.ready")]
    TranslationReady {
        conversation_id: Uuid,
        message_id: Uuid,
        artifact: TranslationArtifact,
    },

    /// Translation for one target language failed after the fallback retry;
    /// clients show "could not translate" instead of silently falling back.
    #[serde(rename = "translation.failed")]
    TranslationFailed {
        conversation_id: Uuid,
        message_id: Uuid,
        target_language: String,
        reason: String,
    },
}

impl WsEvent {
    pub fn message_new(message: &Message) -> Self {
        WsEvent::MessageNew {
            conversation_id: message.conversation_id,
            message_id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            original_language: message.original_language.clone(),
            created_at: message.created_at.to_rfc3339(),
        }
    }

    pub fn translation_ready(conversation_id: Uuid, artifact: &TranslationArtifact) -> Self {
        WsEvent::TranslationReady {
            conversation_id,
            message_id: artifact.message_id,
            artifact: artifact.clone(),
        }
    }

    pub fn translation_failed(
        conversation_id: Uuid,
        message_id: Uuid,
        target_language: &str,
        reason: &str,
    ) -> Self {
        WsEvent::TranslationFailed {
            conversation_id,
            message_id,
            target_language: target_language.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            WsEvent::MessageNew { .. } => "message.new",
            WsEvent::TranslationReady { .. } => "translation.ready",
            WsEvent::TranslationFailed { .. } => "translation.failed",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelTier;
    use chrono::Utc;

    #[test]
    fn test_event_type_naming() {
        let event = WsEvent::translation_failed(Uuid::new_v4(), Uuid::new_v4(), "de", "timeout");
        assert_eq!(event.event_type(), "translation.failed");
    }

    #[test]
    fn test_translation_ready_serialization() {
        let conversation_id = Uuid::new_v4();
        let artifact = TranslationArtifact {
            message_id: Uuid::new_v4(),
            source_language: "fr".into(),
            target_language: "en".into(),
            translated_content: "hello".into(),
            model_tier: ModelTier::Medium,
            confidence_score: Some(0.9),
            cache_key: "key".into(),
            created_at: Utc::now(),
        };

        let json = WsEvent::translation_ready(conversation_id, &artifact)
            .to_json()
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["type"], "translation.ready");
        assert_eq!(parsed["conversation_id"], conversation_id.to_string());
        assert_eq!(parsed["artifact"]["targetLanguage"], "en");

        let roundtrip = WsEvent::from_json(&json).unwrap();
        assert!(matches!(roundtrip, WsEvent::TranslationReady { .. }));
    }
}
