use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Translation model tiers, cheapest first. A failed inference call is
/// retried once on the next cheaper tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Basic,
    Medium,
    Premium,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Basic => "basic",
            ModelTier::Medium => "medium",
            ModelTier::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "basic" => ModelTier::Basic,
            "premium" => ModelTier::Premium,
            _ => ModelTier::Medium,
        }
    }

    /// The next cheaper tier, used for the single fallback retry.
    pub fn fallback(&self) -> Option<ModelTier> {
        match self {
            ModelTier::Premium => Some(ModelTier::Medium),
            ModelTier::Medium => Some(ModelTier::Basic),
            ModelTier::Basic => None,
        }
    }

    /// This tier followed by every cheaper one, most expensive first.
    pub fn ladder(&self) -> Vec<ModelTier> {
        let mut tiers = vec![*self];
        let mut current = *self;
        while let Some(lower) = current.fallback() {
            tiers.push(lower);
            current = lower;
        }
        tiers
    }
}

/// A conversation message. Immutable once created except for the edit and
/// delete flags; the translation engine only attaches derived artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub original_language: String,
    pub created_at: DateTime<Utc>,
    pub is_edited: bool,
    pub is_deleted: bool,
}

/// A persisted translation of one message into one target language.
///
/// Wire shape is part of the external contract: camelCase fields, the tier
/// exposed as `translationModel`, confidence omitted when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationArtifact {
    pub message_id: Uuid,
    pub source_language: String,
    pub target_language: String,
    pub translated_content: String,
    #[serde(rename = "translationModel")]
    pub model_tier: ModelTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f32>,
    pub cache_key: String,
    pub created_at: DateTime<Utc>,
}

/// Per-conversation-member language preferences. Read-only here; mutated
/// only by the profile-settings collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLanguageProfile {
    pub participant_id: Uuid,
    /// Always a required target when present; a missing value falls back to
    /// the configured default language.
    pub system_language: Option<String>,
    pub regional_language: Option<String>,
    pub custom_destination_language: Option<String>,
    pub auto_translate_enabled: bool,
    pub translate_to_system_language: bool,
    pub translate_to_regional_language: bool,
    pub use_custom_destination: bool,
}

impl ParticipantLanguageProfile {
    /// Profile with default preference flags: auto-translate on, system
    /// language delivery on, no regional or custom destination.
    pub fn new(participant_id: Uuid, system_language: &str) -> Self {
        Self {
            participant_id,
            system_language: Some(system_language.to_string()),
            regional_language: None,
            custom_destination_language: None,
            auto_translate_enabled: true,
            translate_to_system_language: true,
            translate_to_regional_language: false,
            use_custom_destination: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_fallback_ladder() {
        assert_eq!(ModelTier::Premium.fallback(), Some(ModelTier::Medium));
        assert_eq!(ModelTier::Medium.fallback(), Some(ModelTier::Basic));
        assert_eq!(ModelTier::Basic.fallback(), None);

        assert_eq!(
            ModelTier::Premium.ladder(),
            vec![ModelTier::Premium, ModelTier::Medium, ModelTier::Basic]
        );
        assert_eq!(ModelTier::Basic.ladder(), vec![ModelTier::Basic]);
    }

    #[test]
    fn test_tier_parse_defaults_to_medium() {
        assert_eq!(ModelTier::parse("premium"), ModelTier::Premium);
        assert_eq!(ModelTier::parse("BASIC"), ModelTier::Basic);
        assert_eq!(ModelTier::parse("unknown"), ModelTier::Medium);
    }

    #[test]
    fn test_artifact_wire_shape() {
        let artifact = TranslationArtifact {
            message_id: Uuid::new_v4(),
            source_language: "fr".into(),
            target_language: "en".into(),
            translated_content: "hello".into(),
            model_tier: ModelTier::Basic,
            confidence_score: None,
            cache_key: "abc".into(),
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&artifact).unwrap();
        assert!(value.get("messageId").is_some());
        assert!(value.get("sourceLanguage").is_some());
        assert!(value.get("targetLanguage").is_some());
        assert!(value.get("translatedContent").is_some());
        assert_eq!(value["translationModel"], "basic");
        assert!(value.get("cacheKey").is_some());
        assert!(value.get("createdAt").is_some());
        // confidence omitted entirely when absent
        assert!(value.get("confidenceScore").is_none());
    }
}
