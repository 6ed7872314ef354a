//! Participant directory (membership/profile provider)
//!
//! Membership and language profiles are owned by external collaborators;
//! this service only reads a snapshot of them. The Postgres implementation
//! joins the membership table with the per-participant profiles; the static
//! implementation backs tests and fixtures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::ParticipantLanguageProfile;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("participant directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn get_active_participants(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ParticipantLanguageProfile>, DirectoryError>;
}

pub struct PgParticipantDirectory {
    db: Pool<Postgres>,
}

impl PgParticipantDirectory {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ParticipantDirectory for PgParticipantDirectory {
    async fn get_active_participants(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ParticipantLanguageProfile>, DirectoryError> {
        // A member without a profile row still counts as a participant; the
        // resolver substitutes the configured default language.
        let rows = sqlx::query(
            r#"SELECT m.participant_id,
                      p.system_language,
                      p.regional_language,
                      p.custom_destination_language,
                      COALESCE(p.auto_translate_enabled, TRUE) AS auto_translate_enabled,
                      COALESCE(p.translate_to_system_language, TRUE) AS translate_to_system_language,
                      COALESCE(p.translate_to_regional_language, FALSE) AS translate_to_regional_language,
                      COALESCE(p.use_custom_destination, FALSE) AS use_custom_destination
               FROM conversation_members m
               LEFT JOIN participant_language_profiles p
                      ON p.participant_id = m.participant_id
               WHERE m.conversation_id = $1 AND m.is_active"#,
        )
        .bind(conversation_id)
        .fetch_all(&self.db)
        .await?;

        let profiles = rows
            .into_iter()
            .map(|r| ParticipantLanguageProfile {
                participant_id: r.get("participant_id"),
                system_language: r.get("system_language"),
                regional_language: r.get("regional_language"),
                custom_destination_language: r.get("custom_destination_language"),
                auto_translate_enabled: r.get("auto_translate_enabled"),
                translate_to_system_language: r.get("translate_to_system_language"),
                translate_to_regional_language: r.get("translate_to_regional_language"),
                use_custom_destination: r.get("use_custom_destination"),
            })
            .collect();

        Ok(profiles)
    }
}

/// In-memory directory keyed by conversation.
#[derive(Default)]
pub struct StaticParticipantDirectory {
    rosters: RwLock<HashMap<Uuid, Vec<ParticipantLanguageProfile>>>,
}

impl StaticParticipantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn set_roster(&self, conversation_id: Uuid, roster: Vec<ParticipantLanguageProfile>) {
        self.rosters.write().await.insert(conversation_id, roster);
    }
}

#[async_trait]
impl ParticipantDirectory for StaticParticipantDirectory {
    async fn get_active_participants(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ParticipantLanguageProfile>, DirectoryError> {
        Ok(self
            .rosters
            .read()
            .await
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_returns_roster_snapshot() {
        let directory = StaticParticipantDirectory::new();
        let conversation_id = Uuid::new_v4();
        let participant = Uuid::new_v4();

        directory
            .set_roster(
                conversation_id,
                vec![ParticipantLanguageProfile::new(participant, "fr")],
            )
            .await;

        let roster = directory
            .get_active_participants(conversation_id)
            .await
            .unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].participant_id, participant);

        // unknown conversations are empty, not an error
        let empty = directory
            .get_active_participants(Uuid::new_v4())
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
